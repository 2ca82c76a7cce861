//! Interactive serial port selection.
//!
//! Port selection follows the usual flasher-tool flow:
//! - Auto-detection of known USB devices
//! - Interactive selection via dialoguer
//! - Remembering selected ports in configuration
//! - Non-interactive mode for CI/CD

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    ccflash::{DetectedPort, DeviceKind, detect_ports},
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, info},
    std::{cmp::Ordering, io::IsTerminal},
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// List all ports (including unknown types).
    pub list_all_ports: bool,
    /// Non-interactive mode (fail if multiple ports).
    pub non_interactive: bool,
    /// Force confirmation even for single recognized port.
    pub confirm_port: bool,
}

/// Result of port selection including whether it was a known device.
#[derive(Debug)]
pub struct SelectedPort {
    /// The selected port info.
    pub port: DetectedPort,
    /// Whether this port matched a known/configured device.
    pub is_known: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    // Selection failures map to CLI exit code 2 so scripts can branch on
    // setup issues vs. flash failures.
    CliError::Usage(message.to_string()).into()
}

fn select_non_interactive_port(
    selection_ports: Vec<DetectedPort>,
    config: &Config,
) -> Result<SelectedPort> {
    // Non-interactive mode must be deterministic and never prompt.
    match selection_ports.len().cmp(&1) {
        Ordering::Equal => {
            let port = selection_ports
                .into_iter()
                .next()
                .expect("selection_ports has exactly 1 element here");
            Ok(SelectedPort {
                is_known: is_known_device(&port, config),
                port,
            })
        },
        Ordering::Greater => Err(usage_err(
            "multiple serial ports found; pass --port to choose one",
        )),
        Ordering::Less => Err(usage_err("no serial ports available")),
    }
}

/// Select a serial port interactively or automatically.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    // If port explicitly specified, use it
    if let Some(port_name) = &options.port {
        return Ok(find_port_by_name(port_name));
    }

    // If port in config, use it
    if let Some(port_name) = &config.port.connection.serial {
        debug!("Using port from config: {port_name}");
        return Ok(find_port_by_name(port_name));
    }

    // Detect available ports
    let ports = detect_ports();

    if ports.is_empty() {
        return Err(usage_err("no serial ports found"));
    }

    // Filter to known devices (built-in + config)
    let known_ports: Vec<DetectedPort> = ports
        .iter()
        .filter(|p| is_known_device(p, config))
        .cloned()
        .collect();

    // Select candidate set: known first unless user asks for all
    let selection_ports: Vec<DetectedPort> = if options.list_all_ports || known_ports.is_empty() {
        ports
    } else {
        known_ports
    };

    // Non-interactive mode must never prompt
    if options.non_interactive {
        return select_non_interactive_port(selection_ports, config);
    }

    match selection_ports.len().cmp(&1) {
        Ordering::Greater => {
            ensure_interactive_terminal()?;
            select_port_interactive(selection_ports, config)
        },
        Ordering::Equal => {
            let port = selection_ports
                .into_iter()
                .next()
                .expect("selection_ports has exactly 1 element here");
            let is_known = is_known_device(&port, config);

            if is_known && !options.confirm_port {
                info!("Auto-selected port: {} [{}]", port.name, port.device.name());
                Ok(SelectedPort { port, is_known })
            } else {
                ensure_interactive_terminal()?;
                confirm_single_port(port, config)
            }
        },
        Ordering::Less => Err(usage_err("no serial ports available")),
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(CliError::Usage(
            "interactive port selection requires a terminal; pass --port or --non-interactive"
                .to_string(),
        )
        .into())
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("port selection cancelled".to_string()).into()
            } else {
                CliError::Usage("port selection prompt failed".to_string()).into()
            }
        },
    }
}

/// Find a port by name.
fn find_port_by_name(name: &str) -> SelectedPort {
    let ports = detect_ports();

    // Try exact match first, then case-insensitive (Windows)
    if let Some(port) = ports
        .iter()
        .find(|p| p.name == name)
        .or_else(|| ports.iter().find(|p| p.name.eq_ignore_ascii_case(name)))
    {
        return SelectedPort {
            port: port.clone(),
            is_known: port.device.is_known(),
        };
    }

    // Port not found in detected list, but user explicitly specified it
    SelectedPort {
        port: DetectedPort {
            name: name.to_string(),
            device: DeviceKind::Unknown,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial: None,
        },
        is_known: false,
    }
}

/// Check if a port matches a known device (from config or built-in list).
fn is_known_device(port: &DetectedPort, config: &Config) -> bool {
    if port.device.is_known() {
        return true;
    }

    // Check configured USB devices
    if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        for device in &config.port.usb_device {
            if device.matches(vid, pid) {
                return true;
            }
        }
    }

    false
}

/// Build the display label for one selectable port.
fn port_label(port: &DetectedPort, config: &Config) -> String {
    let name = if is_known_device(port, config) {
        style(&port.name).bold().to_string()
    } else {
        port.name.clone()
    };

    let device_info = if port.device.is_known() {
        format!(" [{}]", style(port.device.name()).yellow())
    } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };

    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!("{name}{device_info}{product}")
}

/// Interactive port selection.
fn select_port_interactive(mut ports: Vec<DetectedPort>, config: &Config) -> Result<SelectedPort> {
    eprintln!(
        "{} Detected {} serial ports",
        style("\u{2139}").blue(),
        ports.len()
    );

    // Sort: known devices first
    ports.sort_by_key(|p| !is_known_device(p, config));

    let port_names: Vec<String> = ports.iter().map(|p| port_label(p, config)).collect();

    // Truncate labels to fit terminal width to prevent wrapping in narrow
    // terminals.
    let term_width = console::Term::stderr().size().1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let port_names: Vec<String> = port_names
        .into_iter()
        .map(|n| console::truncate_str(&n, max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select serial port")
        .items(&port_names)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => {
            let port = ports
                .into_iter()
                .nth(index)
                .expect("selection index is within the presented list");
            Ok(SelectedPort {
                is_known: is_known_device(&port, config),
                port,
            })
        },
        None => Err(CliError::Cancelled("port selection cancelled".to_string()).into()),
    }
}

/// Confirm use of the only candidate port.
fn confirm_single_port(port: DetectedPort, config: &Config) -> Result<SelectedPort> {
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use serial port {}?", port_label(&port, config)))
        .default(true)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match confirmed {
        Some(true) => Ok(SelectedPort {
            is_known: is_known_device(&port, config),
            port,
        }),
        _ => Err(CliError::Cancelled("port selection cancelled".to_string()).into()),
    }
}

/// Offer to remember an unknown USB device for future auto-detection.
pub fn ask_remember_port(port: &DetectedPort, config: &mut Config) -> Result<()> {
    let (Some(vid), Some(pid)) = (port.vid, port.pid) else {
        return Ok(()); // Nothing identifying to remember
    };

    if !std::io::stdin().is_terminal() || !std::io::stderr().is_terminal() {
        return Ok(());
    }

    let remember = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Remember this device ({vid:04X}:{pid:04X}) for auto-detection?"
        ))
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if remember {
        config.remember_usb_device(vid, pid)?;
        eprintln!("{} Device saved for future auto-detection", style("\u{2713}").green());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unknown_port(name: &str) -> DetectedPort {
        DetectedPort {
            name: name.to_string(),
            device: DeviceKind::Unknown,
            vid: Some(0x1234),
            pid: Some(0x5678),
            manufacturer: None,
            product: None,
            serial: None,
        }
    }

    #[test]
    fn test_is_known_device_from_builtin_list() {
        let port = DetectedPort {
            name: "/dev/ttyUSB0".to_string(),
            device: DeviceKind::Cp210x,
            vid: Some(0x10C4),
            pid: Some(0xEA60),
            manufacturer: None,
            product: None,
            serial: None,
        };
        assert!(is_known_device(&port, &Config::default()));
    }

    #[test]
    fn test_is_known_device_from_config() {
        let port = unknown_port("/dev/ttyACM3");
        let mut config = Config::default();
        assert!(!is_known_device(&port, &config));

        config.port.usb_device.push(crate::config::UsbDevice {
            vid: 0x1234,
            pid: 0x5678,
        });
        assert!(is_known_device(&port, &config));
    }

    #[test]
    fn test_non_interactive_single_port() {
        let selected =
            select_non_interactive_port(vec![unknown_port("/dev/ttyUSB0")], &Config::default())
                .unwrap();
        assert_eq!(selected.port.name, "/dev/ttyUSB0");
        assert!(!selected.is_known);
    }

    #[test]
    fn test_non_interactive_multiple_ports_fails() {
        let result = select_non_interactive_port(
            vec![unknown_port("/dev/ttyUSB0"), unknown_port("/dev/ttyUSB1")],
            &Config::default(),
        );
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));
    }

    #[test]
    fn test_non_interactive_no_ports_fails() {
        let result = select_non_interactive_port(Vec::new(), &Config::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_port_label_shows_vid_pid_for_unknown() {
        let label = port_label(&unknown_port("/dev/ttyUSB0"), &Config::default());
        assert!(label.contains("/dev/ttyUSB0"));
        assert!(label.contains("1234:5678"));
    }
}
