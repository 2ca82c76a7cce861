//! Flash command implementation.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use ccflash::{FirmwareImage, Flasher, MAX_PACKET_PAYLOAD, SessionConfig, SessionEvent};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};

use crate::config::Config;
use crate::{Cli, CliError, get_port, use_fancy_output};

/// Watchdog deadline applied when neither the CLI nor config give one.
const DEFAULT_WATCHDOG_MS: u64 = 2000;

/// Load a firmware image from disk.
fn load_image(firmware: &Path, bin: bool) -> Result<FirmwareImage> {
    let image = if bin {
        FirmwareImage::from_raw_file(firmware)
    } else {
        FirmwareImage::from_hex_file(firmware)
    }
    .with_context(|| format!("failed to load firmware image {}", firmware.display()))?;

    if image.is_empty() {
        return Err(CliError::Usage(format!(
            "firmware image {} contains no data",
            firmware.display()
        ))
        .into());
    }

    Ok(image)
}

/// Flash command implementation.
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &mut Config,
    firmware: &Path,
    bin: bool,
    watchdog: Option<u64>,
) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading firmware image {}",
            style("\u{1F4E6}").cyan(),
            firmware.display()
        );
    }

    let image = load_image(firmware, bin)?;
    let packets = image.len() / MAX_PACKET_PAYLOAD + 1;
    if !cli.quiet {
        eprintln!(
            "{} Image: {} bytes, {} data packets",
            style("\u{2139}").blue(),
            image.len(),
            packets
        );
    }

    // Get port
    let port = get_port(cli, config)?;
    if !cli.quiet {
        eprintln!(
            "{} Using port {} at {} baud",
            style("\u{1F50C}").cyan(),
            port,
            cli.baud
        );
    }

    let watchdog_ms = watchdog
        .or(config.flash.watchdog_ms)
        .unwrap_or(DEFAULT_WATCHDOG_MS);
    debug!("watchdog timeout: {watchdog_ms} ms");

    let session = SessionConfig::new(port.as_str(), cli.baud)
        .with_watchdog_timeout(Duration::from_millis(watchdog_ms));
    let mut flasher =
        Flasher::open(session).with_context(|| format!("failed to open serial port {port}"))?;

    // Ctrl-C aborts the session; the flasher closes the port itself.
    let abort = Arc::new(AtomicBool::new(false));
    {
        let abort = Arc::clone(&abort);
        if let Err(e) = ctrlc::set_handler(move || abort.store(true, Ordering::Relaxed)) {
            warn!("Failed to install Ctrl-C handler: {e}");
        }
    }
    flasher = flasher.with_abort_flag(abort);

    // Create progress bar
    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(100);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    let quiet = cli.quiet;
    let result = flasher.flash(image, |event| match event {
        SessionEvent::Log(line) => {
            if !quiet {
                for part in line.lines() {
                    pb.println(format!("  {} {part}", style("\u{2502}").dim()));
                }
            }
        },
        SessionEvent::Progress(percent) => pb.set_position(u64::from(percent)),
        SessionEvent::Error(msg) => debug!("session failed: {msg}"),
        SessionEvent::Success(msg) => debug!("{msg}"),
    });

    match result {
        Ok(()) => {
            pb.finish_with_message("complete");
            if !cli.quiet {
                eprintln!(
                    "\n{} Flashing process has been successfully completed!",
                    style("\u{1F389}").green().bold()
                );
            }
            Ok(())
        },
        Err(ccflash::Error::Aborted) => {
            pb.abandon();
            Err(CliError::Cancelled("flashing aborted".to_string()).into())
        },
        Err(err) => {
            pb.abandon();
            Err(anyhow::Error::new(err).context("flashing process failed"))
        },
    }
}
