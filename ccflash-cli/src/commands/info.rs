//! Info and list-ports command implementations.

use std::path::Path;

use anyhow::{Context, Result};
use ccflash::{ChunkCursor, FirmwareImage, MAX_PACKET_PAYLOAD};
use console::style;

/// Info command implementation.
pub(crate) fn cmd_info(firmware: &Path, bin: bool, json: bool) -> Result<()> {
    let image = if bin {
        FirmwareImage::from_raw_file(firmware)
    } else {
        FirmwareImage::from_hex_file(firmware)
    }
    .with_context(|| format!("failed to load firmware image {}", firmware.display()))?;

    let cursor = ChunkCursor::new(image.len());
    let packets = cursor.packet_count();
    let total_steps = ccflash::session::SessionProgress::new(packets).total_steps();
    let tail = image.len() % MAX_PACKET_PAYLOAD;

    if json {
        let info = serde_json::json!({
            "format": if bin { "raw" } else { "intel-hex" },
            "size": image.len(),
            "data_packets": packets,
            "packet_payload": MAX_PACKET_PAYLOAD,
            "final_packet_size": tail,
            "total_steps": total_steps,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&info).unwrap_or_default()
        );
        return Ok(());
    }

    eprintln!("\n{}", style("Firmware Image").bold().underlined());
    eprintln!(
        "  Format:            {}",
        if bin { "raw binary" } else { "Intel HEX" }
    );
    eprintln!("  Size:              {} bytes", image.len());
    eprintln!(
        "  Data packets:      {packets} ({MAX_PACKET_PAYLOAD}-byte payload, final packet {tail} bytes)"
    );
    eprintln!("  Session steps:     {total_steps}");

    Ok(())
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) {
    let detected = ccflash::detect_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "device": p.device.name(),
                    "known": p.device.is_known(),
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                    "serial": p.serial,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).unwrap_or_default()
        );
        return;
    }

    eprintln!("{}", style("Available serial ports").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("no serial ports found").dim());
        return;
    }

    for line in ccflash::device::format_port_list(&detected) {
        eprintln!("  {} {}", style("\u{2022}").green(), line);
    }

    // Show auto-detection result
    if let Ok(auto_port) = ccflash::auto_detect_port() {
        eprintln!(
            "\n{} Would auto-select: {}",
            style("\u{2192}").green().bold(),
            style(&auto_port.name).cyan().bold()
        );
    }
}
