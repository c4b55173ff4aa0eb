//! Firmware info and port listing command implementations.

use {
    anyhow::{Context, Result},
    console::style,
    maxbl::{Msbl, auto_detect_port, connection::format_hex, detect_ports},
    std::path::Path,
};

/// Structured view of an MSBL file for `--json`.
fn msbl_json(image: &Msbl) -> serde_json::Value {
    let header = image.header();
    serde_json::json!({
        "magic": header.magic_str(),
        "format_version": header.format_version,
        "target": header.target_name(),
        "encryption": header.encryption_type(),
        "num_pages": header.num_pages,
        "page_size": header.page_size,
        "crc_size": header.crc_size,
        "nonce": format_hex(&header.nonce),
        "auth": format_hex(&header.auth),
        "file_size": image.file_len(),
        "crc32": format!("0x{:08X}", image.crc32()),
        "crc_valid": image.verify_crc().is_ok(),
    })
}

/// Info command implementation.
pub(crate) fn cmd_info(firmware: &Path, json: bool) -> Result<()> {
    let image = Msbl::from_file(firmware)
        .with_context(|| format!("Failed to load firmware {}", firmware.display()))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&msbl_json(&image))?
        );
        return Ok(());
    }

    println!("{image}");
    let crc_status = if image
        .verify_crc()
        .is_ok()
    {
        style("valid").green()
    } else {
        style("MISMATCH").red()
    };
    println!("{:<15}: {crc_status}", "CRC check");
    Ok(())
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = detect_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "device": p.device.name(),
                    "known": p.device.is_known(),
                    "bridge": p.device.is_bridge(),
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
            serde_json::to_string_pretty(&ports)?
        );
        return Ok(());
    }

    eprintln!(
        "{}",
        style("Available serial ports:")
            .bold()
            .underlined()
    );

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for line in maxbl::format_port_list(&detected) {
        eprintln!("  {} {line}", style("•").green());
    }

    if let Ok(auto_port) = auto_detect_port() {
        eprintln!(
            "\n{} Default port: {}",
            style("→")
                .green()
                .bold(),
            style(&auto_port.name)
                .cyan()
                .bold()
        );
    }
    Ok(())
}
