//! Connection and bootloader mode command implementations.

use {
    crate::{Cli, config::Config, open_session},
    anyhow::{Context, Result},
    console::style,
    maxbl::connection::format_hex,
};

/// Connect command implementation: the session switches the bridge.
pub(crate) fn cmd_connect(cli: &Cli, config: &Config) -> Result<()> {
    let bl = open_session(cli, config)?;
    if !cli.quiet {
        eprintln!(
            "{} Bridge ready on {}",
            style("✓").green(),
            bl.settings()
                .mode
        );
    }
    Ok(())
}

/// Target command implementation.
pub(crate) fn cmd_target(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let mut bl = open_session(cli, config)?;

    if !cli.quiet && !json {
        eprintln!("{} Entering bootloader mode...", style("⏳").yellow());
    }
    bl.enter_bootloader_mode()
        .context("Entering bootloader mode")?;

    let part = bl.get_target_type()?;
    let version = bl.get_target_version()?;
    let page_size = bl.get_page_size()?;
    let usn = bl.get_usn()?;

    if json {
        let info = serde_json::json!({
            "part": part.name(),
            "platform_id": part.platform_id(),
            "version": version.to_string(),
            "page_size": page_size,
            "usn": format_hex(&usn),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&info)?
        );
        return Ok(());
    }

    println!("{:<15}: {part}", "Part");
    println!("{:<15}: {version}", "Bootloader");
    println!("{:<15}: {page_size} bytes", "Page size");
    println!("{:<15}: {}", "USN", format_hex(&usn));
    Ok(())
}

/// Enter command implementation.
pub(crate) fn cmd_enter(cli: &Cli, config: &Config, hard_reset: bool) -> Result<()> {
    let mut bl = open_session(cli, config)?;
    if hard_reset {
        bl.enter_bootloader_mode()?;
    } else {
        bl.enter_bootloader()?;
    }
    if !cli.quiet {
        eprintln!("{} Target in bootloader mode", style("✓").green().bold());
    }
    Ok(())
}

/// Exit command implementation.
pub(crate) fn cmd_exit(cli: &Cli, config: &Config) -> Result<()> {
    let mut bl = open_session(cli, config)?;
    bl.exit_bootloader()?;
    if !cli.quiet {
        eprintln!("{} Application started", style("✓").green().bold());
    }
    Ok(())
}
