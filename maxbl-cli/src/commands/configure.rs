//! Bootloader configuration command implementations.

use {
    crate::{Cli, ConfigSetArgs, config::Config, open_session},
    anyhow::{Context, Result},
    console::style,
    maxbl::{BootloaderConfig, bootloader::encode_exit_timeout},
};

fn yes_no(value: bool) -> &'static str {
    if value { "enabled" } else { "disabled" }
}

/// Human-readable configuration table.
fn format_config(cfg: &BootloaderConfig) -> Vec<String> {
    vec![
        format!("{:<18}: {}", "Enter BL check", yes_no(cfg.enter_bl_check)),
        format!("{:<18}: P{}.{}", "EBL pin", cfg.ebl_port, cfg.ebl_pin),
        format!("{:<18}: {}", "EBL polarity", cfg.ebl_polarity),
        format!("{:<18}: {}", "UART", yes_no(cfg.uart_enable)),
        format!("{:<18}: {}", "I2C", yes_no(cfg.i2c_enable)),
        format!("{:<18}: {}", "SPI", yes_no(cfg.spi_enable)),
        format!("{:<18}: 0x{:02X}", "I2C address", cfg.i2c_addr),
        format!("{:<18}: {}", "Exit mode", cfg.exit_mode),
        format!("{:<18}: {} ms", "Exit timeout", cfg.exit_timeout_ms()),
        format!("{:<18}: {}", "CRC check", yes_no(cfg.crc_check)),
        format!("{:<18}: {}", "Valid mark check", yes_no(cfg.valid_mark_check)),
        format!("{:<18}: {}", "SWD lock", if cfg.lock_swd { "locked" } else { "unlocked" }),
    ]
}

/// Apply the requested changes to a configuration read from the target.
fn apply_changes(cfg: &mut BootloaderConfig, args: &ConfigSetArgs) -> Result<()> {
    if let Some(v) = args.enter_bl_check {
        cfg.enter_bl_check = v;
    }
    if let Some(port) = args.ebl_port {
        cfg.ebl_port = port;
    }
    if let Some(pin) = args.ebl_pin {
        cfg.ebl_pin = pin;
    }
    if let Some(level) = args.ebl_polarity {
        cfg.ebl_polarity = u8::from(level.is_high());
    }
    if let Some(v) = args.valid_mark_check {
        cfg.valid_mark_check = v;
    }
    if let Some(v) = args.uart {
        cfg.uart_enable = v;
    }
    if let Some(v) = args.i2c {
        cfg.i2c_enable = v;
    }
    if let Some(v) = args.spi {
        cfg.spi_enable = v;
    }
    if let Some(addr) = args.address {
        cfg.i2c_addr = addr;
    }
    if let Some(v) = args.crc_check {
        cfg.crc_check = v;
    }
    if let Some(mode) = args.exit_mode {
        cfg.exit_mode = mode.into();
    }
    if let Some(ms) = args.exit_timeout {
        cfg.ebl_timeout = encode_exit_timeout(ms)?;
    }
    Ok(())
}

/// Config get command implementation.
pub(crate) fn cmd_config_get(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let mut bl = open_session(cli, config)?;
    let cfg = bl.read_config()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&cfg)?
        );
        return Ok(());
    }

    for line in format_config(&cfg) {
        println!("{line}");
    }
    Ok(())
}

/// Config set command implementation.
pub(crate) fn cmd_config_set(cli: &Cli, config: &Config, args: &ConfigSetArgs) -> Result<()> {
    let mut bl = open_session(cli, config)?;
    let mut cfg = bl
        .read_config()
        .context("Reading current configuration")?;
    apply_changes(&mut cfg, args)?;

    if args.lock_swd {
        if !cli.quiet {
            eprintln!("{} Locking SWD", style("⚠").yellow());
        }
        bl.set_swd_lock(true)?;
    }
    bl.write_config(&cfg)?;

    if !cli.quiet {
        eprintln!("{} Configuration saved", style("✓").green().bold());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{ExitModeArg, Level},
        maxbl::{ConfigLayout, ExitMode},
    };

    fn current() -> BootloaderConfig {
        BootloaderConfig::from_word(ConfigLayout::Current, 0)
    }

    #[test]
    fn test_apply_changes_only_touches_given_fields() {
        let mut cfg = current();
        let before = cfg.clone();
        apply_changes(&mut cfg, &ConfigSetArgs::default()).unwrap();
        assert_eq!(cfg, before);
    }

    #[test]
    fn test_apply_changes() {
        let mut cfg = current();
        let args = ConfigSetArgs {
            uart: Some(true),
            address: Some(0x42),
            ebl_polarity: Some(Level::High),
            exit_mode: Some(ExitModeArg::Timeout),
            exit_timeout: Some(1000),
            ..ConfigSetArgs::default()
        };
        apply_changes(&mut cfg, &args).unwrap();
        assert!(cfg.uart_enable);
        assert_eq!(cfg.i2c_addr, 0x42);
        assert_eq!(cfg.ebl_polarity, 1);
        assert_eq!(cfg.exit_mode, ExitMode::Timeout);
        assert_eq!(cfg.ebl_timeout, 10);
    }

    #[test]
    fn test_apply_changes_rejects_zero_timeout() {
        let mut cfg = current();
        let args = ConfigSetArgs {
            exit_timeout: Some(0),
            ..ConfigSetArgs::default()
        };
        assert!(apply_changes(&mut cfg, &args).is_err());
    }

    #[test]
    fn test_format_config() {
        let mut cfg = current();
        cfg.i2c_addr = 0x55;
        cfg.ebl_timeout = 10;
        let lines = format_config(&cfg);
        assert!(lines.iter().any(|l| l.ends_with("0x55")));
        assert!(lines.iter().any(|l| l.ends_with("1024 ms")));
    }
}
