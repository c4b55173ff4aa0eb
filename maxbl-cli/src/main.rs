//! maxbl CLI - firmware updates through the Maxim secure bootloader.
//!
//! ## Features
//!
//! - Flash MSBL images (reset, page count, IV, auth, erase, pages, exit)
//! - Inspect MSBL files without a target attached
//! - Query target identity and bootloader configuration
//! - Drive the MAX32625PICO bridge (mode, GPIO, pull-ups)
//! - Shell completion generation
//! - Environment variable and config file support

use {
    anyhow::{Context, Result},
    clap::{Args, Parser, Subcommand, ValueEnum},
    clap_complete::Shell,
    console::style,
    env_logger::Env,
    log::debug,
    maxbl::{Bootloader, BridgeMode, ExitMode, SerialConfig, SerialTransport},
    std::{
        env,
        path::PathBuf,
        sync::atomic::{AtomicBool, Ordering},
    },
};

mod commands;
mod config;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Exit code for operations cancelled with Ctrl-C.
const EXIT_CANCELLED: i32 = 130;

/// maxbl - firmware updates for Maxim bootloader targets.
///
/// Environment variables:
///   MAXBL_PORT          - Default serial port
///   MAXBL_BAUD          - Baud rate (default: 115200)
///   MAXBL_BRIDGE_MODE   - Bridge bus (I2C, SPI, UART0, UART2, IDLE)
///   MAXBL_I2C_ADDR      - Target I2C address (hex)
#[derive(Parser)]
#[command(name = "maxbl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "MAXBL_PORT")]
    pub(crate) port: Option<String>,

    /// Baud rate.
    #[arg(short, long, global = true, env = "MAXBL_BAUD")]
    pub(crate) baud: Option<u32>,

    /// Bus the bridge forwards bootloader traffic to.
    #[arg(long, global = true, env = "MAXBL_BRIDGE_MODE", value_name = "MODE")]
    pub(crate) bridge_mode: Option<BridgeMode>,

    /// Target I2C address (hex, e.g. 0x55).
    #[arg(long, global = true, env = "MAXBL_I2C_ADDR", value_parser = parse_hex_u8)]
    pub(crate) i2c_addr: Option<u8>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Switch the bridge to the configured bus.
    Connect,

    /// Flash an MSBL firmware image.
    Flash {
        /// Path to the MSBL file.
        firmware: PathBuf,

        /// Check the file's trailing CRC32 before flashing.
        #[arg(long)]
        verify_crc: bool,
    },

    /// Show information about an MSBL file.
    Info {
        /// Path to the MSBL file.
        firmware: PathBuf,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Enter bootloader mode and report the target's identity.
    Target {
        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Put the target into bootloader mode.
    Enter {
        /// Pulse reset (and MFIO if needed) instead of sending only SET_MODE.
        #[arg(long)]
        hard_reset: bool,
    },

    /// Leave bootloader mode and start the application.
    Exit,

    /// Erase the application (target must be in bootloader mode).
    Erase,

    /// Load an AES key and AAD (target must be in bootloader mode).
    LoadKey {
        /// Key file with aes_key_start/aes_aad_start blocks.
        key_file: PathBuf,
    },

    /// Read or change the bootloader configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Drive the bridge adapter directly.
    Bridge {
        #[command(subcommand)]
        action: BridgeAction,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    /// Name used in failure reports.
    fn operation(&self) -> &'static str {
        match self {
            Self::Connect => "Connect",
            Self::Flash { .. } => "Flash",
            Self::Info { .. } => "Info",
            Self::Target { .. } => "Target query",
            Self::Enter { .. } => "Enter bootloader",
            Self::Exit => "Exit bootloader",
            Self::Erase => "Erase",
            Self::LoadKey { .. } => "Load key",
            Self::Config {
                action: ConfigAction::Get { .. },
            } => "Read config",
            Self::Config {
                action: ConfigAction::Set(_),
            } => "Write config",
            Self::Bridge { .. } => "Bridge",
            Self::ListPorts { .. } => "List ports",
            Self::Completions { .. } => "Completions",
        }
    }
}

/// Bootloader configuration actions.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Read the configuration word.
    Get {
        /// Output configuration as JSON to stdout.
        #[arg(long)]
        json: bool,
    },
    /// Change configuration fields and save them to flash.
    Set(ConfigSetArgs),
}

/// Fields accepted by `config set`. Unset fields keep their current value.
#[derive(Args, Default)]
pub(crate) struct ConfigSetArgs {
    /// Check the EBL pin at boot.
    #[arg(long, value_name = "BOOL")]
    pub(crate) enter_bl_check: Option<bool>,

    /// EBL GPIO port.
    #[arg(long, value_name = "PORT")]
    pub(crate) ebl_port: Option<u8>,

    /// EBL GPIO pin.
    #[arg(long, value_name = "PIN")]
    pub(crate) ebl_pin: Option<u8>,

    /// EBL active level.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub(crate) ebl_polarity: Option<Level>,

    /// Check the application valid mark.
    #[arg(long, value_name = "BOOL")]
    pub(crate) valid_mark_check: Option<bool>,

    /// Enable the UART interface.
    #[arg(long, value_name = "BOOL")]
    pub(crate) uart: Option<bool>,

    /// Enable the I2C interface.
    #[arg(long, value_name = "BOOL")]
    pub(crate) i2c: Option<bool>,

    /// Enable the SPI interface.
    #[arg(long, value_name = "BOOL")]
    pub(crate) spi: Option<bool>,

    /// Bootloader I2C address (hex).
    #[arg(long, value_name = "ADDR", value_parser = parse_hex_u8)]
    pub(crate) address: Option<u8>,

    /// Check the application CRC.
    #[arg(long, value_name = "BOOL")]
    pub(crate) crc_check: Option<bool>,

    /// Bootloader exit behaviour.
    #[arg(long, value_enum, value_name = "MODE")]
    pub(crate) exit_mode: Option<ExitModeArg>,

    /// Exit timeout in milliseconds (rounded to a power of two).
    #[arg(long, value_name = "MS")]
    pub(crate) exit_timeout: Option<u32>,

    /// Lock the SWD port. This cannot be undone from the host.
    #[arg(long)]
    pub(crate) lock_swd: bool,
}

/// Bridge adapter actions.
#[derive(Subcommand)]
pub(crate) enum BridgeAction {
    /// Set the mode of both bridge GPIOs (4-bit values).
    GpioConfig {
        /// GPIO0 mode.
        #[arg(value_parser = parse_hex_u8)]
        gpio0: u8,
        /// GPIO1 mode.
        #[arg(value_parser = parse_hex_u8)]
        gpio1: u8,
    },
    /// Drive a bridge GPIO.
    GpioSet {
        /// GPIO number (0 or 1).
        pin: u8,
        /// Output level.
        #[arg(value_enum)]
        level: Level,
    },
    /// Read both bridge GPIO levels.
    GpioGet,
    /// Switch the on-board I2C pull-ups.
    Pullup {
        /// Pull-up state.
        #[arg(value_enum)]
        state: Switch,
    },
}

/// Logic level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum Level {
    /// Logic high.
    High,
    /// Logic low.
    Low,
}

impl Level {
    fn is_high(self) -> bool {
        matches!(self, Self::High)
    }
}

/// On/off switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum Switch {
    /// Enabled.
    On,
    /// Disabled.
    Off,
}

/// Bootloader exit behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum ExitModeArg {
    /// Start the application immediately.
    Immediate,
    /// Start the application after the exit timeout.
    Timeout,
    /// Stay in the bootloader.
    Indefinite,
}

impl From<ExitModeArg> for ExitMode {
    fn from(mode: ExitModeArg) -> Self {
        match mode {
            ExitModeArg::Immediate => ExitMode::Immediate,
            ExitModeArg::Timeout => ExitMode::Timeout,
            ExitModeArg::Indefinite => ExitMode::Indefinite,
        }
    }
}

/// Parse a hexadecimal byte (supports 0x prefix).
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(digits, 16).map_err(|e| format!("Invalid hex byte '{s}': {e}"))
}

/// Render a status code the way failure reports show it.
fn format_status(code: i32) -> String {
    if code < 0 {
        code.to_string()
    } else {
        format!("0x{code:02X}")
    }
}

/// Library error carried by an anyhow chain, if any.
fn library_error(err: &anyhow::Error) -> Option<&maxbl::Error> {
    err.chain()
        .find_map(|e| e.downcast_ref::<maxbl::Error>())
}

/// Process exit code for a failed command.
fn exit_code(err: &anyhow::Error) -> i32 {
    match library_error(err) {
        Some(maxbl::Error::Interrupted) => EXIT_CANCELLED,
        _ => 1,
    }
}

/// Print `"<operation> failed: <error> (status 0x..)"` to stderr.
fn report_error(operation: &str, err: &anyhow::Error) {
    let status = library_error(err)
        .map(|e| format!(" (status {})", format_status(e.status_code())))
        .unwrap_or_default();
    eprintln!(
        "{} {operation} failed: {err:#}{status}",
        style("Error:")
            .red()
            .bold()
    );
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn install_interrupt_handler() {
    let result = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            std::process::exit(EXIT_CANCELLED);
        }
        eprintln!("\nInterrupt received, stopping after the current step (Ctrl-C again to abort)");
    });
    if let Err(e) = result {
        debug!("Failed to install Ctrl-C handler: {e}");
    }
    maxbl::set_interrupt_checker(was_interrupted);
}

/// Resolve the serial port: flag/env, then config, then auto-detection.
fn get_port(cli: &Cli, config: &Config) -> Result<String> {
    if let Some(port) = cli
        .port
        .clone()
        .or_else(|| {
            config
                .connection
                .port
                .clone()
        })
    {
        return Ok(port);
    }
    let detected = maxbl::auto_detect_port()
        .context("No serial port given; use --port or set MAXBL_PORT")?;
    Ok(detected.name)
}

/// Open a bootloader session and switch the bridge to the session's bus.
pub(crate) fn open_session(cli: &Cli, config: &Config) -> Result<Bootloader<SerialTransport>> {
    let port = get_port(cli, config)?;
    let baud = cli
        .baud
        .or(config
            .connection
            .baud)
        .unwrap_or(maxbl::port::DEFAULT_BAUD);

    let mut serial = SerialConfig::new(port.clone(), baud);
    if let Some(timeout) = config.timeout() {
        serial = serial.with_timeout(timeout);
    }

    let mut settings = config.bridge_settings();
    if let Some(mode) = cli.bridge_mode {
        settings = settings.with_mode(mode);
    }
    if let Some(addr) = cli.i2c_addr {
        settings = settings.with_i2c_addr(addr);
    }
    let mode = settings.mode;

    if !cli.quiet {
        eprintln!(
            "{} Using port {} at {baud} baud, bridge {mode}",
            style("🔌").cyan(),
            style(&port).green()
        );
    }

    let mut bl = Bootloader::new(SerialTransport::new(serial), settings);
    let reply = bl
        .bridge()
        .switch_mode(mode)
        .with_context(|| format!("Switching bridge to {mode}"))?;
    debug!("Bridge reply: {reply}");
    Ok(bl)
}

fn run(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Commands::Connect => commands::target::cmd_connect(cli, config),
        Commands::Flash {
            firmware,
            verify_crc,
        } => commands::flash::cmd_flash(cli, config, firmware, *verify_crc),
        Commands::Info { firmware, json } => commands::info::cmd_info(firmware, *json),
        Commands::Target { json } => commands::target::cmd_target(cli, config, *json),
        Commands::Enter { hard_reset } => commands::target::cmd_enter(cli, config, *hard_reset),
        Commands::Exit => commands::target::cmd_exit(cli, config),
        Commands::Erase => commands::flash::cmd_erase(cli, config),
        Commands::LoadKey { key_file } => commands::flash::cmd_load_key(cli, config, key_file),
        Commands::Config { action } => match action {
            ConfigAction::Get { json } => commands::configure::cmd_config_get(cli, config, *json),
            ConfigAction::Set(args) => commands::configure::cmd_config_set(cli, config, args),
        },
        Commands::Bridge { action } => commands::bridge::cmd_bridge(cli, config, action),
        Commands::ListPorts { json } => commands::info::cmd_list_ports(*json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

fn main() {
    let cli = Cli::parse();

    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    init_logging(&cli);
    debug!(
        "maxbl v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );
    install_interrupt_handler();

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    if let Err(err) = run(&cli, &config) {
        report_error(
            cli.command
                .operation(),
            &err,
        );
        std::process::exit(exit_code(&err));
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_flash() {
        let cli = Cli::try_parse_from([
            "maxbl",
            "--port",
            "/dev/ttyACM0",
            "--baud",
            "115200",
            "flash",
            "app.msbl",
            "--verify-crc",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(cli.baud, Some(115_200));
        if let Commands::Flash {
            firmware,
            verify_crc,
        } = cli.command
        {
            assert_eq!(firmware.to_str().unwrap(), "app.msbl");
            assert!(verify_crc);
        } else {
            panic!("Expected Flash command");
        }
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["maxbl", "list-ports"]).unwrap();
        assert!(cli.port.is_none());
        assert!(cli.baud.is_none());
        assert!(cli.bridge_mode.is_none());
        assert!(cli.i2c_addr.is_none());
        assert!(cli.config_path.is_none());
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "maxbl",
            "--bridge-mode",
            "i2c",
            "--i2c-addr",
            "0x58",
            "-vv",
            "--config",
            "/tmp/maxbl.toml",
            "target",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.bridge_mode, Some(BridgeMode::I2c));
        assert_eq!(cli.i2c_addr, Some(0x58));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Target { json: true }));
    }

    #[test]
    fn test_cli_invalid_bridge_mode() {
        assert!(Cli::try_parse_from(["maxbl", "--bridge-mode", "usb", "connect"]).is_err());
    }

    #[test]
    fn test_cli_parse_enter() {
        let cli = Cli::try_parse_from(["maxbl", "enter", "--hard-reset"]).unwrap();
        assert!(matches!(cli.command, Commands::Enter { hard_reset: true }));
        let cli = Cli::try_parse_from(["maxbl", "enter"]).unwrap();
        assert!(matches!(cli.command, Commands::Enter { hard_reset: false }));
    }

    #[test]
    fn test_cli_parse_config_set() {
        let cli = Cli::try_parse_from([
            "maxbl",
            "config",
            "set",
            "--uart",
            "false",
            "--address",
            "5a",
            "--exit-mode",
            "timeout",
            "--exit-timeout",
            "1000",
            "--ebl-polarity",
            "high",
        ])
        .unwrap();
        let Commands::Config {
            action: ConfigAction::Set(args),
        } = cli.command
        else {
            panic!("Expected config set");
        };
        assert_eq!(args.uart, Some(false));
        assert_eq!(args.address, Some(0x5A));
        assert_eq!(args.exit_mode, Some(ExitModeArg::Timeout));
        assert_eq!(args.exit_timeout, Some(1000));
        assert_eq!(args.ebl_polarity, Some(Level::High));
        assert!(args.i2c.is_none());
        assert!(!args.lock_swd);
    }

    #[test]
    fn test_cli_parse_bridge() {
        let cli = Cli::try_parse_from(["maxbl", "bridge", "gpio-set", "1", "low"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Bridge {
                action: BridgeAction::GpioSet {
                    pin: 1,
                    level: Level::Low
                }
            }
        ));

        let cli = Cli::try_parse_from(["maxbl", "bridge", "gpio-config", "0x1", "F"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Bridge {
                action: BridgeAction::GpioConfig {
                    gpio0: 1,
                    gpio1: 0x0F
                }
            }
        ));

        let cli = Cli::try_parse_from(["maxbl", "bridge", "pullup", "on"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Bridge {
                action: BridgeAction::Pullup { state: Switch::On }
            }
        ));
    }

    #[test]
    fn test_cli_parse_load_key() {
        let cli = Cli::try_parse_from(["maxbl", "load-key", "aes.txt"]).unwrap();
        assert!(matches!(cli.command, Commands::LoadKey { .. }));
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["maxbl"]).is_err());
    }

    #[test]
    fn test_operation_names() {
        let cli = Cli::try_parse_from(["maxbl", "config", "get"]).unwrap();
        assert_eq!(cli.command.operation(), "Read config");
        let cli = Cli::try_parse_from(["maxbl", "erase"]).unwrap();
        assert_eq!(cli.command.operation(), "Erase");
    }

    #[test]
    fn test_parse_hex_u8() {
        assert_eq!(parse_hex_u8("0x55").unwrap(), 0x55);
        assert_eq!(parse_hex_u8("0XAA").unwrap(), 0xAA);
        assert_eq!(parse_hex_u8(" 5c ").unwrap(), 0x5C);
        assert!(parse_hex_u8("0x100").is_err());
        assert!(parse_hex_u8("zz").is_err());
    }

    #[test]
    fn test_format_status() {
        assert_eq!(format_status(0x81), "0x81");
        assert_eq!(format_status(0xFF), "0xFF");
        assert_eq!(format_status(-1), "-1");
    }

    #[test]
    fn test_exit_code_mapping() {
        let interrupted = anyhow::Error::new(maxbl::Error::Interrupted).context("Flashing");
        assert_eq!(exit_code(&interrupted), EXIT_CANCELLED);

        let device = anyhow::Error::new(maxbl::Error::Device {
            status: maxbl::Status::from(0x84),
        });
        assert_eq!(exit_code(&device), 1);
        assert_eq!(library_error(&device).map(maxbl::Error::status_code), Some(0x84));

        let other = anyhow::anyhow!("plain failure");
        assert_eq!(exit_code(&other), 1);
        assert!(library_error(&other).is_none());
    }
}
