//! Configuration file support for maxbl.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (MAXBL_*)
//! 3. Local config file (./maxbl.toml)
//! 4. Global config file (~/.config/maxbl/config.toml)
//!
//! ```toml
//! [connection]
//! port = "/dev/ttyACM0"
//! baud = 115200
//! timeout_ms = 500
//!
//! [bridge]
//! mode = "I2C"
//! reset_pin = "gpio0"
//! mfio_pin = "gpio1"
//! mfio_polarity = false
//! i2c_addr = 0x55
//! ```

use {
    directories::ProjectDirs,
    log::{debug, warn},
    maxbl::{BridgeMode, BridgeSettings, GpioPin},
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Local configuration file name.
pub const LOCAL_CONFIG: &str = "maxbl.toml";

/// Serial connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub port: Option<String>,
    /// Baud rate.
    pub baud: Option<u32>,
    /// Read timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Bridge and target wiring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bus the bridge forwards to.
    pub mode: Option<BridgeMode>,
    /// Bridge GPIO wired to the target reset.
    pub reset_pin: Option<GpioPin>,
    /// Bridge GPIO wired to the target MFIO.
    pub mfio_pin: Option<GpioPin>,
    /// Level that asserts MFIO.
    pub mfio_polarity: Option<bool>,
    /// Target I2C address.
    pub i2c_addr: Option<u8>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Bridge settings.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl Config {
    /// Load configuration from the global file, then the local one.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse TOML config {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "maxbl").map(|dirs| {
            dirs.config_dir()
                .to_path_buf()
        })
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one; set values in `other` win.
    fn merge(&mut self, other: Self) {
        let Self { connection, bridge } = other;

        if connection.port.is_some() {
            self.connection.port = connection.port;
        }
        if connection.baud.is_some() {
            self.connection.baud = connection.baud;
        }
        if connection.timeout_ms.is_some() {
            self.connection.timeout_ms = connection.timeout_ms;
        }

        if bridge.mode.is_some() {
            self.bridge.mode = bridge.mode;
        }
        if bridge.reset_pin.is_some() {
            self.bridge.reset_pin = bridge.reset_pin;
        }
        if bridge.mfio_pin.is_some() {
            self.bridge.mfio_pin = bridge.mfio_pin;
        }
        if bridge.mfio_polarity.is_some() {
            self.bridge.mfio_polarity = bridge.mfio_polarity;
        }
        if bridge.i2c_addr.is_some() {
            self.bridge.i2c_addr = bridge.i2c_addr;
        }
    }

    /// Read timeout, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.connection
            .timeout_ms
            .map(Duration::from_millis)
    }

    /// Bridge settings from the file, with library defaults for unset values.
    pub fn bridge_settings(&self) -> BridgeSettings {
        let defaults = BridgeSettings::default();
        let bridge = &self.bridge;
        BridgeSettings::default()
            .with_mode(
                bridge
                    .mode
                    .unwrap_or(defaults.mode),
            )
            .with_pins(
                bridge
                    .reset_pin
                    .unwrap_or(defaults.reset_pin),
                bridge
                    .mfio_pin
                    .unwrap_or(defaults.mfio_pin),
            )
            .with_mfio_polarity(
                bridge
                    .mfio_polarity
                    .unwrap_or(defaults.mfio_polarity),
            )
            .with_i2c_addr(
                bridge
                    .i2c_addr
                    .unwrap_or(defaults.i2c_addr),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.connection.port.is_none());
        assert!(config.connection.baud.is_none());
        assert!(config.timeout().is_none());
        assert!(config.bridge.mode.is_none());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[connection]
port = "/dev/ttyACM0"
baud = 115200
timeout_ms = 750

[bridge]
mode = "I2C"
reset_pin = "gpio1"
mfio_pin = "gpio0"
mfio_polarity = true
i2c_addr = 0x58
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.connection.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.connection.baud, Some(115_200));
        assert_eq!(config.timeout(), Some(Duration::from_millis(750)));

        let settings = config.bridge_settings();
        assert_eq!(settings.mode, BridgeMode::I2c);
        assert_eq!(settings.reset_pin, GpioPin::Gpio1);
        assert_eq!(settings.mfio_pin, GpioPin::Gpio0);
        assert!(settings.mfio_polarity);
        assert_eq!(settings.i2c_addr, 0x58);
    }

    #[test]
    fn test_bridge_settings_defaults() {
        let settings = Config::default().bridge_settings();
        assert_eq!(settings, BridgeSettings::default());
    }

    #[test]
    fn test_config_from_partial_toml() {
        let config: Config = toml::from_str("[bridge]\nmode = \"SPI\"\n").unwrap();
        assert!(config.connection.port.is_none());
        assert_eq!(config.bridge.mode, Some(BridgeMode::Spi));
        assert_eq!(config.bridge_settings().i2c_addr, 0x55);
    }

    #[test]
    fn test_config_rejects_unknown_mode() {
        assert!(toml::from_str::<Config>("[bridge]\nmode = \"USB\"\n").is_err());
    }

    #[test]
    fn test_config_merge_overrides_set_values() {
        let mut base = Config::default();
        base.connection.port = Some("/dev/ttyUSB0".to_string());
        base.connection.baud = Some(9600);

        let mut other = Config::default();
        other.connection.baud = Some(115_200);
        other.bridge.mode = Some(BridgeMode::Uart2);

        base.merge(other);
        assert_eq!(base.connection.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(base.connection.baud, Some(115_200));
        assert_eq!(base.bridge.mode, Some(BridgeMode::Uart2));
    }

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir
            .path()
            .join("maxbl.toml");
        fs::write(&path, "[connection]\nport = \"COM4\"\n").unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.connection.port.as_deref(), Some("COM4"));
    }

    #[test]
    fn test_load_from_path_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir
            .path()
            .join("maxbl.toml");
        fs::write(&path, "invalid toml [[[").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.connection.port.is_none());
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.connection.port.is_none());
    }

    #[test]
    fn test_global_config_path() {
        if let Some(p) = Config::global_config_path() {
            let p = p.to_string_lossy();
            assert!(p.contains("maxbl"));
            assert!(p.ends_with("config.toml"));
        }
    }
}
