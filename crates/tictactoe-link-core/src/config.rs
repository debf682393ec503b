//! Settings store for the link client.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{Error, GameMode, Result};

/// Baud rates the client accepts.
pub const SUPPORTED_BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

/// Check a baud rate against [`SUPPORTED_BAUD_RATES`].
pub fn validate_baud_rate(baud_rate: u32) -> Result<()> {
    if SUPPORTED_BAUD_RATES.contains(&baud_rate) {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "baud rate {baud_rate} is not one of {SUPPORTED_BAUD_RATES:?}"
        )))
    }
}

/// Client settings loaded from YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Serial link settings
    pub serial: SerialSettings,
    /// Game settings
    pub game: GameSettings,
    /// Ticker intervals
    pub timing: TimingSettings,
    /// Front end settings
    pub server: ServerSettings,
}

impl ClientConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ClientConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Write the configuration to a YAML file, replacing any existing one.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Load from `path`, writing defaults there first if the file does not exist.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_file(path);
        }
        let config = Self::default();
        config.save_to_file(path)?;
        tracing::info!("Created default settings at {}", path.display());
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(Error::Config(format!(
                "serial.baud_rate {} is not supported",
                self.serial.baud_rate
            )));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err(Error::Config(
                "serial.read_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.timing.ai_poll_interval_ms == 0 || self.timing.keepalive_interval_ms == 0 {
            return Err(Error::Config(
                "timing intervals must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Baud rate used when none is given at connect time
    pub baud_rate: u32,
    /// Reply deadline in milliseconds
    pub read_timeout_ms: u64,
}

impl SerialSettings {
    /// Reply deadline.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            read_timeout_ms: 1000,
        }
    }
}

/// Game settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GameSettings {
    /// Mode label at startup
    pub default_mode: GameMode,
}

/// Ticker intervals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// AI poll tick in milliseconds
    pub ai_poll_interval_ms: u64,
    /// Keepalive probe period in milliseconds
    pub keepalive_interval_ms: u64,
}

impl TimingSettings {
    /// AI poll tick.
    pub fn ai_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ai_poll_interval_ms)
    }

    /// Keepalive probe period.
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            ai_poll_interval_ms: 100,
            keepalive_interval_ms: 1000,
        }
    }
}

/// Front end settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.read_timeout_ms, 1000);
        assert_eq!(config.game.default_mode, GameMode::HumanVsHuman);
        assert_eq!(config.timing.ai_poll_interval_ms, 100);
        assert_eq!(config.timing.keepalive_interval_ms, 1000);
        assert_eq!(config.server.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
serial:
  baud_rate: 115200
  read_timeout_ms: 250
game:
  default_mode: ai-vs-ai
timing:
  ai_poll_interval_ms: 50
  keepalive_interval_ms: 2000
server:
  log_level: debug
"#;
        let config = ClientConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.read_timeout(), Duration::from_millis(250));
        assert_eq!(config.game.default_mode, GameMode::AiVsAi);
        assert_eq!(config.timing.ai_poll_interval(), Duration::from_millis(50));
        assert_eq!(config.server.log_level, "debug");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = ClientConfig::from_yaml("game:\n  default_mode: \"Man vs AI\"\n").unwrap();
        assert_eq!(config.game.default_mode, GameMode::HumanVsAi);
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.timing.keepalive_interval_ms, 1000);
    }

    #[test]
    fn test_unsupported_baud_rate() {
        let result = ClientConfig::from_yaml("serial:\n  baud_rate: 1234\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut config = ClientConfig::default();
        config.timing.ai_poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.serial.read_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            ClientConfig::from_yaml("serial: [not, a, map]"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_validate_baud_rate() {
        for rate in SUPPORTED_BAUD_RATES {
            assert!(validate_baud_rate(rate).is_ok());
        }
        assert!(matches!(
            validate_baud_rate(300),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tictactoe.yaml");

        let mut config = ClientConfig::default();
        config.game.default_mode = GameMode::AiVsAi;
        config.serial.baud_rate = 57600;
        config.save_to_file(&path).unwrap();

        let loaded = ClientConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tictactoe.yaml");
        assert!(!path.exists());

        let config = ClientConfig::load_or_create(&path).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert!(path.exists());

        let again = ClientConfig::load_or_create(&path).unwrap();
        assert_eq!(again, config);
    }
}
