use clap::ArgMatches;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::devices::flowmeter::FLOWMETER_START_REGISTER;
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub polling: PollingConfig,
    pub output: OutputConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    /// Per-call read timeout.
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_seconds: u64,
    /// Polled in ascending order every cycle.
    pub device_ids: Vec<u8>,
    pub start_register: u16,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Upper bound on collecting one whole response.
    pub response_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub console: bool,
    pub file_output: Option<FileOutputConfig>,
    pub database_output: Option<DatabaseOutputConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileOutputConfig {
    pub enabled: bool,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseOutputConfig {
    pub enabled: bool,
    pub database_path: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
    pub enable_wal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

impl Default for SerialConfig {
    fn default() -> Self {
        let port = if cfg!(target_os = "windows") {
            "COM6"
        } else {
            "/dev/ttyUSB0"
        };
        Self {
            port: port.to_string(),
            baud_rate: 9600,
            parity: ParityConfig::None,
            read_timeout_ms: 1000,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            device_ids: vec![1, 2],
            start_register: FLOWMETER_START_REGISTER,
            max_attempts: 3,
            retry_delay_ms: 500,
            response_timeout_ms: 3000,
        }
    }
}

impl Default for FileOutputConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "./data/flow_readings.jsonl".to_string(),
        }
    }
}

impl Default for DatabaseOutputConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: "data/flow_data.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 30000,
            enable_wal: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            console: true,
            file_output: Some(FileOutputConfig::default()),
            database_output: Some(DatabaseOutputConfig::default()),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            polling: PollingConfig::default(),
            output: OutputConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ModbusError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ModbusError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;

        info!("📄 Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads `path` when it exists, otherwise falls back to the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            warn!("⚠️  Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ModbusError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ModbusError::Config(format!("cannot serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Command line values take precedence over the file.
    pub fn apply_matches(&mut self, matches: &ArgMatches) -> Result<(), ModbusError> {
        if let Some(port) = matches.get_one::<String>("port") {
            self.serial.port = port.clone();
        }

        if let Some(baud) = matches.get_one::<String>("baud") {
            self.serial.baud_rate = baud
                .parse()
                .map_err(|_| ModbusError::Config(format!("invalid baud rate: {}", baud)))?;
        }

        if let Some(interval) = matches.get_one::<String>("interval") {
            self.polling.interval_seconds = interval
                .parse()
                .map_err(|_| ModbusError::Config(format!("invalid interval: {}", interval)))?;
        }

        if let Some(devices_str) = matches.get_one::<String>("devices") {
            self.polling.device_ids = parse_device_ids(devices_str)?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        if self.serial.port.trim().is_empty() {
            return Err(ModbusError::Config("serial port must not be empty".to_string()));
        }
        if self.serial.baud_rate == 0 {
            return Err(ModbusError::Config("baud rate must be positive".to_string()));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err(ModbusError::Config("read timeout must be positive".to_string()));
        }
        if self.polling.response_timeout_ms == 0 {
            return Err(ModbusError::Config("response timeout must be positive".to_string()));
        }
        if self.polling.interval_seconds == 0 {
            return Err(ModbusError::Config("polling interval must be positive".to_string()));
        }
        if self.polling.device_ids.is_empty() {
            return Err(ModbusError::Config("at least one device id is required".to_string()));
        }
        if self.polling.device_ids.contains(&0) {
            return Err(ModbusError::Config(
                "device id 0 is the broadcast address".to_string(),
            ));
        }
        if self.polling.max_attempts == 0 {
            return Err(ModbusError::Config("max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Device ids in polling order, without duplicates.
    pub fn device_ids(&self) -> Vec<u8> {
        let mut ids = self.polling.device_ids.clone();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn file_output_path(&self) -> Option<&str> {
        self.output
            .file_output
            .as_ref()
            .filter(|f| f.enabled)
            .map(|f| f.path.as_str())
    }

    pub fn database_output(&self) -> Option<&DatabaseOutputConfig> {
        self.output.database_output.as_ref().filter(|db| db.enabled)
    }
}

pub fn parse_device_ids(devices_str: &str) -> Result<Vec<u8>, ModbusError> {
    devices_str
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u8>()
                .map_err(|_| ModbusError::Config(format!("invalid device id: {}", s)))
        })
        .collect()
}
