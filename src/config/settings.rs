use clap::ArgMatches;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::modbus::client::{ClientConfig, RetryPolicy};
use crate::modbus::protocol::{MAX_SLAVE_ID, MIN_SLAVE_ID};
use crate::sampler::SamplePlan;
use crate::utils::error::ModbusError;

/// Logger configuration. Built once (defaults, then file, then CLI flags)
/// and passed by reference to whatever needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Connection settings
    pub serial_port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    pub slave_id: u8,
    pub timeout_ms: u64,

    // Retry settings
    pub max_attempts: u32,
    pub retry_delay_ms: u64,

    pub dictionary_file: String,
    pub registers: RegisterSelection,

    // Sampling cadence
    pub sample_interval_ms: u64,
    pub loop_count: LoopCount,

    pub output: OutputConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

/// Registers logged by `read-bulk`: a range plus misc single registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterSelection {
    pub start_address: u16,
    pub count: u16,
    pub misc: Vec<u16>,
}

impl Default for RegisterSelection {
    fn default() -> Self {
        Self {
            start_address: 258,
            count: 12,
            misc: vec![277, 334],
        }
    }
}

/// How many sampling ticks to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopCount {
    Times(u64),
    /// Until cancelled.
    Forever,
}

impl LoopCount {
    pub fn allows(&self, completed: u64) -> bool {
        match self {
            LoopCount::Times(limit) => completed < *limit,
            LoopCount::Forever => true,
        }
    }
}

impl fmt::Display for LoopCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopCount::Times(n) => write!(f, "{} time(s)", n),
            LoopCount::Forever => write!(f, "forever"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "jsonl",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" | "jsonl" => Ok(OutputFormat::Json),
            other => Err(ModbusError::ConfigError(format!("unknown output format '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub directory: String,
    pub file_prefix: String,
    pub console: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Csv,
            directory: ".".to_string(),
            file_prefix: "phaserunner".to_string(),
            console: true,
        }
    }
}

/// What the serial transport needs to open a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            parity: ParityConfig::None,
            slave_id: 1,
            timeout_ms: 1000,
            max_attempts: 3,
            retry_delay_ms: 50,
            dictionary_file: "BODm.json".to_string(),
            registers: RegisterSelection::default(),
            sample_interval_ms: 200,
            loop_count: LoopCount::Times(10),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ModbusError::ConfigError(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        info!("⚙️  Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ModbusError> {
        // Create directory if it doesn't exist
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ModbusError::SerializationError(format!("TOML error: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overrides settings with whichever global CLI flags were given.
    pub fn apply_matches(&mut self, matches: &ArgMatches) -> Result<(), ModbusError> {
        if let Some(port) = matches.get_one::<String>("tty") {
            self.serial_port = port.clone();
        }
        if let Some(baud) = matches.get_one::<u32>("baudrate") {
            self.baud_rate = *baud;
        }
        if let Some(slave_id) = matches.get_one::<u8>("slave-id") {
            self.slave_id = *slave_id;
        }
        if let Some(file) = matches.get_one::<String>("dictionary-file") {
            self.dictionary_file = file.clone();
        }
        if let Some(times) = matches.get_one::<u64>("loop") {
            self.loop_count = LoopCount::Times(*times);
        }
        if matches.get_flag("forever") {
            self.loop_count = LoopCount::Forever;
        }
        if let Some(interval) = matches.get_one::<u64>("interval") {
            self.sample_interval_ms = *interval;
        }
        if let Some(format) = matches.get_one::<String>("format") {
            self.output.format = format.parse()?;
        }
        if let Some(directory) = matches.get_one::<String>("output-dir") {
            self.output.directory = directory.clone();
        }
        if matches.get_flag("quiet") {
            self.output.console = false;
        }
        debug!("⚙️  Effective configuration: {:?}", self);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        if self.serial_port.trim().is_empty() {
            return Err(ModbusError::ConfigError("serial_port must not be empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(ModbusError::ConfigError("baud_rate must be positive".to_string()));
        }
        if !(MIN_SLAVE_ID..=MAX_SLAVE_ID).contains(&self.slave_id) {
            return Err(ModbusError::ConfigError(format!(
                "slave_id {} outside {}-{}",
                self.slave_id, MIN_SLAVE_ID, MAX_SLAVE_ID
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ModbusError::ConfigError("timeout_ms must be positive".to_string()));
        }
        if self.sample_interval_ms == 0 {
            return Err(ModbusError::ConfigError("sample_interval_ms must be positive".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(ModbusError::ConfigError("max_attempts must be at least 1".to_string()));
        }
        self.sample_plan()
            .map_err(|e| ModbusError::ConfigError(format!("registers: {}", e)))?;
        Ok(())
    }

    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            port: self.serial_port.clone(),
            baud_rate: self.baud_rate,
            parity: self.parity,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            response_timeout: Duration::from_millis(self.timeout_ms),
            retry: self.retry_policy(),
        }
    }

    pub fn sample_plan(&self) -> Result<SamplePlan, ModbusError> {
        SamplePlan::new(
            self.registers.start_address,
            self.registers.count,
            self.registers.misc.clone(),
        )
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}
