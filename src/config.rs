//! # Controller Configuration
//!
//! Every section and field has a default, so an empty file yields a machine
//! that behaves like the stock firmware build.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [machine]
//! steps_per_mm = 80.0
//! rapid_feed_rate = 1500
//! cut_feed_rate = 300
//! invert_direction = [false, true, false]
//!
//! [queue]
//! capacity = 64
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud = 115200
//! ```

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the machine, command queue, flow control, ramp and serial link.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub machine: MachineConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub flow_control: FlowControlConfig,
    #[serde(default)]
    pub ramp: RampConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Mechanical configuration shared by all three axes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MachineConfig {
    #[serde(default = "default_steps_per_mm")]
    pub steps_per_mm: f64,
    #[serde(default = "default_rapid_feed_rate")]
    pub rapid_feed_rate: u32,
    #[serde(default = "default_cut_feed_rate")]
    pub cut_feed_rate: u32,
    /// Per-axis direction polarity, X, Y, Z.
    #[serde(default)]
    pub invert_direction: [bool; 3],
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            steps_per_mm: default_steps_per_mm(),
            rapid_feed_rate: default_rapid_feed_rate(),
            cut_feed_rate: default_cut_feed_rate(),
            invert_direction: [false; 3],
        }
    }
}

impl MachineConfig {
    /// Microseconds per dominant-axis step at a feed rate of 1 mm/min.
    pub fn feed_constant(&self) -> u64 {
        (60_000_000.0 / self.steps_per_mm).round() as u64
    }

    /// Step interval in microseconds for `feed_rate` mm/min, floored to a feed of 1.
    pub fn interval_for(&self, feed_rate: u32) -> u64 {
        self.feed_constant() / u64::from(feed_rate.max(1))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: default_queue_capacity() }
    }
}

/// XON/XOFF thresholds. Inbound thresholds are in bytes, queue thresholds in percent of capacity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlowControlConfig {
    #[serde(default = "default_rx_buffer_size")]
    pub rx_buffer_size: usize,
    #[serde(default = "default_xoff_rx_threshold")]
    pub xoff_rx_threshold: usize,
    #[serde(default = "default_xon_rx_threshold")]
    pub xon_rx_threshold: usize,
    #[serde(default = "default_xoff_queue_percent")]
    pub xoff_queue_percent: usize,
    #[serde(default = "default_xon_queue_percent")]
    pub xon_queue_percent: usize,
}

impl Default for FlowControlConfig {
    fn default() -> Self {
        Self {
            rx_buffer_size: default_rx_buffer_size(),
            xoff_rx_threshold: default_xoff_rx_threshold(),
            xon_rx_threshold: default_xon_rx_threshold(),
            xoff_queue_percent: default_xoff_queue_percent(),
            xon_queue_percent: default_xon_queue_percent(),
        }
    }
}

/// Trapezoidal ramp shape applied to the first and last steps of every move.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RampConfig {
    #[serde(default = "default_ramp_window")]
    pub window_steps: u64,
    #[serde(default = "default_ramp_scale")]
    pub scale_us: u64,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            window_steps: default_ramp_window(),
            scale_us: default_ramp_scale(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud: default_baud(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Echo every recognized field assignment on the outbound stream.
    #[serde(default)]
    pub echo: bool,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if !(self.machine.steps_per_mm > 0.0) || !self.machine.steps_per_mm.is_finite() {
            return invalid("machine.steps_per_mm must be a positive number");
        }
        if self.queue.capacity < 2 {
            return invalid("queue.capacity must be at least 2");
        }
        let flow = &self.flow_control;
        if flow.xon_rx_threshold >= flow.xoff_rx_threshold {
            return invalid("flow_control.xon_rx_threshold must be below xoff_rx_threshold");
        }
        if flow.rx_buffer_size <= flow.xoff_rx_threshold {
            return invalid("flow_control.rx_buffer_size must exceed xoff_rx_threshold");
        }
        if flow.xoff_queue_percent > 100 || flow.xon_queue_percent > 100 {
            return invalid("flow_control queue percentages must not exceed 100");
        }
        if flow.xon_queue_percent >= flow.xoff_queue_percent {
            return invalid("flow_control.xon_queue_percent must be below xoff_queue_percent");
        }
        Ok(())
    }
}

// Default value functions
fn default_steps_per_mm() -> f64 { 80.0 }
fn default_rapid_feed_rate() -> u32 { 1500 }
fn default_cut_feed_rate() -> u32 { 300 }
fn default_queue_capacity() -> usize { 64 }
fn default_rx_buffer_size() -> usize { 64 }
fn default_xoff_rx_threshold() -> usize { 48 }
fn default_xon_rx_threshold() -> usize { 32 }
fn default_xoff_queue_percent() -> usize { 75 }
fn default_xon_queue_percent() -> usize { 50 }
fn default_ramp_window() -> u64 { 6 }
fn default_ramp_scale() -> u64 { 400 }
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud() -> u32 { 115200 }

/// Load and validate configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let config: Config = match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                return Err(ConfigError::Toml(e));
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            return Err(ConfigError::Io(e));
        }
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.machine.steps_per_mm, 80.0);
        assert_eq!(config.machine.rapid_feed_rate, 1500);
        assert_eq!(config.machine.cut_feed_rate, 300);
        assert_eq!(config.queue.capacity, 64);
        assert_eq!(config.flow_control.xoff_rx_threshold, 48);
        assert_eq!(config.flow_control.xon_rx_threshold, 32);
        assert_eq!(config.ramp.window_steps, 6);
        assert_eq!(config.ramp.scale_us, 400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_feed_constant() {
        let machine = MachineConfig::default();
        assert_eq!(machine.feed_constant(), 750_000);
        assert_eq!(machine.interval_for(300), 2500);
        // Feed rates below 1 are floored.
        assert_eq!(machine.interval_for(0), 750_000);
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("engraver.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "[machine]\nsteps_per_mm = 100.0\ninvert_direction = [true, false, false]").unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.machine.steps_per_mm, 100.0);
        assert_eq!(config.machine.invert_direction, [true, false, false]);
        // Defaults for missing fields
        assert_eq!(config.machine.cut_feed_rate, 300);
        assert_eq!(config.serial.baud, 115200);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.flow_control.xon_rx_threshold = 50;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.machine.steps_per_mm = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.queue.capacity = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
