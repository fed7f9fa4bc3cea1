//! Configuration file format.
//!
//! Everything has a default, so an empty file (or no file) is valid.
//! The `[mock]` section only matters when running against the simulated
//! backend.

use crate::device::{DeviceInfo, ProductLine};
use crate::native::{MockBackend, MockDevice};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("poll interval must be at least 1 ms")]
    InvalidPollInterval,
    #[error("mock API version must be positive")]
    InvalidApiVersion,
    #[error("duplicate mock device serial: {0}")]
    DuplicateSerial(String),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub mock: MockConfig,
}

/// Device query options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContextConfig {
    /// List platform (non-RealSense) cameras too.
    #[serde(default)]
    pub include_platform_camera: bool,
}

/// Hot-plug watch options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// How long to watch; 0 runs until interrupted.
    pub duration_secs: u64,
    /// How often the watch loop wakes up to check for shutdown.
    pub poll_interval_ms: u64,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            duration_secs: 0,
            poll_interval_ms: 200,
            metrics_port: 0,
        }
    }
}

/// A device definition for the simulated backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockDeviceConfig {
    pub name: String,
    pub serial_number: String,
    #[serde(default)]
    pub firmware_version: Option<String>,
    pub product_line: ProductLine,
}

impl MockDeviceConfig {
    pub fn to_device(&self) -> MockDevice {
        let mut info = DeviceInfo::new(self.name.clone(), self.serial_number.clone());
        info.firmware_version = self.firmware_version.clone();
        MockDevice::new(info, self.product_line)
    }
}

/// One scripted hot-plug event, relative to the start of a watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ScriptStep {
    Connect { at_ms: u64, device: MockDeviceConfig },
    Disconnect { at_ms: u64, serial: String },
}

impl ScriptStep {
    pub fn at_ms(&self) -> u64 {
        match self {
            ScriptStep::Connect { at_ms, .. } | ScriptStep::Disconnect { at_ms, .. } => *at_ms,
        }
    }

    /// Applies the step to `backend`, firing the resulting notification.
    pub fn apply(&self, backend: &MockBackend) {
        match self {
            ScriptStep::Connect { device, .. } => {
                backend.connect(device.to_device());
            }
            ScriptStep::Disconnect { serial, .. } => {
                if !backend.disconnect(serial) {
                    tracing::warn!(serial = %serial, "Scripted disconnect of unknown device");
                }
            }
        }
    }
}

/// Simulated backend setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    pub api_version: i32,
    /// Devices present before the context is created.
    pub devices: Vec<MockDeviceConfig>,
    /// Hot-plug events played back by `watch`.
    pub script: Vec<ScriptStep>,
}

impl Default for MockConfig {
    fn default() -> Self {
        let d455 = MockDeviceConfig {
            name: "Intel RealSense D455".into(),
            serial_number: "213622070157".into(),
            firmware_version: Some("5.15.0.2".into()),
            product_line: ProductLine::D400,
        };
        Self {
            api_version: MockBackend::DEFAULT_API_VERSION,
            devices: vec![
                MockDeviceConfig {
                    name: "Intel RealSense D435".into(),
                    serial_number: "841612070098".into(),
                    firmware_version: Some("5.13.0.50".into()),
                    product_line: ProductLine::D400,
                },
                MockDeviceConfig {
                    name: "Integrated Webcam".into(),
                    serial_number: "uvc-0000".into(),
                    firmware_version: None,
                    product_line: ProductLine::Platform,
                },
            ],
            script: vec![
                ScriptStep::Connect {
                    at_ms: 1000,
                    device: d455,
                },
                ScriptStep::Disconnect {
                    at_ms: 3000,
                    serial: "213622070157".into(),
                },
            ],
        }
    }
}

impl MockConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version <= 0 {
            return Err(ConfigError::InvalidApiVersion);
        }
        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.serial_number.as_str()) {
                return Err(ConfigError::DuplicateSerial(device.serial_number.clone()));
            }
        }
        Ok(())
    }

    /// Builds a backend with the configured devices already present.
    pub fn build_backend(&self) -> MockBackend {
        let backend = MockBackend::with_api_version(self.api_version);
        for device in &self.devices {
            backend.add_device(device.to_device());
        }
        backend
    }

    /// Script steps ordered by time.
    pub fn sorted_script(&self) -> Vec<ScriptStep> {
        let mut steps = self.script.clone();
        steps.sort_by_key(ScriptStep::at_ms);
        steps
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }
        self.mock.validate()
    }
}
