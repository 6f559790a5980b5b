use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{SessionConfig, TargetDevice};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "never"
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            console_logging_enabled: default_true(),
            file_logging_enabled: default_false(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            rotation: default_rotation(),
            ansi_colors: default_true(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "gesture_control".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Target device
    #[serde(default = "default_device_name")]
    pub ble_device_name: String,
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: String,
    #[serde(default = "default_value_char_uuid")]
    pub ble_value_char_uuid: String,

    // Session timeouts; scan_timeout_secs = 0 keeps the scan alive until
    // explicitly stopped
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default)]
    pub last_connected_address: Option<String>,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ble_device_name: default_device_name(),
            ble_service_uuid: default_service_uuid(),
            ble_value_char_uuid: default_value_char_uuid(),
            scan_timeout_secs: default_scan_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            last_connected_address: None,
            log_settings: LogSettings::default(),
        }
    }
}

fn default_device_name() -> String {
    "GestureControlForRunners".to_string()
}
fn default_service_uuid() -> String {
    "66df5109-edde-4f8a-a5e1-02e02a69cbd5".to_string()
}
fn default_value_char_uuid() -> String {
    "741c12b9-e13c-4992-8a5e-fce46dec0bff".to_string()
}
fn default_scan_timeout_secs() -> u64 {
    60
}
fn default_connect_timeout_secs() -> u64 {
    15
}

impl Settings {
    /// Build the target descriptor from the configured strings.
    pub fn target_device(&self) -> anyhow::Result<TargetDevice> {
        Ok(TargetDevice {
            name: self.ble_device_name.clone(),
            service_uuid: Uuid::parse_str(&self.ble_service_uuid)?,
            characteristic_uuid: Uuid::parse_str(&self.ble_value_char_uuid)?,
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            scan_timeout: match self.scan_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            connect_timeout: Duration::from_secs(self.connect_timeout_secs.max(1)),
        }
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::config_file_path()?;
        Ok(Self::from_path(settings_path))
    }

    /// Load from an explicit path, falling back to defaults if the file is
    /// missing or unreadable.
    pub fn from_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn config_file_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("GestureControl");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Remember the peripheral we last subscribed to, for direct reconnect.
    pub fn record_connected_address(&mut self, address: &str) -> anyhow::Result<()> {
        if self.settings.last_connected_address.as_deref() != Some(address) {
            self.settings.last_connected_address = Some(address.to_string());
            self.save()?;
        }
        Ok(())
    }
}
