//! Application configuration loaded from an optional TOML file
//!
//! Every field has a default, so a missing file or a file with only a few
//! keys is valid.

use crate::error::{AutomationError, AutomationResult};
use crate::template_matching::MatchConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the adb binary location.
pub const ADB_PATH_ENV: &str = "ADB_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub adb: AdbConfig,
    pub matching: MatchConfig,
    pub wait: WaitConfig,
    pub actions: ActionConfig,
    pub joystick: JoystickConfig,
    pub notify: NotifyConfig,
    /// Directory scanned for routine definitions
    pub routines_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            adb: AdbConfig::default(),
            matching: MatchConfig::default(),
            wait: WaitConfig::default(),
            actions: ActionConfig::default(),
            joystick: JoystickConfig::default(),
            notify: NotifyConfig::default(),
            routines_dir: PathBuf::from("routines"),
        }
    }
}

impl AppConfig {
    /// Load from `path`. Parse errors are reported with the file name.
    pub fn load(path: impl AsRef<Path>) -> AutomationResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| AutomationError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> AutomationResult<Self> {
        match path {
            Some(p) => {
                let config = Self::load(p)?;
                log::info!("📄 Loaded configuration from {}", p.display());
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdbConfig {
    /// Explicit adb binary; see [`AdbConfig::resolve_program`]
    pub path: Option<String>,
    /// Ordinary commands (tap, getprop, devices)
    pub command_timeout_secs: u64,
    /// Server start, network connect, pull
    pub long_timeout_secs: u64,
    pub capture_timeout_secs: u64,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            path: None,
            command_timeout_secs: 10,
            long_timeout_secs: 30,
            capture_timeout_secs: 15,
        }
    }
}

impl AdbConfig {
    /// Configured path, then `ADB_PATH`, then a bundled `./adb/adb`, then
    /// whatever `adb` resolves to on `PATH`.
    pub fn resolve_program(&self) -> String {
        if let Some(path) = self.path.as_deref().filter(|p| !p.is_empty()) {
            return path.to_string();
        }
        if let Ok(path) = std::env::var(ADB_PATH_ENV)
            && !path.is_empty()
        {
            return path;
        }
        let bundled = Path::new("adb").join(if cfg!(windows) { "adb.exe" } else { "adb" });
        if bundled.is_file() {
            return bundled.to_string_lossy().into_owned();
        }
        "adb".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Delay between match attempts
    pub poll_interval_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1500,
        }
    }
}

impl WaitConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    /// Pause after a plain click so the UI can react
    pub settle_ms: u64,
    pub pre_delay_min_ms: u64,
    pub pre_delay_max_ms: u64,
    pub post_delay_ms: u64,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            settle_ms: 500,
            pre_delay_min_ms: 50,
            pre_delay_max_ms: 200,
            post_delay_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoystickConfig {
    /// Nominal on-screen joystick center
    pub center: (u32, u32),
    /// Swipe length before jitter
    pub radius: f64,
    /// Standard deviation of the start-point jitter in pixels
    pub jitter_sigma: f64,
    /// Start points never land further than this from `center`
    pub jitter_max: f64,
    /// Relative radius jitter; 0.05 gives 0.95x..1.05x
    pub radius_jitter: f64,
    pub duration_jitter_ms: i64,
    pub min_duration_ms: u32,
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            center: (450, 1440),
            radius: 150.0,
            jitter_sigma: 8.0,
            jitter_max: 20.0,
            radius_jitter: 0.05,
            duration_jitter_ms: 30,
            min_duration_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub enabled: bool,
    /// Invoked as `<command> <title> <message>`; titles start with `app_name`
    pub command: String,
    pub app_name: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: "notify-send".to_string(),
            app_name: "ADB Template Bot".to_string(),
        }
    }
}
