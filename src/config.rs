use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_API_BASE_URL: &str = "http://ka.kydb.vip/api";
const API_BASE_URL_ENV: &str = "SMSBOX_API_BASE_URL";
const ENABLE_API_LOGS_ENV: &str = "SMSBOX_ENABLE_API_LOGS";

fn default_download_stall_timeout_secs() -> u64 {
    60
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub api_base_url: String,
    #[serde(default)]
    pub update_dir: Option<PathBuf>,
    pub initial_check_delay_secs: u64,
    pub check_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Longest gap between installer chunks before the download is abandoned.
    #[serde(default = "default_download_stall_timeout_secs")]
    pub download_stall_timeout_secs: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    #[serde(default)]
    pub heartbeat_timeout_secs: Option<u64>,
    pub install_exit_delay_ms: u64,
    #[serde(default)]
    pub enable_api_logs: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            update_dir: None,
            initial_check_delay_secs: 5,
            check_interval_secs: 60 * 60,
            request_timeout_secs: 30,
            download_stall_timeout_secs: default_download_stall_timeout_secs(),
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 3000,
            heartbeat_timeout_secs: Some(90),
            install_exit_delay_ms: 1500,
            enable_api_logs: false,
        }
    }
}

impl Settings {
    /// Scratch directory installers are downloaded into.
    pub fn update_dir(&self) -> PathBuf {
        self.update_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("app-updates"))
    }

    pub fn initial_check_delay(&self) -> Duration {
        Duration::from_secs(self.initial_check_delay_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn download_stall_timeout(&self) -> Duration {
        Duration::from_secs(self.download_stall_timeout_secs.max(1))
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn heartbeat_timeout(&self) -> Option<Duration> {
        self.heartbeat_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn install_exit_delay(&self) -> Duration {
        Duration::from_millis(self.install_exit_delay_ms)
    }

    /// Joins a backend path onto the API base URL. Absolute URLs pass through.
    pub fn api_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.api_base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var(API_BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
        if let Ok(flag) = std::env::var(ENABLE_API_LOGS_ENV) {
            self.enable_api_logs = flag.trim().eq_ignore_ascii_case("true");
        }
        self
    }
}

pub fn app_data_root() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .ok_or_else(|| Error::Settings("Unable to resolve app data dir".to_string()))?;
    let root = base.join("smsbox");
    fs::create_dir_all(&root).map_err(|e| Error::fs(&root, e))?;
    Ok(root)
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(app_data_root()?.join("settings.json"))
}

/// Reads settings from `path`, writing defaults when the file is missing or blank.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        let defaults = Settings::default();
        save_settings_to(path, &defaults)?;
        return Ok(defaults.apply_env());
    }
    let raw = fs::read_to_string(path).map_err(|e| Error::fs(path, e))?;
    if raw.trim().is_empty() {
        let defaults = Settings::default();
        save_settings_to(path, &defaults)?;
        return Ok(defaults.apply_env());
    }
    let settings: Settings = serde_json::from_str(&raw)
        .map_err(|e| Error::Settings(format!("Invalid settings JSON in {}: {e}", path.display())))?;
    Ok(settings.apply_env())
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::fs(parent, e))?;
    }
    let payload =
        serde_json::to_string_pretty(settings).map_err(|e| Error::Settings(e.to_string()))?;
    fs::write(path, payload).map_err(|e| Error::fs(path, e))
}

/// Loads the user's settings, falling back to defaults if they cannot be read.
pub fn load_settings() -> Settings {
    let loaded = settings_path().and_then(|path| load_settings_from(&path));
    match loaded {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("Using default settings: {e}");
            Settings::default().apply_env()
        }
    }
}
