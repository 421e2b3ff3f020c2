use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;

use crate::item_controller::DEFAULT_DELETE_DELAY;

pub const SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    /// Grace period between checking an item and its delete request.
    pub delete_delay_ms: u64,
    /// Whether the list is handed the reseed capability.
    pub reset_enabled: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000".into(),
            delete_delay_ms: DEFAULT_DELETE_DELAY.as_millis() as u64,
            reset_enabled: true,
        }
    }
}

impl ClientSettings {
    pub fn delete_delay(&self) -> Duration {
        Duration::from_millis(self.delete_delay_ms)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    delete_delay_ms: Option<u64>,
    reset_enabled: Option<bool>,
}

/// Defaults, then `client.toml` in the working directory, then environment.
pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    var: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.server_url {
                    settings.server_url = v;
                }
                if let Some(v) = file_cfg.delete_delay_ms {
                    settings.delete_delay_ms = v;
                }
                if let Some(v) = file_cfg.reset_enabled {
                    settings.reset_enabled = v;
                }
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "ignoring unreadable client settings")
            }
        }
    }

    for key in ["SERVER_URL", "APP__SERVER_URL"] {
        if let Some(v) = var(key) {
            settings.server_url = v;
        }
    }
    if let Some(v) = var("APP__DELETE_DELAY_MS") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.delete_delay_ms = parsed,
            Err(_) => warn!(value = %v, "APP__DELETE_DELAY_MS must be a whole number of milliseconds"),
        }
    }
    if let Some(v) = var("APP__RESET_ENABLED") {
        match v.parse::<bool>() {
            Ok(parsed) => settings.reset_enabled = parsed,
            Err(_) => warn!(value = %v, "APP__RESET_ENABLED must be true or false"),
        }
    }

    settings
}
