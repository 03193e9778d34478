//! Capture settings (optional JSON file named by `SAMPLE_GRABBER_CONFIG`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use grabber_core::{CaptureConfig, UsbConfig};
use serde::{Deserialize, Serialize};

/// Environment variable holding the settings file path.
pub const CONFIG_ENV: &str = "SAMPLE_GRABBER_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub capture: CaptureConfig,
    pub usb: UsbConfig,
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.capture.normalize();
        self.usb.normalize();
    }
}

/// Settings file path from the environment, if set and non-empty.
pub fn settings_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Load settings from `path`, or defaults when `path` is `None`.
///
/// A named file that cannot be read or parsed is an error.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<AppSettings> {
    let mut settings = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("can't read settings file {}", path.display()))?;
            serde_json::from_str::<AppSettings>(&raw)
                .with_context(|| format!("invalid settings file {}", path.display()))?
        }
        None => AppSettings::default(),
    };
    settings.normalize();
    Ok(settings)
}
