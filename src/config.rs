use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::audio::SimulatorConfig;
use crate::helper::HelperConfig;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub helper: HelperConfig,
    pub library: LibraryConfig,
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "sound-helper".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3010,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Directory of `<id>.wav` sounds available to `play_by_id`
    pub sounds_dir: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            sounds_dir: "~/.sound-helper/sounds".to_string(),
        }
    }
}

impl LibraryConfig {
    pub fn sounds_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.sounds_dir).into_owned())
    }
}

impl Config {
    /// Load `path` (extension optional). A missing file yields the defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()
            .with_context(|| format!("Failed to read config: {}", path))?;

        Ok(settings.try_deserialize()?)
    }
}
