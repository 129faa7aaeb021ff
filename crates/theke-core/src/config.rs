//! Application settings.
//!
//! Settings come from an optional JSON file; every field has a default, so a
//! missing file is not an error. A file that exists but does not parse is.
//! Selected paths can be overridden from the environment.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::{ThekeError, ThekeResult};

pub const ENV_DATA_DIR: &str = "THEKE_DATA_DIR";
pub const ENV_INDEX_PATH: &str = "THEKE_INDEX_PATH";
pub const ENV_ASSETS_DIR: &str = "THEKE_ASSETS_DIR";
pub const ENV_RENDER_CACHE: &str = "THEKE_RENDER_CACHE";

const DEFAULT_DATA_DIR: &str = "~/.local/share/theke";
const INDEX_FILE_NAME: &str = "theke_index.db";
const EXTERNAL_DIR_NAME: &str = "external";

/// Expand a leading `~` against `HOME`.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if path.len() > 2 {
                expanded.push(&path[2..]);
            }
            return expanded;
        }
    }
    PathBuf::from(path)
}

/// Whether rendered chapters are memoised. On unless `THEKE_RENDER_CACHE`
/// says otherwise.
pub fn render_cache_enabled() -> bool {
    match std::env::var(ENV_RENDER_CACHE) {
        Ok(val) => {
            let v = val.trim().to_lowercase();
            !matches!(v.as_str(), "0" | "false" | "no" | "off")
        }
        Err(_) => true,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BiblicalSources {
    pub ot: Vec<String>,
    pub nt: Vec<String>,
}

impl Default for BiblicalSources {
    fn default() -> Self {
        Self {
            ot: vec!["OSHB".into(), "FreCrampon".into()],
            nt: vec!["MorphGNT".into(), "FreCrampon".into()],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RenderCacheSettings {
    pub max_entries: usize,
    pub ttl_seconds: u64,
}

impl Default for RenderCacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 64,
            ttl_seconds: 600,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub index_path: PathBuf,
    pub assets_dir: PathBuf,
    pub external_sources_dir: PathBuf,
    pub default_source: String,
    pub default_biblical_sources: BiblicalSources,
    pub default_book_section: String,
    pub welcome_uri: String,
    pub render_cache: RenderCacheSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = expand_tilde(DEFAULT_DATA_DIR);
        Self {
            index_path: data_dir.join(INDEX_FILE_NAME),
            assets_dir: PathBuf::from("assets"),
            external_sources_dir: data_dir.join(EXTERNAL_DIR_NAME),
            default_source: "MorphGNT".into(),
            default_biblical_sources: BiblicalSources::default(),
            default_book_section: "Couverture".into(),
            welcome_uri: "internal:/app/welcome".into(),
            render_cache: RenderCacheSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (if it exists) and apply environment
    /// overrides.
    pub fn load(path: &Path) -> ThekeResult<Self> {
        let mut settings = Self::from_file(path)?;
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> ThekeResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let mut settings: Settings = serde_json::from_str(&raw).map_err(|e| {
            ThekeError::Config(format!("invalid settings file {}: {e}", path.display()))
        })?;
        settings.expand_paths();
        info!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Apply `THEKE_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(data_dir) = non_empty(ENV_DATA_DIR) {
            let data_dir = expand_tilde(data_dir.trim());
            self.index_path = data_dir.join(INDEX_FILE_NAME);
            self.external_sources_dir = data_dir.join(EXTERNAL_DIR_NAME);
        }
        if let Some(index_path) = non_empty(ENV_INDEX_PATH) {
            self.index_path = expand_tilde(index_path.trim());
        }
        if let Some(assets_dir) = non_empty(ENV_ASSETS_DIR) {
            self.assets_dir = expand_tilde(assets_dir.trim());
        }
    }

    fn expand_paths(&mut self) {
        for path in [
            &mut self.index_path,
            &mut self.assets_dir,
            &mut self.external_sources_dir,
        ] {
            if let Some(raw) = path.to_str() {
                *path = expand_tilde(raw);
            }
        }
    }
}
