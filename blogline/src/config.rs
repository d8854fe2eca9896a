//! Settings stored in `.blogline/config.toml`.
//!
//! ```toml
//! [backend]
//! url = "${BLOGLINE_URL}"
//! anon_key = "${BLOGLINE_ANON_KEY}"
//!
//! [storage]
//! image_bucket = "post-images"
//! max_upload_bytes = 5242880
//!
//! [feed]
//! excerpt_length = 100
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{backend::HostedConfig, errors::ValidationError};

/// Environment variable that overrides `backend.url`.
pub const URL_ENV: &str = "BLOGLINE_URL";
/// Environment variable that overrides `backend.anon_key`.
pub const ANON_KEY_ENV: &str = "BLOGLINE_ANON_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("environment variable {name} is not set")]
    MissingVar { name: String },
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlogConfig {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub feed: FeedSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_anon_key")]
    pub anon_key: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            anon_key: default_anon_key(),
        }
    }
}

fn default_url() -> String {
    format!("${{{URL_ENV}}}")
}

fn default_anon_key() -> String {
    format!("${{{ANON_KEY_ENV}}}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_image_bucket")]
    pub image_bucket: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            image_bucket: default_image_bucket(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_image_bucket() -> String {
    "post-images".to_string()
}

fn default_max_upload_bytes() -> u64 {
    5 * 1024 * 1024
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSettings {
    #[serde(default = "default_excerpt_length")]
    pub excerpt_length: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            excerpt_length: default_excerpt_length(),
        }
    }
}

fn default_excerpt_length() -> usize {
    100
}

impl BlogConfig {
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Resolves the backend connection from the process environment.
    pub fn hosted_config(&self) -> Result<HostedConfig, ConfigError> {
        self.hosted_config_with(|name| std::env::var(name).ok())
    }

    /// Resolves the backend connection using `lookup` for environment values.
    ///
    /// `BLOGLINE_URL` and `BLOGLINE_ANON_KEY` take precedence over the file;
    /// `${VAR}` values in the file are expanded.
    pub fn hosted_config_with<F>(&self, lookup: F) -> Result<HostedConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = match lookup(URL_ENV) {
            Some(url) => url,
            None => expand(&self.backend.url, &lookup)?,
        };
        let anon_key = match lookup(ANON_KEY_ENV) {
            Some(key) => key,
            None => expand(&self.backend.anon_key, &lookup)?,
        };
        Ok(HostedConfig::new(&url, anon_key)?)
    }
}

fn expand<F>(value: &str, lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match value.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        Some(name) => lookup(name).ok_or_else(|| ConfigError::MissingVar { name: name.to_string() }),
        None => Ok(value.to_string()),
    }
}
