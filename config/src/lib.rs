//! Configuration for proposald.
//!
//! Read from `~/.proposald/config.toml` (or `$PROPOSALD_CONFIG`). Every key is
//! optional; the raw TOML structs stay private and are resolved into
//! [`ProposaldConfig`] at the parse boundary. `${VAR}` references inside
//! string values are expanded from the environment.
//!
//! ```toml
//! [store]
//! backend = "sqlite"   # or "memory"
//! path = "${HOME}/.proposald/proposals.db"
//!
//! [content]
//! allowed_mime = ["text/plain; charset=utf-8", "image/png"]
//! max_files = 16
//! max_file_size = 524288
//! ```

use std::env;
use std::path::{Path, PathBuf};

use proposald_types::{ContentPolicy, ContentPolicyError};
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV_VAR: &str = "PROPOSALD_CONFIG";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    store: Option<RawStoreConfig>,
    content: Option<RawContentConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStoreConfig {
    backend: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawContentConfig {
    allowed_mime: Option<Vec<String>>,
    max_files: Option<usize>,
    max_file_size: Option<usize>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown store backend {0:?} (expected \"sqlite\" or \"memory\")")]
    UnknownBackend(String),
    #[error("store path must not be empty")]
    EmptyStorePath,
    #[error("invalid [content] section: {0}")]
    Content(#[from] ContentPolicyError),
}

/// Where proposals are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Sqlite { path: PathBuf },
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: default_db_path(),
        }
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposaldConfig {
    pub store: StoreConfig,
    pub content: ContentPolicy,
}

impl ProposaldConfig {
    /// Load from the default location, falling back to defaults.
    ///
    /// A missing file is not an error. An unreadable or invalid file is
    /// logged and ignored.
    #[must_use]
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "Loaded config");
                config
            }
            Err(err) => {
                tracing::warn!("Ignoring config at {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        Self::resolve(raw)
    }

    fn resolve(raw: RawConfig) -> Result<Self, ConfigError> {
        let store = raw.store.unwrap_or_default();
        let store = match store.backend.as_deref().map(str::trim) {
            None | Some("sqlite") => {
                let path = match store.path {
                    Some(path) => {
                        let expanded = expand_env_vars(&path);
                        if expanded.trim().is_empty() {
                            return Err(ConfigError::EmptyStorePath);
                        }
                        PathBuf::from(expanded)
                    }
                    None => default_db_path(),
                };
                StoreConfig::Sqlite { path }
            }
            Some("memory") => StoreConfig::Memory,
            Some(other) => return Err(ConfigError::UnknownBackend(other.to_string())),
        };

        let content = match raw.content {
            None => ContentPolicy::default(),
            Some(section) => {
                let defaults = ContentPolicy::default();
                ContentPolicy::new(
                    section
                        .allowed_mime
                        .unwrap_or_else(|| defaults.allowed_mime().to_vec()),
                    section.max_files.unwrap_or(defaults.max_files()),
                    section.max_file_size.unwrap_or(defaults.max_file_size()),
                )?
            }
        };

        Ok(Self { store, content })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

/// Replace `${VAR}` with the value of `VAR` (empty when unset).
///
/// An unterminated `${` is kept literally.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if !name.is_empty() {
                    out.push_str(&env::var(name).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV_VAR).filter(|path| !path.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".proposald").join("config.toml"))
}

fn default_db_path() -> PathBuf {
    dirs::home_dir().map_or_else(
        || PathBuf::from("proposals.db"),
        |home| home.join(".proposald").join("proposals.db"),
    )
}
