//! Configuration management for Folio
//!
//! Settings are read once from the environment and then resolved into an
//! immutable [`ResolvedConfig`] before any component starts. Resolution is
//! where the cache directory is validated and, if needed, replaced by a
//! freshly created temporary directory.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid render settings: {0}")]
    InvalidRender(String),

    #[error("Failed to create fallback cache directory: {0}")]
    Fallback(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub cache: CacheSettings,
    pub render: RenderSettings,
    pub maintenance: MaintenanceSettings,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Configured cache directory (None = use a temporary directory)
    pub path: Option<PathBuf>,
    /// Maximum number of rendered pages kept in the index
    pub max_entries: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    /// Upper bound for a single render
    pub timeout_secs: u64,
    /// Zoom percent added or removed by zoom-in / zoom-out
    pub zoom_step: u32,
    /// Lowest zoom level in percent
    pub zoom_min: u32,
    /// Highest zoom level in percent
    pub zoom_max: u32,
}

#[derive(Debug, Clone)]
pub struct MaintenanceSettings {
    /// Interval of the orphaned cache file sweep (0 disables it)
    pub sweep_interval_secs: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            timeout_secs: 30,
            zoom_step: 50,
            zoom_min: 50,
            zoom_max: 200,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cache: CacheSettings {
                path: Some(PathBuf::from("./folio-cache")),
                max_entries: 500,
            },
            render: RenderSettings::default(),
            maintenance: MaintenanceSettings {
                sweep_interval_secs: 3600,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            cache: CacheSettings {
                path: match env::var("FOLIO_CACHE_PATH") {
                    Ok(path) if path.trim().is_empty() => None,
                    Ok(path) => Some(PathBuf::from(path)),
                    Err(_) => defaults.cache.path,
                },
                max_entries: env_parse("FOLIO_CACHE_MAX_ENTRIES", defaults.cache.max_entries)?,
            },
            render: RenderSettings {
                timeout_secs: env_parse("FOLIO_RENDER_TIMEOUT_SECS", defaults.render.timeout_secs)?,
                zoom_step: env_parse("FOLIO_ZOOM_STEP", defaults.render.zoom_step)?,
                zoom_min: env_parse("FOLIO_ZOOM_MIN", defaults.render.zoom_min)?,
                zoom_max: env_parse("FOLIO_ZOOM_MAX", defaults.render.zoom_max)?,
            },
            maintenance: MaintenanceSettings {
                sweep_interval_secs: env_parse(
                    "FOLIO_SWEEP_INTERVAL_SECS",
                    defaults.maintenance.sweep_interval_secs,
                )?,
            },
        })
    }

    /// Validate and finalize the configuration
    ///
    /// An empty, missing or unwritable cache path does not fail startup: a
    /// temporary directory is created instead and the substitution is logged
    /// at `warn` so operators can see the misconfiguration.
    pub fn resolve(self) -> Result<ResolvedConfig, ConfigError> {
        self.render.validate()?;

        let (cache_path, cache_fallback) = match self.cache.path {
            Some(path) if is_writable_dir(&path) => (path, false),
            configured => {
                let fallback = tempfile::Builder::new()
                    .prefix("folio-cache-")
                    .tempdir()?
                    .keep();
                tracing::warn!(
                    configured = ?configured,
                    fallback = %fallback.display(),
                    "Cache path is missing or unwritable; using temporary directory"
                );
                (fallback, true)
            }
        };

        Ok(ResolvedConfig {
            cache_path,
            cache_fallback,
            cache_max_entries: self.cache.max_entries.max(1),
            render: self.render,
            sweep_interval: match self.maintenance.sweep_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        })
    }
}

impl RenderSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidRender("timeout must be positive".into()));
        }
        if self.zoom_step == 0 {
            return Err(ConfigError::InvalidRender("zoom step must be positive".into()));
        }
        if self.zoom_min == 0 || self.zoom_min > 100 || self.zoom_max < 100 {
            return Err(ConfigError::InvalidRender(format!(
                "zoom range {}..={} must contain 100",
                self.zoom_min, self.zoom_max
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Finalized, immutable configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub cache_path: PathBuf,
    /// True when `cache_path` is a substituted temporary directory
    pub cache_fallback: bool,
    pub cache_max_entries: usize,
    pub render: RenderSettings,
    pub sweep_interval: Option<Duration>,
}

impl ResolvedConfig {
    /// Configuration for an explicit, already validated cache directory
    pub fn with_cache_path(path: impl Into<PathBuf>) -> Self {
        ResolvedConfig {
            cache_path: path.into(),
            cache_fallback: false,
            cache_max_entries: 500,
            render: RenderSettings::default(),
            sweep_interval: None,
        }
    }
}

fn env_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(default),
    }
}

fn is_writable_dir(path: &Path) -> bool {
    if path.as_os_str().is_empty() || !path.is_dir() {
        return false;
    }
    tempfile::NamedTempFile::new_in(path).is_ok()
}
