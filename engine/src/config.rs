//! Configuration for stores.

use crate::Cascade;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// How much of a store's state is mirrored into the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Every record is kept locally, synced or not.
    #[default]
    All,
    /// Only records with outstanding work are kept locally; the local copy
    /// is dropped once the remote service confirms a save.
    Pending,
    /// Nothing is written to the local store.
    None,
}

impl FromStr for CacheMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(CacheMode::All),
            "pending" => Ok(CacheMode::Pending),
            "none" => Ok(CacheMode::None),
            _ => Err(ConfigError::InvalidCacheMode(s.to_string())),
        }
    }
}

/// Sync behaviour shared by every record of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Local store caching mode.
    pub cache: CacheMode,
    /// Cascade used by [`crate::Model::save`].
    pub save_cascade: Cascade,
    /// Cascade used by [`crate::Model::remove`].
    pub remove_cascade: Cascade,
}

impl SyncConfig {
    /// Creates a configuration that caches everything and cascades everywhere.
    pub fn new() -> Self {
        Self {
            cache: CacheMode::All,
            save_cascade: Cascade::ALL,
            remove_cascade: Cascade::ALL,
        }
    }

    /// Sets the cache mode.
    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the default save cascade.
    pub fn with_save_cascade(mut self, cascade: Cascade) -> Self {
        self.save_cascade = cascade;
        self
    }

    /// Sets the default remove cascade.
    pub fn with_remove_cascade(mut self, cascade: Cascade) -> Self {
        self.remove_cascade = cascade;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// `FERRY_CACHE` selects the cache mode (`all`, `pending`, `none`) and
    /// `FERRY_CASCADE` the default cascade for both saves and removes
    /// (`all`, `none`, or a list such as `local,rest`). Unset variables keep
    /// the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Some(cache) = lookup("FERRY_CACHE") {
            config.cache = cache.parse()?;
        }

        if let Some(cascade) = lookup("FERRY_CASCADE") {
            let cascade: Cascade = cascade.parse()?;
            config.save_cascade = cascade;
            config.remove_cascade = cascade;
        }

        Ok(config)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid cache mode: {0}")]
    InvalidCacheMode(String),

    #[error("invalid cascade: {0}")]
    InvalidCascade(String),
}
