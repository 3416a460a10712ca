//! Card configuration, cached with a time-to-live.
//!
//! Readers take the fast path while the cached document is fresh. A stale or
//! empty cache is refilled under a single guard, re-checked after the guard is
//! taken, so concurrent loaders trigger one read.

use std::{
    io::ErrorKind,
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    sync::{
        Mutex,
        RwLock,
    },
    time::Instant,
};
use tracing::{
    debug,
    info,
};

use crate::core::{
    AnkiConfig,
    ConfigError,
};

pub mod settings;

pub use settings::{
    MigrationSettings,
    Settings,
};

/// Where the configuration document comes from.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn read(&self) -> Result<AnkiConfig, ConfigError>;
}

pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn read(&self) -> Result<AnkiConfig, ConfigError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::NotFound { path: self.path.clone() },
            _ => ConfigError::from(e),
        })?;
        let config: AnkiConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}

struct Cached {
    config: Arc<AnkiConfig>,
    loaded_at: Instant,
}

pub struct ConfigStore<S = FileConfigSource> {
    source: S,
    ttl: Duration,
    cache: RwLock<Option<Cached>>,
    refresh: Mutex<()>,
}

impl ConfigStore<FileConfigSource> {
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(FileConfigSource::new(&settings.config_path), settings.config_ttl)
    }
}

impl<S: ConfigSource> ConfigStore<S> {
    /// A zero `ttl` reads the source on every load.
    pub fn new(source: S, ttl: Duration) -> Self {
        Self { source, ttl, cache: RwLock::new(None), refresh: Mutex::new(()) }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    async fn fresh(&self) -> Option<Arc<AnkiConfig>> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|c| !self.ttl.is_zero() && c.loaded_at.elapsed() <= self.ttl)
            .map(|c| c.config.clone())
    }

    pub async fn load(&self) -> Result<Arc<AnkiConfig>, ConfigError> {
        if let Some(config) = self.fresh().await {
            return Ok(config);
        }

        let _guard = self.refresh.lock().await;
        if let Some(config) = self.fresh().await {
            return Ok(config);
        }

        debug!("reading card configuration");
        let config = Arc::new(self.source.read().await?);
        *self.cache.write().await =
            Some(Cached { config: config.clone(), loaded_at: Instant::now() });
        info!(
            fields = config.fields.len(),
            tags = config.tags.len(),
            sources = config.sources.len(),
            "card configuration loaded"
        );
        Ok(config)
    }

    /// Drops the cached document and loads it again.
    pub async fn reload(&self) -> Result<Arc<AnkiConfig>, ConfigError> {
        {
            let _guard = self.refresh.lock().await;
            *self.cache.write().await = None;
        }
        self.load().await
    }
}
