//! Backend selection.
//!
//! Evaluated once at startup. Precedence:
//!
//! 1. Remote store URL and token in the environment → [`RemoteStore`]
//!    (`UPSTASH_REDIS_REST_URL`/`UPSTASH_REDIS_REST_TOKEN`, or the
//!    `KV_REST_API_URL`/`KV_REST_API_TOKEN` aliases).
//! 2. An explicit checkpoint directory → [`LocalStore`].
//! 3. Otherwise → [`MemoryStore`].
//!
//! Setting only half of the remote pair is a configuration error rather than
//! a silent fallback.

use std::path::PathBuf;
use std::sync::Arc;

use super::{
    LocalStore, MemoryStore, RemoteConfig, RemoteStore, SharedCheckpointStore, StoreError,
    StoreLimits, StoreResult,
};

const URL_VARS: [&str; 2] = ["UPSTASH_REDIS_REST_URL", "KV_REST_API_URL"];
const TOKEN_VARS: [&str; 2] = ["UPSTASH_REDIS_REST_TOKEN", "KV_REST_API_TOKEN"];

/// Which checkpoint backend to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    Local { dir: PathBuf },
    Remote(RemoteConfig),
}

impl StoreConfig {
    /// Read the process environment.
    pub fn from_env(checkpoint_dir: Option<PathBuf>) -> StoreResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok(), checkpoint_dir)
    }

    /// Select from an arbitrary variable lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        checkpoint_dir: Option<PathBuf>,
    ) -> StoreResult<Self> {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
        };

        match (first(&URL_VARS[..]), first(&TOKEN_VARS[..])) {
            (Some(url), Some(token)) => Ok(Self::Remote(RemoteConfig { url, token })),
            (Some(_), None) => Err(StoreError::config(format!(
                "{} is set but no token ({}) was found",
                URL_VARS[0],
                TOKEN_VARS.join(" or ")
            ))),
            (None, Some(_)) => Err(StoreError::config(format!(
                "{} is set but no URL ({}) was found",
                TOKEN_VARS[0],
                URL_VARS.join(" or ")
            ))),
            (None, None) => Ok(match checkpoint_dir {
                Some(dir) => Self::Local { dir },
                None => Self::Memory,
            }),
        }
    }

    /// Construct the selected backend.
    pub async fn open(self, limits: StoreLimits) -> StoreResult<SharedCheckpointStore> {
        let store: SharedCheckpointStore = match self {
            Self::Memory => Arc::new(MemoryStore::with_limits(limits)),
            Self::Local { dir } => Arc::new(LocalStore::open_with_limits(dir, limits).await?),
            Self::Remote(config) => Arc::new(RemoteStore::with_limits(config, limits)?),
        };
        tracing::info!(backend = store.backend_name(), "checkpoint store ready");
        Ok(store)
    }
}
