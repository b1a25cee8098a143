//! Process-wide configuration, assembled once during invocation setup and
//! threaded through explicitly rather than read from globals.
//!
//! Nothing in this crate reads an environment variable or a platform cache
//! directory convention directly outside this module; every other module
//! takes what it needs as arguments or as fields of [`Config`].

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::{MimosaError, Result};

/// Application name used to resolve the platform cache directory via
/// [`directories::ProjectDirs`].
const APP_NAME: &str = "mimosa";

/// Name of the environment variable carrying the in-memory overlay grammar.
pub const OVERLAY_ENV_VAR: &str = "MIMOSA_CACHE";

/// Name of the environment variable controlling log verbosity.
pub const LOG_LEVEL_ENV_VAR: &str = "LOG_LEVEL";

/// Assembled once per invocation and threaded through explicitly; nothing
/// downstream should reach back into the environment.
#[derive(Clone, Debug)]
pub struct Config {
    /// Root directory for on-disk cache entries.
    pub cache_dir: PathBuf,
    /// When set, the orchestrator logs what it *would* do on a hit/miss
    /// without republishing, saving, or building.
    pub dry_run: bool,
    /// Raw `MIMOSA_CACHE` value, if present, for the cache store's overlay.
    pub overlay_env: Option<String>,
    /// Requested worker count for file hashing and context expansion,
    /// already clamped via [`crate::hash::clamp_worker_count`].
    pub workers: usize,
}

impl Config {
    /// Build configuration from the process environment plus CLI-derived
    /// inputs. `dry_run` and an explicit `cache_dir_override` come from
    /// parsed CLI flags; everything else is read from the environment
    /// exactly once, here.
    pub fn from_env(dry_run: bool, cache_dir_override: Option<PathBuf>) -> Result<Self> {
        let cache_dir = match cache_dir_override {
            Some(dir) => dir,
            None => default_cache_dir()?,
        };
        let overlay_env = std::env::var(OVERLAY_ENV_VAR).ok();
        let workers = crate::hash::clamp_worker_count(num_cpus::get());

        Ok(Self {
            cache_dir,
            dry_run,
            overlay_env,
            workers,
        })
    }
}

fn default_cache_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", APP_NAME)
        .ok_or_else(|| MimosaError::invalid("could not determine a user cache directory for this platform"))?;
    Ok(dirs.cache_dir().to_path_buf())
}
