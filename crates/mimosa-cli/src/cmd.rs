//! Subcommand implementations. Each module owns one CLI verb and is
//! responsible for assembling the collaborators the core orchestrator
//! needs (config, cache store, registry client, build runner) from the
//! process environment.

pub mod cache;
pub mod forget;
pub mod remember;

use color_eyre::Result;
use color_eyre::eyre::Context as _;
use mimosa_core::cache::CacheStore;
use mimosa_core::config::Config;
use mimosa_core::orchestrator::SubprocessBuildRunner;
use mimosa_registry::RegistryClientImpl;

/// Assembled once per invocation: the collaborators every build-aware
/// subcommand (`remember`, `forget`) needs.
pub(crate) struct Collaborators {
    pub cwd: std::path::PathBuf,
    pub config: Config,
    pub store: CacheStore,
    pub registry: RegistryClientImpl,
    pub builder: SubprocessBuildRunner,
}

pub(crate) fn assemble(dry_run: bool) -> Result<Collaborators> {
    let cwd = std::env::current_dir().context("determine current directory")?;
    let config = Config::from_env(dry_run, None).context("load configuration")?;
    let store = CacheStore::new(config.cache_dir.clone(), config.overlay_env.as_deref());
    let registry = RegistryClientImpl::new().context("initialize registry client")?;
    Ok(Collaborators { cwd, config, store, registry, builder: SubprocessBuildRunner })
}
