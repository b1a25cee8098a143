use clap::Args;
use color_eyre::Result;

pub mod forget;
pub mod purge;
pub mod show;

/// `mimosa cache`: inspect or manage the local cache directory. Flags may
/// be combined; they run in a fixed order (forget, then purge, then show)
/// so a caller can e.g. evict stale entries and print what remains in one
/// invocation.
#[derive(Clone, Debug, Args)]
pub struct Options {
    /// Delete cache entries whose last update is older than this duration
    /// (e.g. `30d`, `1w3d`).
    #[arg(long, value_name = "DURATION")]
    pub forget: Option<String>,

    /// Skip the confirmation prompt for `--purge`.
    #[arg(long, short)]
    pub yes: bool,

    /// Print the cache directory's contents in the `MIMOSA_CACHE` overlay
    /// grammar.
    #[arg(long)]
    pub show: bool,

    /// Like `--show`, but formatted as a single ready-to-export
    /// `MIMOSA_CACHE` value.
    #[arg(long)]
    pub to_env_value: bool,

    /// Delete the entire local cache directory.
    #[arg(long)]
    pub purge: bool,
}

pub fn exec(options: Options) -> Result<()> {
    let config = mimosa_core::config::Config::from_env(false, None)?;
    let store = mimosa_core::cache::CacheStore::new(config.cache_dir.clone(), config.overlay_env.as_deref());

    if let Some(duration) = &options.forget {
        forget::exec(&store, duration)?;
    }
    if options.purge {
        purge::exec(&config, options.yes)?;
    }
    if options.show || options.to_env_value {
        show::exec(&store, options.to_env_value)?;
    }
    Ok(())
}
