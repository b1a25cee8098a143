use color_eyre::Result;
use color_eyre::eyre::Context as _;
use inquire::Confirm;
use mimosa_core::cache::CacheStore;
use mimosa_core::config::Config;
use tracing::instrument;

/// `cache --purge`: delete the entire local cache directory. Destructive,
/// so it prompts for confirmation unless `--yes` was given.
#[instrument(skip(config))]
pub fn exec(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        let confirmed = Confirm::new(&format!("Delete the entire cache at {}?", config.cache_dir.display()))
            .with_default(false)
            .prompt()
            .context("prompt for purge confirmation")?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let store = CacheStore::new(config.cache_dir.clone(), config.overlay_env.as_deref());
    store.purge().context("purge cache directory")?;
    println!("Cache directory removed.");
    Ok(())
}
