use color_eyre::Result;
use color_eyre::eyre::Context as _;
use mimosa_core::cache::CacheStore;
use mimosa_core::duration::parse_duration;
use time::OffsetDateTime;
use tracing::{info, instrument};

/// `cache --forget <duration>`: delete cache entries whose last update is
/// older than `now - duration`.
#[instrument(skip(store))]
pub fn exec(store: &CacheStore, duration: &str) -> Result<()> {
    let age = parse_duration(duration).context("parse --forget duration")?;
    let cutoff = OffsetDateTime::now_utc() - age;
    let deleted = store.forget_older_than(cutoff).context("evict expired cache entries")?;
    info!(deleted, %cutoff, "evicted expired cache entries");
    Ok(())
}
