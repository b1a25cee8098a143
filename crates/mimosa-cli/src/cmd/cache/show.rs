use color_eyre::Result;
use color_eyre::eyre::Context as _;
use mimosa_core::cache::CacheStore;
use time::OffsetDateTime;
use tracing::instrument;

/// `cache --show` / `cache --to-env-value`. `--show` renders a
/// human-readable target → latest tag → age table; `--to-env-value` prints
/// the raw `MIMOSA_CACHE` overlay grammar a caller can `export` verbatim.
#[instrument(skip(store))]
pub fn exec(store: &CacheStore, to_env_value: bool) -> Result<()> {
    if to_env_value {
        let rendered =
            store.export_overlay_format().context("export cache directory as overlay grammar")?;
        print!("{rendered}");
        return Ok(());
    }

    let entries = store.list_entries().context("list on-disk cache entries")?;
    if entries.is_empty() {
        println!("(empty cache)");
        return Ok(());
    }

    let now = OffsetDateTime::now_utc();
    println!("{:<40} {:<40} AGE", "TARGET", "LATEST TAG");
    for entry in &entries {
        let age = humanize_age(now - entry.last_updated_at);
        for (target, tag) in entry.latest_tag_by_target() {
            println!("{target:<40} {tag:<40} {age}");
        }
    }

    Ok(())
}

/// Render a (non-negative, by construction) duration as a single
/// coarse-grained unit, e.g. `"3h ago"` or `"2d ago"`.
fn humanize_age(age: time::Duration) -> String {
    let seconds = age.whole_seconds().max(0);
    let (value, unit) = if seconds < 60 {
        (seconds, "s")
    } else if seconds < 3600 {
        (seconds / 60, "m")
    } else if seconds < 86_400 {
        (seconds / 3600, "h")
    } else {
        (seconds / 86_400, "d")
    };
    format!("{value}{unit} ago")
}
