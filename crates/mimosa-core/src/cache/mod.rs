//! Cache store: a two-tier key→[`CacheEntry`] map keyed by
//! [`Fingerprint`], backed by an in-memory overlay (read-only, sourced from
//! the environment) layered over plain JSON files on disk.
//!
//! Writes are atomic: a sibling temp file is written and renamed into
//! place. This diverges from a SQLite-backed metadata store, since the
//! on-disk layout here is one plain JSON file per fingerprint, not a
//! queryable database; `sqlx`/`rusqlite` are dropped (see DESIGN.md).

mod entry;
mod overlay;

pub use entry::{CacheEntry, MAX_TAGS_PER_TARGET};
pub use overlay::DEFAULT_TARGET;

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use crate::error::{MimosaError, Result};
use crate::hash::Fingerprint;

/// A two-tier cache store: an optional read-only in-memory overlay plus a
/// directory of `<hex-fingerprint>.json` files.
pub struct CacheStore {
    cache_dir: PathBuf,
    overlay: HashMap<Fingerprint, CacheEntry>,
}

impl CacheStore {
    /// Build a store rooted at `cache_dir`, with the overlay parsed from
    /// `overlay_env` (the raw value of `MIMOSA_CACHE`, if set).
    pub fn new(cache_dir: impl Into<PathBuf>, overlay_env: Option<&str>) -> Self {
        let overlay = overlay_env.map(overlay::parse_overlay).unwrap_or_default();
        Self {
            cache_dir: cache_dir.into(),
            overlay,
        }
    }

    fn entry_path(&self, fp: Fingerprint) -> PathBuf {
        self.cache_dir.join(format!("{}.json", fp.to_hex()))
    }

    /// `true` iff the overlay has an entry for `fp`, or the on-disk file
    /// exists. The overlay is checked first.
    #[instrument(skip(self))]
    pub fn exists(&self, fp: Fingerprint) -> bool {
        if self.overlay.contains_key(&fp) {
            debug!("cache hit served from overlay");
            return true;
        }
        self.entry_path(fp).is_file()
    }

    /// Overlay wins; otherwise read and decode the on-disk file. Malformed
    /// on-disk JSON is treated as a missing entry, not an error.
    #[instrument(skip(self))]
    pub fn load(&self, fp: Fingerprint) -> Result<Option<CacheEntry>> {
        if let Some(entry) = self.overlay.get(&fp) {
            debug!("cache entry served from overlay");
            return Ok(Some(entry.clone()));
        }

        let path = self.entry_path(fp);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(MimosaError::io(path, err)),
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                warn!(%err, path = %path.display(), "malformed cache entry, treating as missing");
                Ok(None)
            }
        }
    }

    /// Read-modify-write the on-disk entry for `fp`, merging
    /// `new_tags_by_target` per the tag-history rule.
    /// Creates the cache directory and the entry file if absent. Returns
    /// the entry as written.
    #[instrument(skip(self, new_tags_by_target))]
    pub fn save(
        &self,
        fp: Fingerprint,
        new_tags_by_target: &BTreeMap<String, Vec<String>>,
    ) -> Result<CacheEntry> {
        create_cache_dir(&self.cache_dir)?;

        let path = self.entry_path(fp);
        let mut entry = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<CacheEntry>(&bytes)
                .unwrap_or_else(|_| CacheEntry::empty(now())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => CacheEntry::empty(now()),
            Err(err) => return Err(MimosaError::io(path, err)),
        };

        entry.merge(new_tags_by_target, now());
        write_atomically(&path, &entry)?;
        Ok(entry)
    }

    /// For each target with a non-empty history, the most recently added
    /// tag. `None` if the fingerprint has no entry at all.
    pub fn latest_tag_by_target(&self, fp: Fingerprint) -> Result<Option<BTreeMap<String, String>>> {
        Ok(self.load(fp)?.map(|entry| entry.latest_tag_by_target()))
    }

    /// Walk the cache directory and delete every entry whose
    /// `last_updated_at <= cutoff`. Malformed files are logged and left in
    /// place. Returns the number of files deleted.
    #[instrument(skip(self))]
    pub fn forget_older_than(&self, cutoff: OffsetDateTime) -> Result<usize> {
        let read_dir = match std::fs::read_dir(&self.cache_dir) {
            Ok(rd) => rd,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(MimosaError::io(&self.cache_dir, err)),
        };

        let mut deleted = 0;
        for dir_entry in read_dir {
            let dir_entry = match dir_entry {
                Ok(e) => e,
                Err(err) => {
                    warn!(%err, "failed to read cache directory entry during eviction, skipping");
                    continue;
                }
            };
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(%err, path = %path.display(), "failed to read cache entry during eviction, skipping");
                    continue;
                }
            };

            let entry: CacheEntry = match serde_json::from_slice(&bytes) {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(%err, path = %path.display(), "malformed cache entry during eviction, leaving alone");
                    continue;
                }
            };

            if entry.last_updated_at <= cutoff {
                if let Err(err) = std::fs::remove_file(&path) {
                    warn!(%err, path = %path.display(), "failed to delete expired cache entry");
                    continue;
                }
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Delete the entire on-disk cache directory. The in-memory overlay is
    /// untouched — it is sourced from the environment, not this directory.
    #[instrument(skip(self))]
    pub fn purge(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.cache_dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(MimosaError::io(&self.cache_dir, err)),
        }
    }

    /// Every on-disk entry, newest-first by `last_updated_at`. Malformed
    /// files are skipped, matching [`Self::export_overlay_format`]'s
    /// tolerance. Does not include the in-memory overlay, since that has no
    /// directory of its own to walk.
    #[instrument(skip(self))]
    pub fn list_entries(&self) -> Result<Vec<CacheEntry>> {
        let read_dir = match std::fs::read_dir(&self.cache_dir) {
            Ok(rd) => rd,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(MimosaError::io(&self.cache_dir, err)),
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let Ok(dir_entry) = dir_entry else { continue };
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(bytes) = std::fs::read(&path) else { continue };
            let Ok(entry) = serde_json::from_slice::<CacheEntry>(&bytes) else {
                continue;
            };
            entries.push(entry);
        }

        entries.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));
        Ok(entries)
    }

    /// Export the on-disk store in the overlay's textual grammar,
    /// newest-first by `last_updated_at`.
    #[instrument(skip(self))]
    pub fn export_overlay_format(&self) -> Result<String> {
        let read_dir = match std::fs::read_dir(&self.cache_dir) {
            Ok(rd) => rd,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
            Err(err) => return Err(MimosaError::io(&self.cache_dir, err)),
        };

        let mut rows: Vec<(OffsetDateTime, String)> = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = match dir_entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let path = dir_entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(fp) = Fingerprint::from_hex(stem) else {
                continue;
            };
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            let Ok(entry) = serde_json::from_slice::<CacheEntry>(&bytes) else {
                continue;
            };

            let value = render_entry_value(&entry);
            rows.push((entry.last_updated_at, format!("{} {value}", fp.to_z85())));
        }

        rows.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(rows.into_iter().map(|(_, line)| line).collect::<Vec<_>>().join("\n"))
    }
}

fn render_entry_value(entry: &CacheEntry) -> String {
    let latest = entry.latest_tag_by_target();
    if let [(target, tag)] = latest.iter().collect::<Vec<_>>()[..] {
        if target.as_str() == DEFAULT_TARGET {
            return tag.clone();
        }
    }
    latest
        .iter()
        .map(|(target, tag)| format!("{target}={tag}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn create_cache_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| MimosaError::io(dir, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        std::fs::set_permissions(dir, perms).map_err(|e| MimosaError::io(dir, e))?;
    }
    Ok(())
}

fn write_atomically(path: &Path, entry: &CacheEntry) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let json = serde_json::to_vec_pretty(entry)
        .map_err(|e| MimosaError::invalid(format!("failed to encode cache entry: {e}")))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| MimosaError::io(dir, e))?;
    tmp.write_all(&json).map_err(|e| MimosaError::io(path, e))?;
    tmp.flush().map_err(|e| MimosaError::io(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o644);
        std::fs::set_permissions(tmp.path(), perms).map_err(|e| MimosaError::io(path, e))?;
    }

    tmp.persist(path)
        .map_err(|e| MimosaError::io(path, e.error))?;
    Ok(())
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}
