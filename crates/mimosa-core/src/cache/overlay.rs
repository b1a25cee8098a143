//! In-memory overlay: parse the `MIMOSA_CACHE`-shaped
//! environment variable into a `Fingerprint -> CacheEntry` map that takes
//! precedence over the on-disk store for reads and is never written back.

use std::collections::{BTreeMap, HashMap};

use time::OffsetDateTime;
use tracing::warn;

use crate::hash::Fingerprint;

use super::entry::CacheEntry;

/// The default target name used when an overlay value is a single bare tag
/// rather than a `target=tag` list.
pub const DEFAULT_TARGET: &str = "default";

/// Overlay entries carry no timestamp; this sentinel is used so
/// `CacheEntry` has a well-formed `last_updated_at` without implying the
/// overlay participates in TTL eviction (it never does — eviction only
/// ever walks the on-disk store).
pub const OVERLAY_TIMESTAMP: OffsetDateTime = OffsetDateTime::UNIX_EPOCH;

/// Parse the overlay environment variable's textual grammar.
///
/// Entries are separated by `\n`; each is `<z85-fingerprint> <value>`.
/// Blank lines and entries that fail to parse (malformed Z85, missing
/// separator, malformed `target=tag` pair) are skipped and logged, not
/// propagated — a broken single entry should not disable the whole
/// overlay.
pub fn parse_overlay(raw: &str) -> HashMap<Fingerprint, CacheEntry> {
    let mut overlay = HashMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_entry(line) {
            Ok((fp, entry)) => {
                overlay.insert(fp, entry);
            }
            Err(reason) => {
                warn!(%reason, entry = %line, "skipping malformed overlay entry");
            }
        }
    }
    overlay
}

fn parse_entry(line: &str) -> Result<(Fingerprint, CacheEntry), String> {
    let (z85, value) = line
        .split_once(' ')
        .ok_or_else(|| "missing ' ' separator".to_string())?;

    let fp = Fingerprint::from_z85(z85).map_err(|e| e.to_string())?;
    let tags_by_target = parse_value(value)?;

    Ok((
        fp,
        CacheEntry {
            tags_by_target,
            last_updated_at: OVERLAY_TIMESTAMP,
        },
    ))
}

fn parse_value(value: &str) -> Result<BTreeMap<String, Vec<String>>, String> {
    if value.is_empty() {
        return Err("empty value".to_string());
    }
    if !value.contains('=') {
        let mut map = BTreeMap::new();
        map.insert(DEFAULT_TARGET.to_string(), vec![value.to_string()]);
        return Ok(map);
    }

    let mut map = BTreeMap::new();
    for pair in value.split(',') {
        let (target, tag) = pair
            .split_once('=')
            .ok_or_else(|| format!("malformed target=tag pair: {pair:?}"))?;
        if target.is_empty() || tag.is_empty() {
            return Err(format!("empty target or tag in pair: {pair:?}"));
        }
        map.insert(target.to_string(), vec![tag.to_string()]);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_z85() -> String {
        Fingerprint::from_buffer(b"overlay-sample").to_z85()
    }

    #[test]
    fn bare_tag_implies_default_target() {
        let z85 = sample_z85();
        let raw = format!("{z85} cached:v1");
        let overlay = parse_overlay(&raw);
        let fp = Fingerprint::from_z85(&z85).unwrap();
        assert_eq!(
            overlay.get(&fp).unwrap().tags_by_target.get(DEFAULT_TARGET),
            Some(&vec!["cached:v1".to_string()])
        );
    }

    #[test]
    fn multi_target_list() {
        let z85 = sample_z85();
        let raw = format!("{z85} web=cached:v1,worker=cached:v2");
        let overlay = parse_overlay(&raw);
        let fp = Fingerprint::from_z85(&z85).unwrap();
        let entry = overlay.get(&fp).unwrap();
        assert_eq!(entry.tags_by_target.get("web"), Some(&vec!["cached:v1".to_string()]));
        assert_eq!(entry.tags_by_target.get("worker"), Some(&vec!["cached:v2".to_string()]));
    }

    #[test]
    fn blank_lines_and_malformed_entries_are_skipped() {
        let z85 = sample_z85();
        let raw = format!("\n   \nnot-valid-z85 foo\n{z85} cached:v1\n");
        let overlay = parse_overlay(&raw);
        assert_eq!(overlay.len(), 1);
    }

    #[test]
    fn multiple_entries_parse_independently() {
        let a = Fingerprint::from_buffer(b"a").to_z85();
        let b = Fingerprint::from_buffer(b"b").to_z85();
        let raw = format!("{a} cached:a\n{b} cached:b");
        let overlay = parse_overlay(&raw);
        assert_eq!(overlay.len(), 2);
    }
}
