//! [`CacheEntry`] and the tag-history merge rule: pre-initialize, then
//! dedup-then-cap-to-last-10.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Maximum number of tags retained per target.
pub const MAX_TAGS_PER_TARGET: usize = 10;

/// The on-disk / in-memory unit the cache store keys by fingerprint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(rename = "tagsByTarget")]
    pub tags_by_target: BTreeMap<String, Vec<String>>,
    #[serde(rename = "lastUpdatedAt", with = "time::serde::rfc3339")]
    pub last_updated_at: OffsetDateTime,
}

impl CacheEntry {
    /// A fresh entry with no tags, stamped at `now`.
    pub fn empty(now: OffsetDateTime) -> Self {
        Self {
            tags_by_target: BTreeMap::new(),
            last_updated_at: now,
        }
    }

    /// Merge `new_tags_by_target` into this entry in place: for each
    /// target, append the new tags, deduplicate keeping the *last*
    /// occurrence of each tag, then trim to the most recent
    /// [`MAX_TAGS_PER_TARGET`] entries. Advances `last_updated_at`.
    pub fn merge(&mut self, new_tags_by_target: &BTreeMap<String, Vec<String>>, now: OffsetDateTime) {
        for (target, new_tags) in new_tags_by_target {
            let existing = self.tags_by_target.entry(target.clone()).or_default();
            let merged = merge_tag_history(existing, new_tags);
            *existing = merged;
        }
        self.last_updated_at = now;
    }

    /// For each target with a non-empty history, the most recently added
    /// tag.
    pub fn latest_tag_by_target(&self) -> BTreeMap<String, String> {
        self.tags_by_target
            .iter()
            .filter_map(|(target, tags)| tags.last().map(|tag| (target.clone(), tag.clone())))
            .collect()
    }
}

/// Append `new_tags` to `existing`, deduplicate preserving the last
/// occurrence of each value, then cap to the trailing
/// [`MAX_TAGS_PER_TARGET`] elements.
fn merge_tag_history(existing: &[String], new_tags: &[String]) -> Vec<String> {
    let combined: Vec<String> = existing.iter().cloned().chain(new_tags.iter().cloned()).collect();

    let mut seen = HashSet::new();
    let mut deduped_reversed = Vec::with_capacity(combined.len());
    for tag in combined.into_iter().rev() {
        if seen.insert(tag.clone()) {
            deduped_reversed.push(tag);
        }
    }
    deduped_reversed.reverse();

    if deduped_reversed.len() > MAX_TAGS_PER_TARGET {
        let drop = deduped_reversed.len() - MAX_TAGS_PER_TARGET;
        deduped_reversed.drain(..drop);
    }
    deduped_reversed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    fn tags(s: &[&str]) -> Vec<String> {
        s.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn dedup_then_cap_matches_documented_example() {
        let existing = tags(&["a", "b", "c"]);
        let new = tags(&["a", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m"]);
        let merged = merge_tag_history(&existing, &new);
        assert_eq!(merged, tags(&["d", "e", "f", "g", "h", "i", "j", "k", "l", "m"]));
    }

    #[test]
    fn no_duplicates_survive() {
        let existing = tags(&["a", "b"]);
        let new = tags(&["b", "c"]);
        let merged = merge_tag_history(&existing, &new);
        assert_eq!(merged, tags(&["a", "b", "c"]));
    }

    #[test]
    fn merge_advances_last_updated_at() {
        let mut entry = CacheEntry::empty(datetime!(2026-01-01 00:00 UTC));
        let mut new_tags = BTreeMap::new();
        new_tags.insert("default".to_string(), tags(&["v1"]));
        entry.merge(&new_tags, datetime!(2026-01-02 00:00 UTC));
        assert_eq!(entry.last_updated_at, datetime!(2026-01-02 00:00 UTC));
        assert_eq!(entry.tags_by_target.get("default"), Some(&tags(&["v1"])));
    }

    #[test]
    fn latest_tag_by_target_takes_last_element() {
        let mut entry = CacheEntry::empty(datetime!(2026-01-01 00:00 UTC));
        entry.tags_by_target.insert("default".to_string(), tags(&["v1", "v2"]));
        entry.tags_by_target.insert("empty".to_string(), Vec::new());
        assert_eq!(
            entry.latest_tag_by_target(),
            BTreeMap::from([("default".to_string(), "v2".to_string())])
        );
    }
}
