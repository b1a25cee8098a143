//! Duration parsing for `mimosa cache --forget <duration>`.
//!
//! Grammar: standard time units (`ns`, `us`, `ms`, `s`, `m`, `h`) plus the
//! extensions `d` (24h), `w` (7d), `M` (30d), `y` (365d); an optional leading
//! `-`; and multi-part strings like `1w3d` that sum. This is deliberately a
//! small hand-written parser rather than a dependency — the grammar is its
//! own extension of, not identical to, any single crate's duration syntax.

use time::Duration;

use crate::error::{MimosaError, Result};

const NANOS_PER_UNIT: &[(&str, i64)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
    ("d", 24 * 3_600 * 1_000_000_000),
    ("w", 7 * 24 * 3_600 * 1_000_000_000),
    ("M", 30 * 24 * 3_600 * 1_000_000_000),
    ("y", 365 * 24 * 3_600 * 1_000_000_000),
];

/// Parse a duration string like `"1w3d"`, `"1.5h"`, or `"-2h"`.
///
/// Units are tried longest-first so that `"ms"` isn't misread as `"m"`
/// followed by a stray `"s"`. An empty string, a string with no recognized
/// unit, or a string with trailing garbage is an [`MimosaError::InvalidInvocation`].
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(MimosaError::invalid("empty duration string"));
    }

    let (negative, rest) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    if rest.is_empty() {
        return Err(MimosaError::invalid("duration has sign but no value"));
    }

    let mut total_nanos: i128 = 0;
    let mut cursor = rest;
    let mut consumed_any = false;

    while !cursor.is_empty() {
        let number_len = cursor
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| MimosaError::invalid(format!("missing unit in duration: {input:?}")))?;
        if number_len == 0 {
            return Err(MimosaError::invalid(format!(
                "expected a number in duration: {input:?}"
            )));
        }
        let (number_str, after_number) = cursor.split_at(number_len);
        let value: f64 = number_str
            .parse()
            .map_err(|_| MimosaError::invalid(format!("invalid number {number_str:?} in duration")))?;

        let (unit, nanos_per_unit) = NANOS_PER_UNIT
            .iter()
            .filter(|(unit, _)| after_number.starts_with(unit))
            .max_by_key(|(unit, _)| unit.len())
            .ok_or_else(|| {
                MimosaError::invalid(format!("unrecognized unit in duration: {input:?}"))
            })?;

        total_nanos += (value * *nanos_per_unit as f64) as i128;
        cursor = &after_number[unit.len()..];
        consumed_any = true;
    }

    if !consumed_any {
        return Err(MimosaError::invalid(format!("empty duration: {input:?}")));
    }

    let nanos = if negative { -total_nanos } else { total_nanos };
    let nanos: i64 = nanos
        .try_into()
        .map_err(|_| MimosaError::invalid("duration out of range"))?;
    Ok(Duration::nanoseconds(nanos))
}
