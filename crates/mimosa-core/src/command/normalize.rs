//! The two-phase canonicalization: Phase A classifies and
//! rewrites each flag according to a small declarative table, Phase B
//! stably sorts the result so invocation order stops mattering.
//!
//! The table-plus-dispatcher shape decides which flags are
//! cache-irrelevant noise versus which change the build.

use std::fmt;

use crate::error::Result;

use super::invalid;

/// How a flag's value should be rewritten before sorting.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum FlagMode {
    /// Drop the flag (and its value) entirely. It has no effect on the
    /// image produced, only on build-time UX (verbosity).
    Discard,
    /// Keep the flag, replace its whole value with a placeholder. Used for
    /// flags whose value varies run-to-run (an iidfile path, a tag) without
    /// changing what gets built.
    TemplateFull,
    /// Keep the flag; the value is `key=value[,key=value...]`. Listed
    /// subkeys are templated, everything else (including unlisted keys)
    /// passes through verbatim.
    TemplateSubkeys(&'static [&'static str]),
    /// Keep the flag; the value is `key=value` or a bare key. The key is
    /// kept, the value (if any) is templated. A bare key with no `=` is
    /// preserved verbatim, since it *is* the whole instruction.
    TemplateLabel,
}

/// One entry in the normalization table.
#[derive(Clone, Copy, Debug)]
pub struct FlagRule {
    pub long: &'static str,
    pub short: Option<&'static str>,
    pub mode: FlagMode,
}

/// The flags this system knows to treat specially. Anything not listed here
/// passes through Phase A unchanged, preserving the "unlisted flags still
/// affect the fingerprint" sensitivity property.
pub const FLAG_TABLE: &[FlagRule] = &[
    FlagRule { long: "--quiet", short: Some("-q"), mode: FlagMode::Discard },
    FlagRule { long: "--debug", short: Some("-D"), mode: FlagMode::Discard },
    FlagRule { long: "--tag", short: Some("-t"), mode: FlagMode::TemplateFull },
    FlagRule { long: "--iidfile", short: None, mode: FlagMode::TemplateFull },
    FlagRule { long: "--metadata-file", short: None, mode: FlagMode::TemplateFull },
    FlagRule { long: "--cache-to", short: None, mode: FlagMode::TemplateFull },
    FlagRule { long: "--progress", short: None, mode: FlagMode::TemplateFull },
    FlagRule { long: "--builder", short: None, mode: FlagMode::TemplateFull },
    FlagRule {
        long: "--attest",
        short: None,
        mode: FlagMode::TemplateSubkeys(&["builder-id"]),
    },
    FlagRule {
        long: "--secret",
        short: None,
        mode: FlagMode::TemplateSubkeys(&["src", "env"]),
    },
    FlagRule { long: "--label", short: None, mode: FlagMode::TemplateLabel },
];

const PLACEHOLDER: &str = "<VALUE>";

fn lookup(name: &str) -> Option<&'static FlagRule> {
    FLAG_TABLE
        .iter()
        .find(|rule| rule.long == name || rule.short == Some(name))
}

/// The sorted, noise-stripped argument vector. Joining its elements with a
/// single space gives the canonical string the fingerprint composer hashes.
#[derive(Clone, Eq, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
pub struct CanonicalArgs(pub Vec<String>);

impl fmt::Display for CanonicalArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

/// One flag (with its optional value) or one positional token, produced
/// while walking the raw argument vector. Groups are the unit Phase B
/// sorts, so a flag and its value travel together.
enum Unit {
    Flag { name: String, value: Option<String> },
    Positional(String),
}

fn tokenize(args: &[String]) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let token = &args[i];
        if let Some(stripped) = token.strip_prefix("--") {
            if let Some((name, value)) = stripped.split_once('=') {
                units.push(Unit::Flag {
                    name: format!("--{name}"),
                    value: Some(value.to_string()),
                });
                i += 1;
                continue;
            }
        }
        if token.starts_with('-') && token.len() > 1 {
            let is_boolean = matches!(
                lookup(token),
                Some(FlagRule { mode: FlagMode::Discard, .. })
            );
            if is_boolean {
                units.push(Unit::Flag { name: token.clone(), value: None });
                i += 1;
                continue;
            }
            let next = args.get(i + 1);
            let takes_value = next.map(|n| !n.starts_with('-')).unwrap_or(false);
            if takes_value {
                units.push(Unit::Flag {
                    name: token.clone(),
                    value: Some(args[i + 1].clone()),
                });
                i += 2;
            } else {
                units.push(Unit::Flag { name: token.clone(), value: None });
                i += 1;
            }
            continue;
        }
        units.push(Unit::Positional(token.clone()));
        i += 1;
    }
    units
}

fn template_subkeys(value: &str, subkeys: &[&str]) -> String {
    value
        .split(',')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if subkeys.contains(&key) => format!("{key}={PLACEHOLDER}"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn template_label(value: &str) -> String {
    match value.split_once('=') {
        Some((key, _)) => format!("{key}={PLACEHOLDER}"),
        None => value.to_string(),
    }
}

/// Apply Phase A (classify + rewrite) to one unit, returning `None` if it
/// should be discarded entirely.
fn apply_phase_a(unit: Unit) -> Option<(String, Option<String>)> {
    match unit {
        Unit::Positional(token) => Some((token, None)),
        Unit::Flag { name, value } => {
            let Some(rule) = lookup(&name) else {
                return Some((name, value));
            };
            match rule.mode {
                FlagMode::Discard => None,
                FlagMode::TemplateFull => Some((name, value.map(|_| PLACEHOLDER.to_string()))),
                FlagMode::TemplateSubkeys(subkeys) => {
                    Some((name, value.map(|v| template_subkeys(&v, subkeys))))
                }
                FlagMode::TemplateLabel => Some((name, value.map(|v| template_label(&v)))),
            }
        }
    }
}

/// Canonicalize a raw argument vector into a sorted, noise-free
/// [`CanonicalArgs`]. `prefix_len` is the number of leading tokens (the
/// command name itself) kept verbatim at the front, unsorted.
pub fn canonicalize(raw_argv: &[String], prefix_len: usize) -> Result<CanonicalArgs> {
    if raw_argv.len() < prefix_len {
        return Err(invalid("argument vector shorter than its own command prefix"));
    }
    let prefix = raw_argv[..prefix_len].to_vec();
    let units = tokenize(&raw_argv[prefix_len..]);

    let mut groups: Vec<Vec<String>> = Vec::new();
    for unit in units {
        if let Some((name, value)) = apply_phase_a(unit) {
            let mut group = vec![name];
            if let Some(value) = value {
                group.push(value);
            }
            groups.push(group);
        }
    }

    groups.sort();

    let mut flattened = prefix;
    for group in groups {
        flattened.extend(group);
    }

    Ok(CanonicalArgs(flattened))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn discard_drops_quiet() {
        let out = canonicalize(&argv("docker build -q -t a:1 ."), 2).unwrap();
        assert!(!out.0.iter().any(|a| a == "-q"));
    }

    #[test]
    fn template_full_hides_tag_value() {
        let out = canonicalize(&argv("docker build -t a:1 ."), 2).unwrap();
        let idx = out.0.iter().position(|a| a == "-t").unwrap();
        assert_eq!(out.0[idx + 1], "<VALUE>");
    }

    #[test]
    fn order_independence() {
        let a = canonicalize(&argv("docker build -t a:1 --builder x ."), 2).unwrap();
        let b = canonicalize(&argv("docker build --builder x -t a:1 ."), 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn equals_form_matches_space_form() {
        let a = canonicalize(&argv("docker build --tag=a:1 ."), 2).unwrap();
        let b = canonicalize(&argv("docker build --tag a:1 ."), 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn subkey_templating_preserves_unlisted_keys() {
        let out = canonicalize(&argv("docker build --secret id=mysecret,src=/tmp/x,env=FOO ."), 2)
            .unwrap();
        let idx = out.0.iter().position(|a| a == "--secret").unwrap();
        assert_eq!(out.0[idx + 1], "id=mysecret,src=<VALUE>,env=<VALUE>");
    }

    #[test]
    fn label_without_equals_is_verbatim() {
        let out = canonicalize(&argv("docker build --label solo ."), 2).unwrap();
        let idx = out.0.iter().position(|a| a == "--label").unwrap();
        assert_eq!(out.0[idx + 1], "solo");
    }

    #[test]
    fn progress_value_is_templated_but_presence_is_kept() {
        let out = canonicalize(&argv("docker build --progress=plain -t a:1 ."), 2).unwrap();
        let idx = out.0.iter().position(|a| a == "--progress").unwrap();
        assert_eq!(out.0[idx + 1], "<VALUE>");
    }

    #[test]
    fn cache_from_is_untabled_and_value_sensitive() {
        let a = canonicalize(&argv("docker build --cache-from a:cache -t x:1 ."), 2).unwrap();
        let b = canonicalize(&argv("docker build --cache-from b:cache -t x:1 ."), 2).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unlisted_flag_changes_canonical_form() {
        let a = canonicalize(&argv("docker build -t a:1 --platform linux/amd64 ."), 2).unwrap();
        let b = canonicalize(&argv("docker build -t a:1 --platform linux/arm64 ."), 2).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn display_joins_with_space() {
        let out = canonicalize(&argv("docker build -t a:1 ."), 2).unwrap();
        assert_eq!(out.to_string(), out.0.join(" "));
    }
}
