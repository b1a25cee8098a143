//! Flag extraction: scan a raw argument vector for the handful of facts the
//! rest of the pipeline needs (tags, contexts, dockerfile path), independent
//! of the noise-stripping normalization in [`super::normalize`].
//!
//! Uses an iterator-based argument walk: a `Peekable` over the token
//! stream, with each flag responsible for deciding whether it consumes
//! the following token as a value.

use std::iter::Peekable;
use std::slice::Iter;

use crate::error::Result;

use super::invalid;

/// Which of the three supported command shapes this invocation is.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum BuilderKind {
    /// `docker build ...`
    Build,
    /// `docker buildx build ...`
    BuildxBuild,
    /// `docker buildx bake ...`
    BuildxBake,
}

impl BuilderKind {
    /// Whether this command shape requires a destination tag and a concrete
    /// dockerfile/context pair on the command line. Bake targets pull both
    /// from the bake file, which is outside this system's scope, so bake
    /// invocations are fingerprinted from whatever canonical args and cwd
    /// are visible and are never rejected for a missing `-t`.
    fn requires_tag_and_context(self) -> bool {
        !matches!(self, BuilderKind::BuildxBake)
    }
}

/// Facts pulled out of a raw argument vector.
#[derive(Clone, Debug)]
pub struct ExtractedFacts {
    pub builder_kind: BuilderKind,
    /// Number of leading tokens that make up the command prefix itself
    /// (`["docker", "build"]` or `["docker", "buildx", "build"]`), kept out
    /// of the sortable portion of `CanonicalArgs`.
    pub prefix_len: usize,
    pub all_tags: Vec<String>,
    pub build_contexts: Vec<(String, String)>,
    pub dockerfile: String,
    pub ignore_file: Option<String>,
    pub context_path: String,
}

/// Flags that take no value (kept in sync with `normalize::FLAG_TABLE`'s
/// `Discard` entries, plus generic docker booleans the table doesn't need to
/// template).
const BOOLEAN_FLAGS: &[&str] = &[
    "--quiet", "-q", "--debug", "-D", "--pull", "--no-cache", "--squash", "--load", "--push",
    "--provenance",
];

pub fn extract_facts(raw_argv: &[String]) -> Result<ExtractedFacts> {
    let (builder_kind, prefix_len) = detect_builder_kind(raw_argv)?;

    let mut all_tags = Vec::new();
    let mut build_contexts = Vec::new();
    let mut dockerfile: Option<String> = None;
    let mut ignore_file: Option<String> = None;
    let mut positionals = Vec::new();

    let mut iter = raw_argv[prefix_len..].iter().peekable();
    while let Some(token) = iter.next() {
        if !token.starts_with('-') {
            positionals.push(token.clone());
            continue;
        }

        let (name, inline_value) = split_equals(token);
        let canonical = resolve_alias(name);

        match canonical {
            "--tag" => all_tags.push(take_value(&mut iter, inline_value, "--tag")?),
            "--build-context" => {
                let raw = take_value(&mut iter, inline_value, "--build-context")?;
                let (name, value) = raw.split_once('=').ok_or_else(|| {
                    invalid(format!("--build-context value missing '=': {raw:?}"))
                })?;
                build_contexts.push((name.to_string(), value.to_string()));
            }
            "--file" => dockerfile = Some(take_value(&mut iter, inline_value, "--file")?),
            "--ignore-file" => {
                ignore_file = Some(take_value(&mut iter, inline_value, "--ignore-file")?)
            }
            _ if BOOLEAN_FLAGS.contains(&canonical) => {
                // No value to consume, even if one was attached via `=`.
            }
            _ => {
                // Unknown flag: if it doesn't carry an inline value, assume
                // it takes one and consume the next token by peeking ahead.
                // This errs toward not misreading an unrelated positional
                // as a flag's value only when the next token itself looks
                // like a flag.
                if inline_value.is_none() {
                    if let Some(next) = iter.peek() {
                        if !next.starts_with('-') {
                            iter.next();
                        }
                    }
                }
            }
        }
    }

    if builder_kind.requires_tag_and_context() && all_tags.is_empty() {
        return Err(invalid("build invocation is missing a destination tag (-t/--tag)"));
    }

    let context_path = match positionals.last() {
        Some(p) => p.clone(),
        None if builder_kind.requires_tag_and_context() => {
            return Err(invalid("build invocation is missing a context path"));
        }
        None => ".".to_string(),
    };

    Ok(ExtractedFacts {
        builder_kind,
        prefix_len,
        all_tags,
        build_contexts,
        dockerfile: dockerfile.unwrap_or_else(|| "Dockerfile".to_string()),
        ignore_file,
        context_path,
    })
}

fn detect_builder_kind(raw_argv: &[String]) -> Result<(BuilderKind, usize)> {
    let first = raw_argv.first().map(String::as_str);
    let second = raw_argv.get(1).map(String::as_str);
    let third = raw_argv.get(2).map(String::as_str);

    match (first, second, third) {
        (Some("docker"), Some("build"), _) => Ok((BuilderKind::Build, 2)),
        (Some("docker"), Some("buildx"), Some("build")) => Ok((BuilderKind::BuildxBuild, 3)),
        (Some("docker"), Some("buildx"), Some("bake")) => Ok((BuilderKind::BuildxBake, 3)),
        _ => Err(invalid(format!(
            "unsupported build command: {:?}",
            raw_argv
        ))),
    }
}

/// Resolve a short-form alias to its long-form flag name for table lookups.
/// Flags with no alias pass through unchanged.
fn resolve_alias(name: &str) -> &str {
    match name {
        "-t" => "--tag",
        "-f" => "--file",
        other => other,
    }
}

fn split_equals(token: &str) -> (&str, Option<&str>) {
    if let Some(stripped) = token.strip_prefix("--") {
        if let Some((name, value)) = stripped.split_once('=') {
            return (&token[..2 + name.len()], Some(value));
        }
    }
    (token, None)
}

fn take_value(
    iter: &mut Peekable<Iter<String>>,
    inline_value: Option<&str>,
    flag: &str,
) -> Result<String> {
    if let Some(value) = inline_value {
        return Ok(value.to_string());
    }
    iter.next()
        .cloned()
        .ok_or_else(|| invalid(format!("{flag} is missing a value")))
}
