//! Command normalizer and the [`BuildInvocation`] data model.
//!
//! A tokenizer understands `--flag value` and `--flag=value` uniformly,
//! and a small set of recognized flags is layered over a generic
//! fallback for anything unrecognized, so unknown future flags still
//! round-trip instead of being silently dropped.

mod args;
mod normalize;

pub use args::{BuilderKind, ExtractedFacts};
pub use normalize::{CanonicalArgs, FlagMode, FlagRule, FLAG_TABLE};

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::{MimosaError, Result};
use crate::fileset;

/// Where a named build context points.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum ContextLocation {
    /// A local directory, as an absolute path.
    Local(PathBuf),
    /// A remote source: a tarball URL, a registry image ref, or an OCI
    /// layout URL. Stored as the original string since its identity (not
    /// its content) is what the fingerprint needs to be sensitive to.
    Remote(String),
}

impl ContextLocation {
    /// Classify a raw context value from the command line.
    pub fn classify(raw: &str, base_dir: &Path) -> Self {
        if fileset::is_remote_context(raw) {
            ContextLocation::Remote(raw.to_string())
        } else {
            let path = Path::new(raw);
            let absolute = if path.is_absolute() {
                path.to_path_buf()
            } else {
                base_dir.join(path)
            };
            ContextLocation::Local(absolute)
        }
    }
}

/// The name used for the primary (positional) build context, as opposed to
/// a named `--build-context` addition.
pub const MAIN_CONTEXT_NAME: &str = "default";

/// Input to the fingerprint composer.
///
/// Created per invocation, never mutated.
#[derive(Clone, Debug)]
pub struct BuildInvocation {
    /// Absolute dockerfile path.
    pub dockerfile_path: PathBuf,
    /// Absolute ignore-file path for the main context, if present.
    pub ignore_file_path: Option<PathBuf>,
    /// Every context referenced by the build, keyed by name.
    /// `MAIN_CONTEXT_NAME` is the positional context argument.
    pub contexts: BTreeMap<String, ContextLocation>,
    /// Destination registry domains, de-duplicated, derived from `all_tags`.
    pub registry_domains: BTreeSet<String>,
    /// Tags requested on the command line, in the order given.
    pub all_tags: Vec<String>,
    /// The noise-stripped, sorted argument vector.
    pub canonical_args: CanonicalArgs,
}

/// Parse a raw `docker build` / `docker buildx build` / `docker buildx
/// bake` argument vector into a [`BuildInvocation`].
///
/// `cwd` is the directory relative paths (the context, the dockerfile) are
/// resolved against; callers pass the process's current directory in
/// production and an arbitrary temp directory in tests.
pub fn parse_build_invocation(raw_argv: &[String], cwd: &Path) -> Result<BuildInvocation> {
    let facts = args::extract_facts(raw_argv)?;
    let canonical_args = normalize::canonicalize(raw_argv, facts.prefix_len)?;

    let dockerfile_path = resolve_path(&facts.dockerfile, cwd);
    let context_path = ContextLocation::classify(&facts.context_path, cwd);

    let ignore_file_path = match &context_path {
        ContextLocation::Local(dir) => facts
            .ignore_file
            .as_ref()
            .map(|p| resolve_path(p, cwd))
            .or_else(|| fileset::default_ignore_file_for_context(dir)),
        ContextLocation::Remote(_) => None,
    };

    let mut contexts = BTreeMap::new();
    contexts.insert(MAIN_CONTEXT_NAME.to_string(), context_path);
    for (name, raw_value) in &facts.build_contexts {
        contexts.insert(name.clone(), ContextLocation::classify(raw_value, cwd));
    }

    let registry_domains = facts
        .all_tags
        .iter()
        .map(|tag| registry_domain_of(tag))
        .collect::<BTreeSet<_>>();

    Ok(BuildInvocation {
        dockerfile_path,
        ignore_file_path,
        contexts,
        registry_domains,
        all_tags: facts.all_tags,
        canonical_args,
    })
}

fn resolve_path(raw: &str, cwd: &Path) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Extract the registry domain portion of a tag, e.g.
/// `registry.example.com/team/app:v1` -> `registry.example.com`. A tag with
/// no explicit registry domain (the implicit Docker Hub case) normalizes to
/// `docker.io`, matching standard reference resolution.
fn registry_domain_of(tag: &str) -> String {
    let without_tag = tag.split('@').next().unwrap_or(tag);
    let repo_part = without_tag.split(':').next().unwrap_or(without_tag);
    let first_segment = repo_part.split('/').next().unwrap_or(repo_part);
    let looks_like_domain =
        first_segment.contains('.') || first_segment.contains(':') || first_segment == "localhost";
    if looks_like_domain {
        first_segment.to_string()
    } else {
        "docker.io".to_string()
    }
}

pub(crate) fn invalid(message: impl Into<String>) -> MimosaError {
    MimosaError::invalid(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn parses_simple_build() {
        let cwd = PathBuf::from("/work");
        let inv = parse_build_invocation(&argv("docker build -t img:v1 ."), &cwd).unwrap();
        assert_eq!(inv.all_tags, vec!["img:v1"]);
        assert_eq!(inv.dockerfile_path, PathBuf::from("/work/Dockerfile"));
        assert_eq!(
            inv.contexts.get(MAIN_CONTEXT_NAME),
            Some(&ContextLocation::Local(PathBuf::from("/work")))
        );
        assert_eq!(inv.registry_domains, BTreeSet::from(["docker.io".to_string()]));
    }

    #[test]
    fn missing_tag_is_invalid_invocation() {
        let cwd = PathBuf::from("/work");
        let err = parse_build_invocation(&argv("docker build ."), &cwd).unwrap_err();
        assert!(matches!(err, MimosaError::InvalidInvocation(_)));
    }

    #[test]
    fn registry_domain_extraction() {
        assert_eq!(registry_domain_of("img:v1"), "docker.io");
        assert_eq!(registry_domain_of("user/img:v1"), "docker.io");
        assert_eq!(registry_domain_of("registry.example.com/team/app:v1"), "registry.example.com");
        assert_eq!(registry_domain_of("localhost:5000/app:v1"), "localhost:5000");
    }

    #[test]
    fn buildx_build_context_is_absolute() {
        let cwd = PathBuf::from("/work");
        let inv = parse_build_invocation(
            &argv("docker buildx build -t img:v1 --build-context extra=../other ."),
            &cwd,
        )
        .unwrap();
        assert_eq!(
            inv.contexts.get("extra"),
            Some(&ContextLocation::Local(PathBuf::from("/work/../other")))
        );
    }
}
