//! Fileset resolver: expand a build context path + optional
//! ignore-file path into the deterministic, absolute file list that
//! contributes to a fingerprint.
//!
//! Directory walking uses `walkdir`; ignore-pattern matching (a
//! well-specified external grammar, out of this module's own scope) is
//! delegated to the `ignore` crate's `gitignore` module.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{instrument, trace, warn};
use walkdir::WalkDir;

use crate::error::{MimosaError, Result};

/// URL-style prefixes that mark a context as remote: remote
/// contexts contribute nothing to the fileset, since their content is
/// addressed by the URL itself, already encoded in `CanonicalArgs`.
pub const REMOTE_PREFIXES: &[&str] = &["https://", "docker-image://", "oci-layout://"];

/// Whether a context's location string refers to a remote source rather
/// than a local path.
pub fn is_remote_context(location: &str) -> bool {
    REMOTE_PREFIXES.iter().any(|prefix| location.starts_with(prefix))
}

/// Resolve the file list for one local build context.
///
/// Walks `context_dir` depth-first. Directories themselves do not
/// contribute. If `ignore_file` is given, it is parsed as a gitignore-style
/// pattern file (including re-inclusion via a leading `!`) whose patterns
/// are evaluated relative to `context_dir`'s root, matching container
/// ignore-file semantics regardless of where the ignore file itself lives
/// on disk. Paths are returned absolute; their order is unspecified.
///
/// Returns [`MimosaError::InvalidInvocation`] if `context_dir` does not
/// exist or is not a directory — the composer aborts fingerprinting on this
/// error rather than silently treating the context as empty.
#[instrument(skip_all, fields(context = %context_dir.display(), ignore_file = ?ignore_file))]
pub fn resolve_context_files(
    context_dir: &Path,
    ignore_file: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    let metadata = std::fs::metadata(context_dir)
        .map_err(|_| MimosaError::invalid(format!("build context not found: {}", context_dir.display())))?;
    if !metadata.is_dir() {
        return Err(MimosaError::invalid(format!(
            "build context is not a directory: {}",
            context_dir.display()
        )));
    }

    let matcher = build_matcher(context_dir, ignore_file);

    let mut files = Vec::new();
    for entry in WalkDir::new(context_dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%err, "failed to walk context entry, skipping");
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }
        if !entry.file_type().is_file() {
            // Symlinks, sockets, etc. don't contribute to the fingerprint.
            continue;
        }

        let relative = match entry.path().strip_prefix(context_dir) {
            Ok(r) => r,
            Err(_) => continue,
        };

        let ignored = matcher
            .as_ref()
            .map(|m| m.matched(relative, false).is_ignore())
            .unwrap_or(false);

        if ignored {
            trace!(path = %entry.path().display(), "excluded by ignore pattern");
            continue;
        }

        files.push(entry.path().to_path_buf());
    }

    Ok(files)
}

fn build_matcher(context_dir: &Path, ignore_file: Option<&Path>) -> Option<Gitignore> {
    let ignore_file = ignore_file?;
    let mut builder = GitignoreBuilder::new(context_dir);
    if let Some(err) = builder.add(ignore_file) {
        warn!(%err, path = %ignore_file.display(), "failed to read ignore file, treating as empty");
        return None;
    }
    match builder.build() {
        Ok(gitignore) => Some(gitignore),
        Err(err) => {
            warn!(%err, "failed to compile ignore patterns, treating as empty");
            None
        }
    }
}

/// For the *main* build context, the dockerfile and (if present) the
/// ignore file themselves must contribute to the fingerprint, so that
/// editing either invalidates the cache.
pub fn append_main_context_inputs(
    files: &mut Vec<PathBuf>,
    dockerfile: &Path,
    ignore_file: Option<&Path>,
) {
    files.push(dockerfile.to_path_buf());
    if let Some(ignore_file) = ignore_file {
        files.push(ignore_file.to_path_buf());
    }
}

/// For an *additional* (non-main) local context, the ignore file is
/// `<context>/.dockerignore` if it exists, otherwise none.
pub fn default_ignore_file_for_context(context_dir: &Path) -> Option<PathBuf> {
    let candidate = context_dir.join(".dockerignore");
    candidate.is_file().then_some(candidate)
}
