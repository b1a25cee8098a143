//! Fingerprint composer: combine a [`BuildInvocation`]'s
//! canonical arguments, destination registry domains, and the combined file
//! digest of every local build context into one [`Fingerprint`].
//!
//! Assembles a single digest from three independently-computed
//! sub-digests in a fixed order. The sub-digests are joined on a control
//! character before the final hash rather than fed to
//! `Fingerprint::from_fields` positionally, so that two
//! differently-partitioned inputs can never collide by concatenation
//! alone.

use tracing::instrument;

use crate::command::{BuildInvocation, ContextLocation, MAIN_CONTEXT_NAME};
use crate::error::Result;
use crate::fileset;
use crate::hash::{self, Fingerprint};

/// Separates the logical segments (canonical args, domains, combined files
/// digest) before the final hash. Not a valid byte in any of our inputs'
/// normal vocabulary, so it can't be produced by accidental concatenation.
const SEGMENT_SEPARATOR: char = '\u{1e}';

/// Compute the fingerprint for one build invocation.
///
/// Every local context's resolved file list is concatenated into one list
/// before hashing, rather than hashed per context — a local context's
/// *name* is not part of the fingerprint, only its content and the
/// dockerfile/ignore file of the main context.
///
/// `workers` is the caller's requested parallelism for file hashing; it is
/// clamped internally via [`hash::clamp_worker_count`], so callers may pass
/// `num_cpus::get()` directly.
#[instrument(skip(invocation), fields(contexts = invocation.contexts.len()))]
pub fn compute_fingerprint(invocation: &BuildInvocation, workers: usize) -> Result<Fingerprint> {
    let workers = hash::clamp_worker_count(workers);

    let mut all_context_files = Vec::new();
    for (name, location) in &invocation.contexts {
        let ContextLocation::Local(dir) = location else {
            // Remote contexts contribute no files; their identity already
            // lives in `canonical_args` via the raw context value/flag.
            continue;
        };

        let is_main = name == MAIN_CONTEXT_NAME;
        let ignore_file = if is_main {
            invocation.ignore_file_path.clone()
        } else {
            fileset::default_ignore_file_for_context(dir)
        };

        let mut files = fileset::resolve_context_files(dir, ignore_file.as_deref())?;
        if is_main {
            fileset::append_main_context_inputs(
                &mut files,
                &invocation.dockerfile_path,
                invocation.ignore_file_path.as_deref(),
            );
        }
        all_context_files.append(&mut files);
    }

    let files_digest = hash::hash_files(&all_context_files, workers);

    let domains_segment = invocation
        .registry_domains
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(",");

    let parts = [invocation.canonical_args.to_string(), domains_segment, files_digest];
    let combined = parts.join(&SEGMENT_SEPARATOR.to_string());
    Ok(Fingerprint::from_buffer(combined))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::parse_build_invocation;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::PathBuf;

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    fn write(path: &std::path::Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn identical_invocations_produce_identical_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("Dockerfile"), "FROM scratch\n");
        write(&dir.path().join("app.rs"), "fn main() {}");

        let invocation = parse_build_invocation(&argv("docker build -t img:v1 ."), dir.path()).unwrap();
        let a = compute_fingerprint(&invocation, 2).unwrap();
        let b = compute_fingerprint(&invocation, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn content_change_changes_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("Dockerfile"), "FROM scratch\n");
        write(&dir.path().join("app.rs"), "fn main() {}");

        let invocation = parse_build_invocation(&argv("docker build -t img:v1 ."), dir.path()).unwrap();
        let before = compute_fingerprint(&invocation, 2).unwrap();

        write(&dir.path().join("app.rs"), "fn main() { println!(\"hi\"); }");
        let after = compute_fingerprint(&invocation, 2).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn tag_value_itself_does_not_affect_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("Dockerfile"), "FROM scratch\n");

        let a = parse_build_invocation(&argv("docker build -t img:v1 ."), dir.path()).unwrap();
        let b = parse_build_invocation(&argv("docker build -t img:v2 ."), dir.path()).unwrap();

        assert_eq!(
            compute_fingerprint(&a, 2).unwrap(),
            compute_fingerprint(&b, 2).unwrap()
        );
    }

    #[test]
    fn different_destination_domain_changes_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("Dockerfile"), "FROM scratch\n");

        let a = parse_build_invocation(&argv("docker build -t img:v1 ."), dir.path()).unwrap();
        let b =
            parse_build_invocation(&argv("docker build -t registry.example.com/img:v1 ."), dir.path())
                .unwrap();

        assert_ne!(
            compute_fingerprint(&a, 2).unwrap(),
            compute_fingerprint(&b, 2).unwrap()
        );
    }

    #[test]
    fn renaming_an_extra_context_does_not_change_the_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("Dockerfile"), "FROM scratch\n");
        let extra = tempfile::tempdir().unwrap();
        write(&extra.path().join("asset.txt"), "hello");

        let argv_a = [
            "docker".to_string(),
            "build".to_string(),
            "-t".to_string(),
            "img:v1".to_string(),
            "--build-context".to_string(),
            format!("alpha={}", extra.path().display()),
            ".".to_string(),
        ];
        let argv_b = [
            "docker".to_string(),
            "build".to_string(),
            "-t".to_string(),
            "img:v1".to_string(),
            "--build-context".to_string(),
            format!("beta={}", extra.path().display()),
            ".".to_string(),
        ];

        let a = parse_build_invocation(&argv_a, dir.path()).unwrap();
        let b = parse_build_invocation(&argv_b, dir.path()).unwrap();

        assert_eq!(
            compute_fingerprint(&a, 2).unwrap(),
            compute_fingerprint(&b, 2).unwrap(),
            "a context's name must not affect the combined file digest, only its content"
        );
    }

    #[test]
    fn missing_context_propagates_error() {
        let invocation = parse_build_invocation(
            &argv("docker build -t img:v1 ."),
            &PathBuf::from("/does/not/exist"),
        )
        .unwrap();
        assert!(compute_fingerprint(&invocation, 2).is_err());
    }
}
