//! Orchestrator: wires the fingerprinting pipeline, the cache
//! store, and the registry/build collaborators into the state machine
//!
//! ```text
//! START → PARSE → FINGERPRINT → LOOKUP
//!                                  ├── HIT → REPUBLISH → MARK_HIT → END
//!                                  └── MISS → FORWARD_BUILD
//!                                               ├── ok  → SAVE → MARK_MISS → END
//!                                               └── err → PROPAGATE → END(err)
//! ```
//!
//! `RegistryClient` and `BuildRunner` are trait seams so this crate has no
//! concrete dependency on an HTTP client or a subprocess; `mimosa-registry`
//! implements the former, [`SubprocessBuildRunner`] is the default
//! implementation of the latter.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, instrument};

use crate::cache::CacheStore;
use crate::command::{self, BuildInvocation};
use crate::config::Config;
use crate::error::{MimosaError, Result};
use crate::fingerprint;
use crate::hash::Fingerprint;

/// The single build target name used for invocations that don't carry
/// per-target structure of their own (everything but bake — see
/// `BuilderKind::requires_tag_and_context` and the accompanying note in
/// `command::args`). Bake's real per-target tag mapping lives in the bake
/// file, which is out of this system's scope.
pub const SINGLE_TARGET: &str = "default";

/// Registry-side operations the orchestrator needs on the hit and miss
/// paths. Implemented by `mimosa_registry::RegistryClientImpl`.
pub trait RegistryClient {
    /// Whether every tag already recorded for `tags_by_target` has a
    /// corresponding cache tag in its own repository. A lookup-side
    /// not-found is not an error; only transport/auth failures propagate.
    fn all_cache_tags_exist(
        &self,
        tags_by_target: &BTreeMap<String, Vec<String>>,
        fingerprint_hex: &str,
    ) -> Result<bool>;

    /// Retag the cached content onto each of `requested_tags`, using the
    /// recorded history in `tags_by_target` as the retag source.
    fn republish(
        &self,
        tags_by_target: &BTreeMap<String, Vec<String>>,
        requested_tags: &[String],
        fingerprint_hex: &str,
    ) -> Result<()>;

    /// Create the cache-tag anchor for each of `requested_tags` after a
    /// successful miss build.
    fn save_cache_tags(&self, requested_tags: &[String], fingerprint_hex: &str) -> Result<()>;
}

/// Runs the external image builder as an opaque subprocess.
pub trait BuildRunner {
    /// Invoke the builder with `raw_argv`, inheriting stdio, and return its
    /// exit code.
    fn run(&self, raw_argv: &[String]) -> Result<i32>;
}

/// Default [`BuildRunner`]: spawns `raw_argv[0]` with the remaining
/// elements as arguments, stdio inherited from the parent process.
pub struct SubprocessBuildRunner;

impl BuildRunner for SubprocessBuildRunner {
    fn run(&self, raw_argv: &[String]) -> Result<i32> {
        let Some((program, args)) = raw_argv.split_first() else {
            return Err(MimosaError::invalid("empty build command"));
        };
        let status = std::process::Command::new(program)
            .args(args)
            .status()
            .map_err(|e| MimosaError::io(program, e))?;
        Ok(status.code().unwrap_or(1))
    }
}

/// How the invocation was resolved.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Outcome {
    /// The fingerprint was already cached and republished.
    Hit,
    /// No cached entry; the build ran and, on success, was recorded.
    Miss,
}

/// The result of one `remember` invocation.
#[derive(Clone, Debug)]
pub struct RememberResult {
    pub outcome: Outcome,
    pub fingerprint: Fingerprint,
    /// Exit code to surface to the caller: 0 on a hit, the builder's own
    /// exit code on a miss.
    pub exit_code: i32,
}

/// `remember -- <build-command...>`: the cache-aware path. Equivalent to
/// PARSE → FINGERPRINT → LOOKUP → {HIT → REPUBLISH → MARK_HIT, MISS →
/// FORWARD_BUILD → {SAVE → MARK_MISS, PROPAGATE}}.
#[instrument(skip(config, store, registry, builder, raw_argv))]
pub fn run_remember<R: RegistryClient, B: BuildRunner>(
    raw_argv: &[String],
    cwd: &Path,
    config: &Config,
    store: &CacheStore,
    registry: &R,
    builder: &B,
) -> Result<RememberResult> {
    let invocation = command::parse_build_invocation(raw_argv, cwd)?;
    let fp = fingerprint::compute_fingerprint(&invocation, config.workers)?;

    if let Some(entry) = lookup_confirmed_hit(&invocation, &fp, store, registry)? {
        if config.dry_run {
            info!(fingerprint = %fp, "dry-run: would republish cached tags");
        } else {
            registry.republish(&entry, &invocation.all_tags, &fp.to_hex())?;
        }
        info!(fingerprint = %fp, outcome = "hit");
        return Ok(RememberResult {
            outcome: Outcome::Hit,
            fingerprint: fp,
            exit_code: 0,
        });
    }

    let exit_code = builder.run(raw_argv)?;
    if exit_code != 0 {
        return Err(MimosaError::BuildFailure(exit_code));
    }

    if config.dry_run {
        info!(fingerprint = %fp, "dry-run: would save cache entry");
    } else {
        save_build_result(&invocation, &fp, store, registry)?;
    }

    info!(fingerprint = %fp, outcome = "miss");
    Ok(RememberResult {
        outcome: Outcome::Miss,
        fingerprint: fp,
        exit_code: 0,
    })
}

/// `forget -- <build-command...>`: always forwards to the builder without
/// consulting the cache, then records the result so subsequent `remember`
/// calls can hit. Always returns exit code 0 regardless of the builder's
/// own outcome.
#[instrument(skip(config, store, registry, builder, raw_argv))]
pub fn run_forget<R: RegistryClient, B: BuildRunner>(
    raw_argv: &[String],
    cwd: &Path,
    config: &Config,
    store: &CacheStore,
    registry: &R,
    builder: &B,
) -> Result<()> {
    let invocation = command::parse_build_invocation(raw_argv, cwd)?;
    let fp = fingerprint::compute_fingerprint(&invocation, config.workers)?;

    let exit_code = builder.run(raw_argv)?;
    if exit_code == 0 {
        if config.dry_run {
            info!(fingerprint = %fp, "dry-run: would save cache entry");
        } else {
            save_build_result(&invocation, &fp, store, registry)?;
        }
    }
    Ok(())
}

fn lookup_confirmed_hit<R: RegistryClient>(
    invocation: &BuildInvocation,
    fp: &Fingerprint,
    store: &CacheStore,
    registry: &R,
) -> Result<Option<BTreeMap<String, Vec<String>>>> {
    if !store.exists(*fp) {
        return Ok(None);
    }
    let Some(entry) = store.load(*fp)? else {
        return Ok(None);
    };
    if entry.tags_by_target.is_empty() || invocation.all_tags.is_empty() {
        return Ok(None);
    }
    if !registry.all_cache_tags_exist(&entry.tags_by_target, &fp.to_hex())? {
        return Ok(None);
    }
    Ok(Some(entry.tags_by_target))
}

fn save_build_result<R: RegistryClient>(
    invocation: &BuildInvocation,
    fp: &Fingerprint,
    store: &CacheStore,
    registry: &R,
) -> Result<()> {
    if invocation.all_tags.is_empty() {
        return Ok(());
    }
    let mut new_tags_by_target = BTreeMap::new();
    new_tags_by_target.insert(SINGLE_TARGET.to_string(), invocation.all_tags.clone());

    registry.save_cache_tags(&invocation.all_tags, &fp.to_hex())?;
    store.save(*fp, &new_tags_by_target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::fs;

    struct FakeRegistry {
        cache_tags_exist: bool,
        republish_calls: RefCell<Vec<(Vec<String>, String)>>,
        save_calls: RefCell<Vec<(Vec<String>, String)>>,
    }

    impl RegistryClient for FakeRegistry {
        fn all_cache_tags_exist(
            &self,
            _tags_by_target: &BTreeMap<String, Vec<String>>,
            _fingerprint_hex: &str,
        ) -> Result<bool> {
            Ok(self.cache_tags_exist)
        }

        fn republish(
            &self,
            _tags_by_target: &BTreeMap<String, Vec<String>>,
            requested_tags: &[String],
            fingerprint_hex: &str,
        ) -> Result<()> {
            self.republish_calls
                .borrow_mut()
                .push((requested_tags.to_vec(), fingerprint_hex.to_string()));
            Ok(())
        }

        fn save_cache_tags(&self, requested_tags: &[String], fingerprint_hex: &str) -> Result<()> {
            self.save_calls
                .borrow_mut()
                .push((requested_tags.to_vec(), fingerprint_hex.to_string()));
            Ok(())
        }
    }

    struct FakeBuilder {
        exit_code: i32,
        invocations: RefCell<usize>,
    }

    impl BuildRunner for FakeBuilder {
        fn run(&self, _raw_argv: &[String]) -> Result<i32> {
            *self.invocations.borrow_mut() += 1;
            Ok(self.exit_code)
        }
    }

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    fn test_config(cache_dir: &Path, dry_run: bool) -> Config {
        Config {
            cache_dir: cache_dir.to_path_buf(),
            dry_run,
            overlay_env: None,
            workers: 1,
        }
    }

    #[test]
    fn miss_forwards_build_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();

        let config = test_config(dir.path(), false);
        let store = CacheStore::new(dir.path().join(".cache"), None);
        let registry = FakeRegistry {
            cache_tags_exist: true,
            republish_calls: RefCell::new(Vec::new()),
            save_calls: RefCell::new(Vec::new()),
        };
        let builder = FakeBuilder { exit_code: 0, invocations: RefCell::new(0) };

        let result = run_remember(
            &argv("docker build -t img:v1 ."),
            dir.path(),
            &config,
            &store,
            &registry,
            &builder,
        )
        .unwrap();

        assert_eq!(result.outcome, Outcome::Miss);
        assert_eq!(*builder.invocations.borrow(), 1);
        assert_eq!(registry.save_calls.borrow().len(), 1);
    }

    #[test]
    fn repeat_invocation_is_a_confirmed_hit() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();

        let config = test_config(dir.path(), false);
        let store = CacheStore::new(dir.path().join(".cache"), None);
        let registry = FakeRegistry {
            cache_tags_exist: true,
            republish_calls: RefCell::new(Vec::new()),
            save_calls: RefCell::new(Vec::new()),
        };
        let builder = FakeBuilder { exit_code: 0, invocations: RefCell::new(0) };

        run_remember(
            &argv("docker build -t img:v1 ."),
            dir.path(),
            &config,
            &store,
            &registry,
            &builder,
        )
        .unwrap();

        let result = run_remember(
            &argv("docker build -t img:v1 ."),
            dir.path(),
            &config,
            &store,
            &registry,
            &builder,
        )
        .unwrap();

        assert_eq!(result.outcome, Outcome::Hit);
        assert_eq!(*builder.invocations.borrow(), 1, "builder must not run again on a hit");
        assert_eq!(registry.republish_calls.borrow().len(), 1);
    }

    #[test]
    fn missing_cache_tag_anchor_forces_miss() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();

        let config = test_config(dir.path(), false);
        let store = CacheStore::new(dir.path().join(".cache"), None);
        let registry = FakeRegistry {
            cache_tags_exist: false,
            republish_calls: RefCell::new(Vec::new()),
            save_calls: RefCell::new(Vec::new()),
        };
        let builder = FakeBuilder { exit_code: 0, invocations: RefCell::new(0) };

        run_remember(&argv("docker build -t img:v1 ."), dir.path(), &config, &store, &registry, &builder)
            .unwrap();
        let result = run_remember(
            &argv("docker build -t img:v1 ."),
            dir.path(),
            &config,
            &store,
            &registry,
            &builder,
        )
        .unwrap();

        assert_eq!(result.outcome, Outcome::Miss);
        assert_eq!(*builder.invocations.borrow(), 2);
    }

    #[test]
    fn dry_run_skips_save_but_still_reports_miss() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();

        let config = test_config(dir.path(), true);
        let store = CacheStore::new(dir.path().join(".cache"), None);
        let registry = FakeRegistry {
            cache_tags_exist: true,
            republish_calls: RefCell::new(Vec::new()),
            save_calls: RefCell::new(Vec::new()),
        };
        let builder = FakeBuilder { exit_code: 0, invocations: RefCell::new(0) };

        let result = run_remember(
            &argv("docker build -t img:v1 ."),
            dir.path(),
            &config,
            &store,
            &registry,
            &builder,
        )
        .unwrap();

        assert_eq!(result.outcome, Outcome::Miss);
        assert!(registry.save_calls.borrow().is_empty());
        assert!(!store.exists(result.fingerprint));
    }

    #[test]
    fn build_failure_propagates_as_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();

        let config = test_config(dir.path(), false);
        let store = CacheStore::new(dir.path().join(".cache"), None);
        let registry = FakeRegistry {
            cache_tags_exist: true,
            republish_calls: RefCell::new(Vec::new()),
            save_calls: RefCell::new(Vec::new()),
        };
        let builder = FakeBuilder { exit_code: 17, invocations: RefCell::new(0) };

        let err = run_remember(
            &argv("docker build -t img:v1 ."),
            dir.path(),
            &config,
            &store,
            &registry,
            &builder,
        )
        .unwrap_err();
        assert!(matches!(err, MimosaError::BuildFailure(17)));
    }
}
