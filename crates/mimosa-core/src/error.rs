//! Error kinds for the mimosa core.
//!
//! Keeping them as real `thiserror` variants, rather than opaque strings,
//! lets callers (the orchestrator, the CLI) apply the recovery policy
//! mechanically instead of by string-matching.

use std::path::PathBuf;

/// Errors raised by the fingerprinting pipeline and cache store.
#[derive(Debug, thiserror::Error)]
pub enum MimosaError {
    /// Unsupported subcommand, missing tag, missing context, malformed
    /// duration, or malformed reference. Always surfaced; never has side
    /// effects.
    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),

    /// A hex or Z85 value failed to decode: wrong length or an
    /// out-of-alphabet character.
    #[error("malformed {encoding} encoding: {reason}")]
    MalformedEncoding {
        /// Which codec rejected the input (`"hex"` or `"z85"`).
        encoding: &'static str,
        /// Human-readable reason for the rejection.
        reason: String,
    },

    /// A filesystem operation failed outside the per-file, per-entry
    /// recoverable paths: cache directory write path, single-file
    /// context reads, TTL eviction walk.
    #[error("io failure at {path}: {source}")]
    IoFailure {
        /// The path the operation was attempted against.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Network, authentication, or transport failure talking to a
    /// registry. Always surfaced; the orchestrator only treats a
    /// not-found response on the lookup path as a forced miss, never this
    /// variant.
    #[error("registry error: {0}")]
    RegistryError(String),

    /// `retagSameRepo` was asked to move a tag across registries or
    /// repositories.
    #[error("cannot retag across repositories: {from} -> {to}")]
    InvalidRetag {
        /// The source reference.
        from: String,
        /// The destination reference.
        to: String,
    },

    /// `republishIndex` was given an empty descriptor list.
    #[error("cannot republish an index with no manifests")]
    NoManifests,

    /// The external builder exited non-zero; propagated with its exit
    /// code.
    #[error("build command exited with status {0}")]
    BuildFailure(i32),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MimosaError>;

impl MimosaError {
    /// Build an [`MimosaError::IoFailure`] from a path and the OS error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoFailure {
            path: path.into(),
            source,
        }
    }

    /// Build an [`MimosaError::InvalidInvocation`] from a message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInvocation(message.into())
    }
}
