//! Content hashing of files, strings, and ordered byte collections, plus
//! the hex/Z85 codec used to represent a [`Fingerprint`].

use std::path::Path;

use derive_more::Display;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace, warn};

use crate::error::{MimosaError, Result};

/// Number of bytes in a [`Fingerprint`]: fixed at 16 so that the hex form
/// is 32 characters and the Z85 form is 20.
pub const DIGEST_BYTES: usize = 16;

/// Lowercase hex representation of the all-zero digest, returned by
/// [`hash_files`] when every input path was unreadable.
pub const ZERO_DIGEST_HEX: &str = "00000000000000000000000000000000";

const _: () = assert!(ZERO_DIGEST_HEX.len() == DIGEST_BYTES * 2);

/// A fixed-width, content-addressed fingerprint.
///
/// Persisted as lowercase hex; also expressible as Z85 for compact
/// transport via environment variables.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Display)]
#[display("{}", self.to_hex())]
pub struct Fingerprint([u8; DIGEST_BYTES]);

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl Fingerprint {
    /// Wrap a raw digest. Used internally once a hash has been computed.
    fn from_bytes(bytes: [u8; DIGEST_BYTES]) -> Self {
        Self(bytes)
    }

    /// The all-zero fingerprint.
    pub const fn zero() -> Self {
        Self([0u8; DIGEST_BYTES])
    }

    /// Hash the contents of an ordered iterator of byte-like fields.
    ///
    /// Fields are concatenated in iteration order with no separator, then
    /// digested. Callers combining variable-length strings are responsible
    /// for any separators they need.
    #[instrument(skip_all, name = "Fingerprint::from_fields")]
    pub fn from_fields(fields: impl IntoIterator<Item = impl AsRef<[u8]>>) -> Self {
        let mut hasher = blake3::Hasher::new();
        let mut bytes = 0usize;
        for field in fields {
            let field = field.as_ref();
            bytes += field.len();
            hasher.update(field);
        }
        let digest = hasher.finalize();
        let mut out = [0u8; DIGEST_BYTES];
        out.copy_from_slice(&digest.as_bytes()[..DIGEST_BYTES]);
        trace!(bytes, "hashed fields");
        Self::from_bytes(out)
    }

    /// Hash a single buffer.
    pub fn from_buffer(buffer: impl AsRef<[u8]>) -> Self {
        Self::from_fields([buffer])
    }

    /// Render as lowercase hex (32 characters).
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// Parse a lowercase hex string into a fingerprint.
    pub fn from_hex(input: &str) -> Result<Self> {
        if input.len() != DIGEST_BYTES * 2 {
            return Err(MimosaError::MalformedEncoding {
                encoding: "hex",
                reason: format!(
                    "expected {} characters, got {}",
                    DIGEST_BYTES * 2,
                    input.len()
                ),
            });
        }
        let bytes = hex::decode(input).map_err(|e| MimosaError::MalformedEncoding {
            encoding: "hex",
            reason: e.to_string(),
        })?;
        let mut out = [0u8; DIGEST_BYTES];
        out.copy_from_slice(&bytes);
        Ok(Self::from_bytes(out))
    }

    /// Render as Z85 (20 characters) for compact transport via environment
    /// variables.
    pub fn to_z85(self) -> String {
        z85::encode(self.0)
    }

    /// Parse a Z85 string into a fingerprint.
    pub fn from_z85(input: &str) -> Result<Self> {
        let bytes = z85::decode(input).map_err(|e| MimosaError::MalformedEncoding {
            encoding: "z85",
            reason: e.to_string(),
        })?;
        if bytes.len() != DIGEST_BYTES {
            return Err(MimosaError::MalformedEncoding {
                encoding: "z85",
                reason: format!("expected {} decoded bytes, got {}", DIGEST_BYTES, bytes.len()),
            });
        }
        let mut out = [0u8; DIGEST_BYTES];
        out.copy_from_slice(&bytes);
        Ok(Self::from_bytes(out))
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Hash an ordered sequence of strings: concatenate, then digest.
///
/// Order matters; two sequences differing only in element order produce
/// different digests. `CanonicalArgs` is already a sorted vector by the
/// time it reaches this function, so ordering noise has been resolved
/// upstream.
pub fn hash_strings(strings: impl IntoIterator<Item = impl AsRef<str>>) -> Fingerprint {
    Fingerprint::from_fields(strings.into_iter().map(|s| s.as_ref().to_string()))
}

/// Hash a finite set of file paths in an order-independent way.
///
/// Each file is digested independently (in parallel, across `workers`
/// threads), the per-file digests are sorted lexicographically, concatenated,
/// and re-digested. The worker count is clamped to at least 1; callers are
/// expected to additionally clamp to `NumCPU - 1`, but this function does
/// not depend on that upper bound for correctness — the result is
/// invariant to worker count either way.
///
/// Returns:
/// - `""` if `paths` is empty.
/// - [`ZERO_DIGEST_HEX`] if every path was unreadable.
/// - Otherwise, the lowercase-hex digest of the readable files' content.
///
/// Individual unreadable paths are silently skipped rather than failing
/// the whole hash.
#[instrument(skip(paths), fields(count = paths.len(), workers))]
pub fn hash_files(paths: &[impl AsRef<Path> + Sync], workers: usize) -> String {
    if paths.is_empty() {
        return String::new();
    }

    let workers = workers.max(1);
    let pool = build_pool(workers);

    let mut digests: Vec<[u8; 32]> = pool.install(|| {
        paths
            .par_iter()
            .filter_map(|path| hash_file(path.as_ref()))
            .collect()
    });

    if digests.is_empty() {
        trace!("every input path was unreadable");
        return ZERO_DIGEST_HEX.to_string();
    }

    digests.sort_unstable();

    let mut hasher = blake3::Hasher::new();
    for digest in &digests {
        hasher.update(digest);
    }
    let combined = hasher.finalize();
    hex::encode(&combined.as_bytes()[..DIGEST_BYTES])
}

fn build_pool(workers: usize) -> ThreadPool {
    ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("mimosa-hash-{i}"))
        .build()
        .unwrap_or_else(|_| ThreadPoolBuilder::new().build().expect("default rayon pool"))
}

fn hash_file(path: &Path) -> Option<[u8; 32]> {
    match std::fs::File::open(path) {
        Ok(file) => {
            let mut reader = std::io::BufReader::new(file);
            let mut hasher = blake3::Hasher::new();
            match std::io::copy(&mut reader, &mut hasher) {
                Ok(bytes) => {
                    trace!(?path, bytes, "hashed file");
                    Some(*hasher.finalize().as_bytes())
                }
                Err(err) => {
                    warn!(?path, %err, "failed to read file, skipping");
                    None
                }
            }
        }
        Err(err) => {
            warn!(?path, %err, "failed to open file, skipping");
            None
        }
    }
}

/// Clamp a desired worker count to `[1, NumCPU - 1]`.
pub fn clamp_worker_count(requested: usize) -> usize {
    let max = num_cpus::get().saturating_sub(1).max(1);
    requested.clamp(1, max)
}
