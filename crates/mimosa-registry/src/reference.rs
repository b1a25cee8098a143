//! Parsed OCI image references and the cache-tag naming scheme.

use std::fmt;

use oci_distribution::Reference as RawReference;

use mimosa_core::{MimosaError, Result};

/// Literal prefix on every cache tag this crate creates.
pub const CACHE_TAG_PREFIX: &str = "mimosa-content-hash-";

/// A parsed `registry/repository[:tag]` reference, thin enough to wrap
/// `oci_distribution::Reference` without leaking its error type past this
/// module's boundary.
#[derive(Clone, Debug)]
pub struct Reference(RawReference);

impl Reference {
    /// Parse a full reference string such as `registry.example.com/team/app:v1`.
    pub fn parse(raw: &str) -> Result<Self> {
        raw.parse::<RawReference>()
            .map(Self)
            .map_err(|err| MimosaError::invalid(format!("malformed image reference {raw:?}: {err}")))
    }

    pub fn registry(&self) -> &str {
        self.0.registry()
    }

    pub fn repository(&self) -> &str {
        self.0.repository()
    }

    pub fn tag(&self) -> Option<&str> {
        self.0.tag()
    }

    /// Whether `self` and `other` address the same registry and
    /// repository, differing only (at most) in tag.
    pub fn same_repo(&self, other: &Self) -> bool {
        self.registry() == other.registry() && self.repository() == other.repository()
    }

    /// The cache-tag reference for this repository at `fingerprint_hex`:
    /// same registry and repository, tag replaced by the literal
    /// `mimosa-content-hash-<fingerprint>` scheme.
    pub fn cache_tag(&self, fingerprint_hex: &str) -> Result<Self> {
        let tag = format!("{CACHE_TAG_PREFIX}{fingerprint_hex}");
        Self::parse(&format!("{}/{}:{tag}", self.registry(), self.repository()))
    }

    pub fn as_raw(&self) -> &RawReference {
        &self.0
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag() {
            Some(tag) => write!(f, "{}/{}:{tag}", self.registry(), self.repository()),
            None => write!(f, "{}/{}", self.registry(), self.repository()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_registry_repo_tag() {
        let r = Reference::parse("registry.example.com/team/app:v1").unwrap();
        assert_eq!(r.registry(), "registry.example.com");
        assert_eq!(r.repository(), "team/app");
        assert_eq!(r.tag(), Some("v1"));
    }

    #[test]
    fn same_repo_ignores_tag() {
        let a = Reference::parse("registry.example.com/team/app:v1").unwrap();
        let b = Reference::parse("registry.example.com/team/app:v2").unwrap();
        assert!(a.same_repo(&b));
    }

    #[test]
    fn same_repo_false_across_repositories() {
        let a = Reference::parse("registry.example.com/team/app:v1").unwrap();
        let b = Reference::parse("registry.example.com/team/other:v1").unwrap();
        assert!(!a.same_repo(&b));
    }

    #[test]
    fn cache_tag_uses_content_hash_prefix() {
        let r = Reference::parse("registry.example.com/team/app:v1").unwrap();
        let cache = r.cache_tag("deadbeef").unwrap();
        assert_eq!(cache.registry(), "registry.example.com");
        assert_eq!(cache.repository(), "team/app");
        assert_eq!(cache.tag(), Some("mimosa-content-hash-deadbeef"));
    }

    #[test]
    fn malformed_reference_is_invalid_invocation() {
        let err = Reference::parse("not a valid reference!!!").unwrap_err();
        assert!(matches!(err, MimosaError::InvalidInvocation(_)));
    }
}
