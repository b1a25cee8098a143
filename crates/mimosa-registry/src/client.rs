//! Low-level OCI Distribution Spec operations: manifest existence, same-repo
//! retagging, and index republishing. Talks HTTPS via `oci-distribution`;
//! the cache-tag lifecycle built on top of these three primitives lives in
//! [`crate::cache_tag`].

use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::{OciDescriptor, OciImageIndex};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client as RawClient, errors::OciDistributionError};
use tap::Pipe;
use tracing::{debug, instrument, warn};

use mimosa_core::{MimosaError, Result};

use crate::reference::Reference;

/// OCI media type for a v2 image index manifest list.
const INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
const OCI_MANIFEST_SCHEMA_VERSION: u8 = 2;

/// Authenticated client for the registry's three primitive operations:
/// `tagExists`, `retagSameRepo`, and `republishIndex`.
///
/// Holds its own Tokio runtime so the [`mimosa_core::orchestrator::RegistryClient`]
/// impl in [`crate::cache_tag`] can present a synchronous interface to the
/// orchestrator, which has no async dependency of its own.
pub struct Client {
    inner: RawClient,
    runtime: tokio::runtime::Runtime,
}

impl Client {
    /// Build a client talking plain HTTPS, authenticated per-call via an
    /// external credential chain (environment-provided bearer token, falling
    /// back to anonymous pull/push).
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| MimosaError::RegistryError(format!("failed to start registry runtime: {err}")))?;
        let inner = ClientConfig { protocol: ClientProtocol::Https, ..Default::default() }.pipe(RawClient::new);
        Ok(Self { inner, runtime })
    }

    fn auth_for(&self, reference: &Reference) -> RegistryAuth {
        resolve_auth(reference.registry())
    }

    /// Drive an async future to completion on this client's own runtime.
    /// Lets [`crate::cache_tag`] fan out concurrent retags while presenting
    /// a synchronous interface to the orchestrator.
    pub(crate) fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    /// `tagExists`: HEAD the manifest, treating a not-found response as
    /// `Ok(false)` and any other transport/auth failure as a propagated
    /// [`MimosaError::RegistryError`].
    #[instrument(skip(self))]
    pub fn tag_exists(&self, reference: &Reference) -> Result<bool> {
        self.runtime.block_on(self.tag_exists_async(reference))
    }

    pub(crate) async fn tag_exists_async(&self, reference: &Reference) -> Result<bool> {
        let auth = self.auth_for(reference);
        match self.inner.fetch_manifest_digest(reference.as_raw(), &auth).await {
            Ok(_digest) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(registry_error("fetch manifest digest", reference, err)),
        }
    }

    /// `retagSameRepo`: fetch `from`'s manifest and push it again under
    /// `to`'s tag, without re-uploading any blob. Fails with
    /// [`MimosaError::InvalidRetag`] if `from` and `to` don't share a
    /// registry and repository.
    #[instrument(skip(self))]
    pub fn retag_same_repo(&self, from: &Reference, to: &Reference) -> Result<()> {
        self.runtime.block_on(self.retag_same_repo_async(from, to))
    }

    pub(crate) async fn retag_same_repo_async(&self, from: &Reference, to: &Reference) -> Result<()> {
        if !from.same_repo(to) {
            return Err(MimosaError::InvalidRetag { from: from.to_string(), to: to.to_string() });
        }

        let auth = self.auth_for(from);
        let (manifest, media_type) = self
            .inner
            .pull_manifest_raw(from.as_raw(), &auth, &[])
            .await
            .map_err(|err| registry_error("pull manifest", from, err))?;

        self.inner
            .push_manifest_raw(to.as_raw(), manifest, media_type.parse().unwrap_or_default(), &auth)
            .await
            .map_err(|err| registry_error("push manifest", to, err))?;

        debug!(%from, %to, "retagged within the same repository");
        Ok(())
    }

    /// `republishIndex`: build a fresh OCI image index appending
    /// `descriptors` (preserving their platform annotations) and publish it
    /// under `repo:tag`.
    #[instrument(skip(self, descriptors))]
    pub fn republish_index(&self, repo: &Reference, tag: &str, descriptors: Vec<OciDescriptor>) -> Result<()> {
        self.runtime.block_on(self.republish_index_async(repo, tag, descriptors))
    }

    pub(crate) async fn republish_index_async(
        &self,
        repo: &Reference,
        tag: &str,
        descriptors: Vec<OciDescriptor>,
    ) -> Result<()> {
        if descriptors.is_empty() {
            return Err(MimosaError::NoManifests);
        }

        let destination = Reference::parse(&format!("{}/{}:{tag}", repo.registry(), repo.repository()))?;
        let index = OciImageIndex {
            schema_version: OCI_MANIFEST_SCHEMA_VERSION,
            media_type: Some(INDEX_MEDIA_TYPE.to_string()),
            manifests: descriptors,
            annotations: None,
        };

        let auth = self.auth_for(&destination);
        let body = serde_json::to_vec(&index)
            .map_err(|err| MimosaError::RegistryError(format!("encode image index: {err}")))?;
        self.inner
            .push_manifest_raw(destination.as_raw(), body, INDEX_MEDIA_TYPE.parse().unwrap_or_default(), &auth)
            .await
            .map_err(|err| registry_error("push index", &destination, err))?;
        Ok(())
    }
}

/// Resolve credentials for `registry` from the environment. A real
/// deployment layers in a cloud-provider keychain and provider-specific
/// helpers ahead of this; this crate only implements the final, simplest
/// link in that chain (see DESIGN.md).
fn resolve_auth(registry: &str) -> RegistryAuth {
    let env_key = format!("MIMOSA_REGISTRY_TOKEN_{}", sanitize_env_key(registry));
    if let Ok(token) = std::env::var(&env_key) {
        return RegistryAuth::Basic(String::new(), token);
    }
    if let Ok(token) = std::env::var("MIMOSA_REGISTRY_TOKEN") {
        return RegistryAuth::Basic(String::new(), token);
    }
    RegistryAuth::Anonymous
}

fn sanitize_env_key(registry: &str) -> String {
    registry
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

fn is_not_found(err: &OciDistributionError) -> bool {
    let message = err.to_string();
    message.contains("404") || message.contains("MANIFEST_UNKNOWN") || message.contains("NAME_UNKNOWN")
}

fn registry_error(operation: &str, reference: &Reference, err: OciDistributionError) -> MimosaError {
    warn!(%reference, operation, %err, "registry operation failed");
    MimosaError::RegistryError(format!("{operation} for {reference}: {err}"))
}

/// Build the manifest descriptor for an already-published manifest, used
/// when assembling a [`Client::republish_index`] request from previously
/// fetched per-platform manifests.
pub fn descriptor_for(manifest_json: &[u8], digest: String, media_type: &str) -> OciDescriptor {
    OciDescriptor {
        media_type: media_type.to_string(),
        digest,
        size: manifest_json.len() as i64,
        ..Default::default()
    }
}
