//! Cache-tag lifecycle: the save and lookup fan-out described for the
//! registry client, built on top of [`crate::client::Client`]'s async
//! primitives, driven from one call to the client's runtime per trait
//! method so concurrent tags never nest a `block_on` inside another. This
//! is what implements [`mimosa_core::orchestrator::RegistryClient`] for the
//! rest of the crate.

use std::collections::BTreeMap;

use futures::future::join_all;
use tracing::instrument;

use mimosa_core::orchestrator::RegistryClient;
use mimosa_core::{MimosaError, Result};

use crate::client::Client;
use crate::reference::Reference;

/// Wires [`Client`] into the orchestrator's [`RegistryClient`] seam.
pub struct RegistryClientImpl {
    client: Client,
}

impl RegistryClientImpl {
    pub fn new() -> Result<Self> {
        Ok(Self { client: Client::new()? })
    }
}

impl RegistryClient for RegistryClientImpl {
    #[instrument(skip(self, tags_by_target))]
    fn all_cache_tags_exist(
        &self,
        tags_by_target: &BTreeMap<String, Vec<String>>,
        fingerprint_hex: &str,
    ) -> Result<bool> {
        let all_tags: Vec<&String> = tags_by_target.values().flatten().collect();
        let checks: Vec<Result<bool>> = self.client.block_on(join_all(
            all_tags.iter().map(|tag| check_cache_tag_exists(&self.client, tag, fingerprint_hex)),
        ));

        for check in checks {
            if !check? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    #[instrument(skip(self, tags_by_target))]
    fn republish(
        &self,
        tags_by_target: &BTreeMap<String, Vec<String>>,
        requested_tags: &[String],
        fingerprint_hex: &str,
    ) -> Result<()> {
        let source_tags: Vec<&String> = tags_by_target.values().flatten().collect();
        if source_tags.is_empty() {
            return Err(MimosaError::invalid("no recorded source tag to republish from"));
        }

        let results: Vec<Result<()>> = self.client.block_on(join_all(requested_tags.iter().map(
            |tag| retag_from_matching_repo(&self.client, &source_tags, tag, fingerprint_hex),
        )));
        combine(results)
    }

    #[instrument(skip(self, requested_tags))]
    fn save_cache_tags(&self, requested_tags: &[String], fingerprint_hex: &str) -> Result<()> {
        let results: Vec<Result<()>> = self.client.block_on(join_all(
            requested_tags.iter().map(|tag| save_cache_anchor(&self.client, tag, fingerprint_hex)),
        ));
        combine(results)
    }
}

async fn check_cache_tag_exists(client: &Client, tag: &str, fingerprint_hex: &str) -> Result<bool> {
    let reference = Reference::parse(tag)?;
    let cache_tag = reference.cache_tag(fingerprint_hex)?;
    client.tag_exists_async(&cache_tag).await
}

/// Pick whichever `source_tags` entry shares `destination`'s registry and
/// repository. `requested_tags` can span multiple repositories, and
/// [`Client::retag_same_repo_async`] hard-requires its two references to
/// already be in the same one, so a single global source tag cannot serve
/// every destination.
fn select_source_for(source_tags: &[&String], destination: &Reference) -> Result<Reference> {
    source_tags
        .iter()
        .filter_map(|tag| Reference::parse(tag).ok())
        .find(|source| source.same_repo(destination))
        .ok_or_else(|| {
            MimosaError::invalid(format!(
                "no recorded source tag in the same repository as {destination}"
            ))
        })
}

async fn retag_from_matching_repo(
    client: &Client,
    source_tags: &[&String],
    destination_tag: &str,
    fingerprint_hex: &str,
) -> Result<()> {
    let destination = Reference::parse(destination_tag)?;
    let source = select_source_for(source_tags, &destination)?;
    let source_cache_tag = source.cache_tag(fingerprint_hex)?;

    client.retag_same_repo_async(&source_cache_tag, &destination).await
}

async fn save_cache_anchor(client: &Client, tag: &str, fingerprint_hex: &str) -> Result<()> {
    let reference = Reference::parse(tag)?;
    let cache_tag = reference.cache_tag(fingerprint_hex)?;
    client.retag_same_repo_async(&reference, &cache_tag).await
}

/// Fold a batch of per-tag results into one: every failure accumulates, so
/// a single tag failing to retag doesn't hide failures on the others.
fn combine(results: Vec<Result<()>>) -> Result<()> {
    let errors: Vec<String> = results.into_iter().filter_map(|r| r.err()).map(|err| err.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(MimosaError::RegistryError(errors.join("; ")))
    }
}
