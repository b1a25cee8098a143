//! Registry collaborator for `mimosa`: OCI Distribution Spec plumbing
//! (manifest existence, same-repository retag, index republishing) plus the
//! cache-tag lifecycle built on top of it. Implements
//! `mimosa_core::orchestrator::RegistryClient` so the core crate never
//! depends on an HTTP client directly.

pub mod cache_tag;
pub mod client;
pub mod reference;

pub use cache_tag::RegistryClientImpl;
pub use client::Client;
pub use reference::Reference;
