#![allow(unused)]

//! # contract: interfaces to the systems on either side of a migration
//!
//! The core never talks HTTP or touches export files itself. It depends on
//! three collaborators, each defined here as a trait:
//!
//! - [`SourceReader`]: lists the entities of one family and downloads media
//!   binaries. Pagination, auth and network retries are the implementor's job.
//! - [`DestinationWriter`]: creates and publishes entries and assets, and
//!   waits for uploaded assets to finish processing.
//! - [`MapStore`]: loads and saves identity-map snapshots.
//!
//! ## Mocking & Testing
//! - The traits are annotated for `mockall`, so consumers can generate
//!   deterministic mocks when the `test-export-mocks` feature is on (it is by default).
//!
//! ## Errors
//! - Reader errors are boxed trait objects; the orchestrator treats a failed
//!   listing as fatal for the run.
//! - Writer errors are [`WriteError`]; any of them fails just the one entity.

use async_trait::async_trait;

use mockall::{automock, predicate::*};

use crate::error::{BoxError, MigrateError, WriteError};
use crate::identity_map::{MapKind, Mapping};
use crate::source::{Family, SourceEntity};

/// Identifier assigned by the destination system.
pub type DestinationId = String;

/// A binary asset ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAsset {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: String,
    pub title: String,
    pub description: Option<String>,
}

/// Reads source entities, fully paginated and authenticated.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Return every entity of the given family.
    async fn list_entities(&self, family: Family) -> Result<Vec<SourceEntity>, BoxError>;

    /// Download the binary behind a media URL.
    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, BoxError>;
}

/// Writes entries and assets to the destination.
///
/// Implementors own rate limiting and any retry policy; the orchestrator
/// treats every returned error as a permanent failure of that entity.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DestinationWriter: Send + Sync {
    /// Create an entry of the given content type from a complete `fields` object.
    async fn create_entity(
        &self,
        content_type: &str,
        fields: serde_json::Value,
    ) -> Result<DestinationId, WriteError>;

    /// Publish a previously created entry.
    async fn publish(&self, id: &str) -> Result<(), WriteError>;

    /// Upload a binary and create an asset around it. Processing is started but
    /// not awaited.
    async fn create_asset(&self, asset: NewAsset) -> Result<DestinationId, WriteError>;

    /// Poll until the destination has derived the asset's file metadata.
    /// Fails with [`WriteError::ProcessingTimeout`] after a bounded number of attempts.
    async fn wait_until_processed(&self, id: &str) -> Result<(), WriteError>;

    /// Publish a processed asset.
    async fn publish_asset(&self, id: &str) -> Result<(), WriteError>;
}

/// Durable snapshot storage for identity maps. Each `save` is atomic.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait MapStore: Send + Sync {
    /// `Ok(None)` means nothing was ever saved for this kind.
    fn load(&self, kind: MapKind) -> Result<Option<Mapping>, MigrateError>;

    fn save(&self, kind: MapKind, mapping: &Mapping) -> Result<(), MigrateError>;
}
