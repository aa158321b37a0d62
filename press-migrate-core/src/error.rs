use std::path::PathBuf;
use thiserror::Error;

use crate::source::Family;

/// Error type used at collaborator boundaries (readers, transports).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Run-level failures. Any of these aborts the run; per-entity problems never
/// surface here, they are counted in [`crate::migrate::FamilyStats`].
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("asset map not found in {0}; run the asset migration first")]
    MissingAssetMap(PathBuf),

    #[error("failed to read {family} from source: {source}")]
    SourceRead {
        family: Family,
        #[source]
        source: BoxError,
    },

    #[error("failed to persist identity map to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("identity map at {path} is not valid JSON: {source}")]
    MapCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures raised by a [`crate::contract::DestinationWriter`].
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("asset {asset_id} still processing after {attempts} attempts")]
    ProcessingTimeout { asset_id: String, attempts: u32 },

    #[error("destination rejected request: {0}")]
    Rejected(String),

    #[error("transport failure: {0}")]
    Transport(#[source] BoxError),
}
