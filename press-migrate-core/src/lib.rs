#![doc = "press-migrate-core: core logic library for press-migrate."]

//! This crate holds everything that decides *what* a migration writes:
//! the HTML to rich-text transformer, the identity maps that make runs
//! resumable, the ordering policy and the orchestrator tying them together.
//! Talking to the actual source and destination systems is left to the
//! implementors of the traits in [`contract`].
//!
//! # Usage
//! Build a [`migrate::Migrator`] from a reader, a writer, a [`contract::MapStore`]
//! and a [`config::MigrateConfig`], then call [`migrate::Migrator::run`].

pub mod config;
pub mod contract;
pub mod error;
pub mod fields;
pub mod identity_map;
pub mod migrate;
pub mod sanitize;
pub mod sequencer;
pub mod source;
pub mod transform;

pub use error::{BoxError, MigrateError, WriteError};
pub use identity_map::{IdentityMap, JsonMapStore, MapKind};
pub use migrate::{FamilyStats, MigrationReport, Migrator, Phase};
pub use source::{Family, SourceEntity, SourceId};
pub use transform::{Document, TransformOutput, Transformer};
