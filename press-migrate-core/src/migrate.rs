//! Migration orchestrator: walks the source families in dependency order and
//! writes them to the destination in resumable batches.
//!
//! # Per entity
//! 1. Already in the identity map → counted as skipped, nothing else happens.
//! 2. Destination fields are built (plain-text fields sanitized, references
//!    looked up, the HTML body run through the transformer).
//! 3. The entry (or asset) is created and published.
//! 4. Only on success is `(family, source_id) -> destination_id` committed.
//!
//! A failing entity is counted, logged with its source id and skipped over;
//! it never aborts its batch or its family.
//!
//! # Batches
//! Work runs in fixed-size batches. Entities inside a batch are driven
//! concurrently on the current task; batches run strictly one after another.
//! After every batch the identity map is saved, so a crash loses at most the
//! batch in flight. The map is only mutated between batches, once all of a
//! batch's writes have finished.
//!
//! # Errors
//! Only run-level problems surface as [`MigrateError`]: a missing asset map
//! when content is migrated, a failed source listing, or a failed save.
//!
//! # Navigation
//! - Main entrypoint: [`Migrator::run`]
//! - Per-family entrypoint: [`Migrator::migrate_family`]

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MigrateConfig;
use crate::contract::{DestinationId, DestinationWriter, MapStore, NewAsset, SourceReader};
use crate::error::{BoxError, MigrateError};
use crate::fields;
use crate::identity_map::{IdentityMap, MapKind};
use crate::sanitize::{plain_text, plain_text_opt};
use crate::sequencer;
use crate::source::{Family, SourceEntity, SourceId};

/// Which part of a migration to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Media only; produces the asset map.
    Assets,
    /// Entry families only; requires a persisted asset map.
    Content,
    /// Assets, then content.
    All,
}

impl Phase {
    fn includes_assets(self) -> bool {
        matches!(self, Phase::Assets | Phase::All)
    }

    fn includes_content(self) -> bool {
        matches!(self, Phase::Content | Phase::All)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityFailure {
    pub source_id: SourceId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityWarnings {
    pub source_id: SourceId,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilyStats {
    pub family: Family,
    pub total: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<EntityFailure>,
    pub warnings: Vec<EntityWarnings>,
}

impl FamilyStats {
    fn new(family: Family, total: usize) -> Self {
        Self {
            family,
            total,
            migrated: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationReport {
    pub run_id: String,
    pub families: Vec<FamilyStats>,
}

impl MigrationReport {
    pub fn family(&self, family: Family) -> Option<&FamilyStats> {
        self.families.iter().find(|s| s.family == family)
    }
}

enum Outcome {
    Migrated {
        source_id: SourceId,
        destination_id: DestinationId,
        warnings: Vec<String>,
    },
    Failed {
        source_id: SourceId,
        message: String,
    },
}

/// Runs migrations against one reader, one writer and one map store.
pub struct Migrator<'a, R, W, M> {
    reader: &'a R,
    writer: &'a W,
    store: &'a M,
    config: &'a MigrateConfig,
}

impl<'a, R, W, M> Migrator<'a, R, W, M>
where
    R: SourceReader,
    W: DestinationWriter,
    M: MapStore,
{
    pub fn new(reader: &'a R, writer: &'a W, store: &'a M, config: &'a MigrateConfig) -> Self {
        Self {
            reader,
            writer,
            store,
            config,
        }
    }

    /// Loads persisted maps, migrates the requested phase family by family and
    /// returns per-family statistics.
    pub async fn run(&self, phase: Phase) -> Result<MigrationReport, MigrateError> {
        let run_id = Uuid::new_v4().to_string();
        info!(%run_id, ?phase, "[MIGRATE] Starting migration run");

        let assets = self.store.load(MapKind::Assets)?;
        let entries = self.store.load(MapKind::Entries)?;
        if phase == Phase::Content && assets.is_none() {
            error!(state_dir = %self.config.state_dir.display(), "[MIGRATE][ERROR] No asset map, refusing to migrate content");
            return Err(MigrateError::MissingAssetMap(self.config.state_dir.clone()));
        }
        let mut maps = IdentityMap::from_parts(assets.unwrap_or_default(), entries.unwrap_or_default());

        let mut families = Vec::new();
        if phase.includes_assets() {
            families.push(self.migrate_source_family(Family::Media, &mut maps).await?);
        }
        if phase.includes_content() {
            for family in sequencer::entry_family_order() {
                families.push(self.migrate_source_family(*family, &mut maps).await?);
            }
        }

        for stats in &families {
            info!(
                %run_id,
                family = %stats.family,
                total = stats.total,
                migrated = stats.migrated,
                skipped = stats.skipped,
                failed = stats.failed,
                "[MIGRATE] Family summary"
            );
        }
        Ok(MigrationReport { run_id, families })
    }

    async fn migrate_source_family(
        &self,
        family: Family,
        maps: &mut IdentityMap,
    ) -> Result<FamilyStats, MigrateError> {
        info!(%family, "[MIGRATE] Listing source entities");
        let entities = self.reader.list_entities(family).await.map_err(|source| {
            error!(%family, error = %source, "[MIGRATE][ERROR] Source listing failed");
            MigrateError::SourceRead { family, source }
        })?;
        self.migrate_family(family, entities, maps).await
    }

    /// Migrates one family's snapshot, committing successes into `maps` and
    /// persisting after every batch.
    pub async fn migrate_family(
        &self,
        family: Family,
        entities: Vec<SourceEntity>,
        maps: &mut IdentityMap,
    ) -> Result<FamilyStats, MigrateError> {
        let kind = MapKind::for_family(family);
        let mut stats = FamilyStats::new(family, entities.len());

        let (done, pending): (Vec<_>, Vec<_>) =
            entities.into_iter().partition(|e| maps.contains(family, e.id));
        stats.skipped = done.len();
        if stats.skipped > 0 {
            debug!(%family, skipped = stats.skipped, "Already migrated, skipping");
        }

        let ordered = sequencer::order_family(family, pending);
        let batches = sequencer::plan_batches(family, ordered, self.config.batch_size);
        let batch_count = batches.len();
        info!(%family, total = stats.total, pending = stats.total - stats.skipped, batches = batch_count, "[MIGRATE] Migrating family");

        for (index, batch) in batches.into_iter().enumerate() {
            let shared: &IdentityMap = maps;
            let outcomes = join_all(batch.iter().map(|entity| self.process(family, entity, shared))).await;

            for outcome in outcomes {
                match outcome {
                    Outcome::Migrated {
                        source_id,
                        destination_id,
                        warnings,
                    } => {
                        info!(%family, source_id, %destination_id, "Migrated");
                        maps.insert(family, source_id, destination_id);
                        stats.migrated += 1;
                        if !warnings.is_empty() {
                            for warning in &warnings {
                                warn!(%family, source_id, %warning, "Content degraded");
                            }
                            stats.warnings.push(EntityWarnings { source_id, warnings });
                        }
                    }
                    Outcome::Failed { source_id, message } => {
                        warn!(%family, source_id, error = %message, "Failed to migrate entity");
                        stats.failed += 1;
                        stats.failures.push(EntityFailure { source_id, message });
                    }
                }
            }

            self.store.save(kind, maps.mapping(kind))?;
            debug!(%family, batch = index + 1, of = batch_count, "Batch committed");

            if index + 1 < batch_count && self.config.batch_delay_ms > 0 {
                tokio::time::sleep(self.config.batch_delay()).await;
            }
        }

        // Persist even when nothing ran, so later phases can tell the step happened.
        if batch_count == 0 {
            self.store.save(kind, maps.mapping(kind))?;
        }
        Ok(stats)
    }

    async fn process(&self, family: Family, entity: &SourceEntity, maps: &IdentityMap) -> Outcome {
        let result = match family {
            Family::Media => self.migrate_asset(entity).await.map(|id| (id, Vec::new())),
            _ => self.migrate_entry(family, entity, maps).await,
        };
        match result {
            Ok((destination_id, warnings)) => Outcome::Migrated {
                source_id: entity.id,
                destination_id,
                warnings,
            },
            Err(e) => Outcome::Failed {
                source_id: entity.id,
                message: e.to_string(),
            },
        }
    }

    async fn migrate_entry(
        &self,
        family: Family,
        entity: &SourceEntity,
        maps: &IdentityMap,
    ) -> Result<(DestinationId, Vec<String>), BoxError> {
        let content_type = self
            .config
            .content_types
            .for_family(family)
            .ok_or_else(|| format!("no content type configured for {family}"))?;
        let draft = fields::build_entry(
            family,
            entity,
            maps,
            &self.config.locale,
            &self.config.transform,
        );
        debug!(%family, source_id = entity.id, content_type, "Creating entry");

        let id = self.writer.create_entity(content_type, draft.fields).await?;
        self.writer.publish(&id).await?;
        Ok((id, draft.warnings))
    }

    async fn migrate_asset(&self, entity: &SourceEntity) -> Result<DestinationId, BoxError> {
        let url = entity
            .source_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or("media item has no source url")?;
        let bytes = self.reader.fetch_media(url).await?;
        let file_name = file_name_from_url(url).unwrap_or_else(|| entity.slug.clone());
        let title = Some(plain_text(&entity.title))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| file_name.clone());

        let asset = NewAsset {
            bytes,
            content_type: entity
                .mime_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            file_name,
            title,
            description: plain_text_opt(entity.alt_text.as_deref())
                .or_else(|| plain_text_opt(entity.caption.as_deref())),
        };
        debug!(source_id = entity.id, file_name = %asset.file_name, size = asset.bytes.len(), "Uploading asset");

        let id = self.writer.create_asset(asset).await?;
        self.writer.wait_until_processed(&id).await?;
        self.writer.publish_asset(&id).await?;
        Ok(id)
    }
}

/// Last path segment of a URL, without query or fragment.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    path.rsplit('/')
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_strips_query_and_path() {
        assert_eq!(
            file_name_from_url("https://x.test/uploads/2023/05/cat.jpg?ver=2").as_deref(),
            Some("cat.jpg")
        );
        assert_eq!(file_name_from_url("https://x.test/"), None);
    }
}
