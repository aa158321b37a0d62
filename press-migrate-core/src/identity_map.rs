//! Identity maps: source keys to destination ids, one mapping per kind.
//!
//! Mappings are append-only for the lifetime of a run. [`IdentityMap::insert`]
//! refuses to overwrite, which is what makes a re-run skip entities that were
//! already created. [`JsonMapStore`] snapshots each mapping to its own JSON
//! file; a save writes a temp file next to the target and renames it over,
//! so a crash mid-save leaves the previous snapshot intact.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::contract::MapStore;
use crate::error::MigrateError;
use crate::source::{Family, SourceId};

/// One persisted table of `key -> destination id`.
pub type Mapping = BTreeMap<String, String>;

/// Which of the two persisted mappings a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapKind {
    Assets,
    Entries,
}

impl MapKind {
    pub fn for_family(family: Family) -> Self {
        match family {
            Family::Media => MapKind::Assets,
            _ => MapKind::Entries,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            MapKind::Assets => "asset-map.json",
            MapKind::Entries => "entry-map.json",
        }
    }
}

/// Stable key for `(family, source_id)`.
///
/// Assets are keyed by the bare media id, entries carry the family prefix so
/// that posts and pages sharing a numeric id never collide.
pub fn map_key(family: Family, id: SourceId) -> String {
    match MapKind::for_family(family) {
        MapKind::Assets => id.to_string(),
        MapKind::Entries => format!("{}:{}", family.key_prefix(), id),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityMap {
    assets: Mapping,
    entries: Mapping,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(assets: Mapping, entries: Mapping) -> Self {
        Self { assets, entries }
    }

    pub fn mapping(&self, kind: MapKind) -> &Mapping {
        match kind {
            MapKind::Assets => &self.assets,
            MapKind::Entries => &self.entries,
        }
    }

    pub fn get(&self, family: Family, id: SourceId) -> Option<&str> {
        self.mapping(MapKind::for_family(family))
            .get(&map_key(family, id))
            .map(String::as_str)
    }

    pub fn contains(&self, family: Family, id: SourceId) -> bool {
        self.get(family, id).is_some()
    }

    pub fn asset(&self, media_id: SourceId) -> Option<&str> {
        self.get(Family::Media, media_id)
    }

    /// Records a mapping unless the key is already present.
    /// Returns `true` when the mapping was added.
    pub fn insert(&mut self, family: Family, id: SourceId, destination_id: impl Into<String>) -> bool {
        let key = map_key(family, id);
        let table = match MapKind::for_family(family) {
            MapKind::Assets => &mut self.assets,
            MapKind::Entries => &mut self.entries,
        };
        if table.contains_key(&key) {
            debug!(%key, "Mapping already present, keeping existing destination id");
            return false;
        }
        table.insert(key, destination_id.into());
        true
    }

    pub fn len(&self, kind: MapKind) -> usize {
        self.mapping(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty() && self.entries.is_empty()
    }
}

/// Snapshots mappings as pretty-printed JSON files inside one state directory.
#[derive(Debug, Clone)]
pub struct JsonMapStore {
    dir: PathBuf,
}

impl JsonMapStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: MapKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Loads both mappings, treating missing files as empty.
    pub fn load_all(&self) -> Result<IdentityMap, MigrateError> {
        let assets = self.load(MapKind::Assets)?.unwrap_or_default();
        let entries = self.load(MapKind::Entries)?.unwrap_or_default();
        Ok(IdentityMap::from_parts(assets, entries))
    }

    fn persist_error(&self, kind: MapKind, source: std::io::Error) -> MigrateError {
        MigrateError::Persist {
            path: self.path(kind),
            source,
        }
    }
}

impl MapStore for JsonMapStore {
    fn load(&self, kind: MapKind) -> Result<Option<Mapping>, MigrateError> {
        let path = self.path(kind);
        if !path.exists() {
            debug!(path = %path.display(), "No identity map on disk yet");
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|e| self.persist_error(kind, e))?;
        let mapping: Mapping = serde_json::from_str(&raw)
            .map_err(|source| MigrateError::MapCorrupt { path: path.clone(), source })?;
        info!(path = %path.display(), entries = mapping.len(), "Loaded identity map");
        Ok(Some(mapping))
    }

    fn save(&self, kind: MapKind, mapping: &Mapping) -> Result<(), MigrateError> {
        fs::create_dir_all(&self.dir).map_err(|e| self.persist_error(kind, e))?;
        let json = serde_json::to_string_pretty(mapping)
            .map_err(|e| self.persist_error(kind, std::io::Error::other(e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| self.persist_error(kind, e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| self.persist_error(kind, e))?;
        tmp.persist(self.path(kind))
            .map_err(|e| self.persist_error(kind, e.error))?;

        debug!(path = %self.path(kind).display(), entries = mapping.len(), "Saved identity map");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_keys_carry_family_prefix_and_asset_keys_do_not() {
        assert_eq!(map_key(Family::Posts, 42), "post:42");
        assert_eq!(map_key(Family::Pages, 42), "page:42");
        assert_eq!(map_key(Family::Media, 7), "7");
    }

    #[test]
    fn insert_never_overwrites() {
        let mut map = IdentityMap::new();
        assert!(map.insert(Family::Posts, 1, "first"));
        assert!(!map.insert(Family::Posts, 1, "second"));
        assert_eq!(map.get(Family::Posts, 1), Some("first"));
        assert_eq!(map.get(Family::Pages, 1), None);
    }
}
