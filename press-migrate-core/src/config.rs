use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::source::Family;
use crate::transform::TransformOptions;

/// Destination content-type ids, one per entry family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentTypes {
    pub author: String,
    pub tag: String,
    pub category: String,
    pub post: String,
    pub page: String,
}

impl Default for ContentTypes {
    fn default() -> Self {
        Self {
            author: "author".into(),
            tag: "tag".into(),
            category: "category".into(),
            post: "blogPost".into(),
            page: "page".into(),
        }
    }
}

impl ContentTypes {
    /// `None` for media, which becomes an asset rather than an entry.
    pub fn for_family(&self, family: Family) -> Option<&str> {
        match family {
            Family::Authors => Some(&self.author),
            Family::Tags => Some(&self.tag),
            Family::Categories => Some(&self.category),
            Family::Posts => Some(&self.post),
            Family::Pages => Some(&self.page),
            Family::Media => None,
        }
    }
}

/// Knobs for a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateConfig {
    /// Directory holding the identity-map snapshots.
    pub state_dir: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batches, for destination rate limits.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub content_types: ContentTypes,
    #[serde(default)]
    pub transform: TransformOptions,
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_delay_ms() -> u64 {
    1000
}

fn default_locale() -> String {
    "en-US".to_string()
}

impl MigrateConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            locale: default_locale(),
            content_types: ContentTypes::default(),
            transform: TransformOptions::default(),
        }
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn trace_loaded(&self) {
        info!(
            state_dir = %self.state_dir.display(),
            batch_size = self.batch_size,
            batch_delay_ms = self.batch_delay_ms,
            locale = %self.locale,
            "Loaded MigrateConfig"
        );
        debug!(?self, "MigrateConfig loaded (full debug)");
    }
}
