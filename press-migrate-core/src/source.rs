//! Source-side data model: entity families and the flat record every reader
//! normalises its payloads into.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identifier assigned by the source system.
pub type SourceId = u64;

/// A group of source entities sharing one shape and one destination content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Authors,
    Tags,
    Categories,
    Media,
    Posts,
    Pages,
}

impl Family {
    pub const ALL: [Family; 6] = [
        Family::Authors,
        Family::Tags,
        Family::Categories,
        Family::Media,
        Family::Posts,
        Family::Pages,
    ];

    /// Prefix used when building identity-map keys (`post:42`).
    pub fn key_prefix(self) -> &'static str {
        match self {
            Family::Authors => "author",
            Family::Tags => "tag",
            Family::Categories => "category",
            Family::Media => "media",
            Family::Posts => "post",
            Family::Pages => "page",
        }
    }

    /// REST collection name, also used as the export file stem.
    pub fn endpoint(self) -> &'static str {
        match self {
            Family::Authors => "users",
            Family::Tags => "tags",
            Family::Categories => "categories",
            Family::Media => "media",
            Family::Posts => "posts",
            Family::Pages => "pages",
        }
    }

    /// Families whose entities reference a parent of the same family.
    pub fn is_hierarchical(self) -> bool {
        matches!(self, Family::Categories | Family::Pages)
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// A read-only snapshot of one source record.
///
/// Readers flatten whatever nesting the source API uses (`title.rendered` and
/// friends) into this shape. Text fields may still contain markup and entities;
/// sanitizing happens when destination fields are built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceEntity {
    pub id: SourceId,
    pub title: String,
    pub slug: String,
    pub body: Option<String>,
    pub excerpt: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub modified: Option<String>,
    /// `0` and `None` both mean "top level".
    pub parent: Option<SourceId>,
    pub author: Option<SourceId>,
    pub categories: Vec<SourceId>,
    pub tags: Vec<SourceId>,
    pub featured_media: Option<SourceId>,
    pub source_url: Option<String>,
    pub mime_type: Option<String>,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
}

impl SourceEntity {
    pub fn new(id: SourceId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            ..Default::default()
        }
    }

    /// Parent reference with the `0` sentinel folded into `None`.
    pub fn parent_id(&self) -> Option<SourceId> {
        self.parent.filter(|p| *p != 0)
    }
}
