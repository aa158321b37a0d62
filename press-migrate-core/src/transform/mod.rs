//! HTML to rich-text document transformation.
//!
//! [`Transformer::transform`] never fails. Whatever comes in (nothing, an
//! empty string, half-closed tags), a schema-valid [`Document`] comes out,
//! together with the warnings describing what had to be degraded on the way:
//! tables flattened to text, images without a migrated asset, skipped
//! iframes and the like. Warnings belong to the call that produced them, so
//! concurrent transformations never share state.
//!
//! The pipeline is:
//! 1. [`preprocess`]: strip shortcodes and editor block comments,
//! 2. parse the fragment with `scraper`,
//! 3. walk the tree (see `walk`), resolving images through the asset map and
//!    cross-document links through the entry map.

pub mod document;
pub mod links;
pub mod media;
pub mod preprocess;
mod walk;

use scraper::Html;
use serde::{Deserialize, Serialize};

pub use document::{Block, Document, HeadingLevel, Inline, ListItem, Mark, TextRun};

use crate::identity_map::IdentityMap;
use walk::Walker;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    /// Keep whitespace-only text between blocks and at paragraph edges.
    pub preserve_whitespace: bool,
}

/// A document plus the degradations recorded while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    pub document: Document,
    pub warnings: Vec<String>,
}

impl TransformOutput {
    fn empty() -> Self {
        Self {
            document: Document::empty(),
            warnings: Vec::new(),
        }
    }
}

/// Converts HTML bodies against the identity maps as they stand right now.
#[derive(Debug, Clone)]
pub struct Transformer<'m> {
    maps: &'m IdentityMap,
    options: TransformOptions,
}

impl<'m> Transformer<'m> {
    pub fn new(maps: &'m IdentityMap) -> Self {
        Self {
            maps,
            options: TransformOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TransformOptions) -> Self {
        self.options = options;
        self
    }

    pub fn transform(&self, html: Option<&str>) -> TransformOutput {
        let Some(html) = html.filter(|h| !h.trim().is_empty()) else {
            return TransformOutput::empty();
        };

        let cleaned = preprocess::preprocess(html);
        let fragment = Html::parse_fragment(&cleaned);

        let mut walker = Walker::new(self.maps, &self.options);
        let blocks = walker.flow_children(fragment.root_element());

        TransformOutput {
            document: Document::from_blocks(blocks),
            warnings: walker.warnings,
        }
    }
}
