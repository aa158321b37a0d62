//! Recognising links that point at other migrated documents.
//!
//! Only the query-parameter form is understood (`?p=42`, `?page_id=42`).
//! Permalinks are not resolved; they stay ordinary hyperlinks.

use std::sync::LazyLock;

use url::Url;

use crate::identity_map::IdentityMap;
use crate::source::{Family, SourceId};

static PLACEHOLDER_BASE: LazyLock<Option<Url>> =
    LazyLock::new(|| Url::parse("http://placeholder.invalid/").ok());

/// A document reference parsed out of a URL, with the families to try in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub id: SourceId,
    pub candidates: &'static [Family],
}

pub fn parse_document_ref(href: &str) -> Option<DocumentRef> {
    let href = href.trim();
    let url = match Url::parse(href) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => PLACEHOLDER_BASE.as_ref()?.join(href).ok()?,
        Err(_) => return None,
    };

    url.query_pairs().find_map(|(key, value)| {
        let candidates: &'static [Family] = match key.as_ref() {
            "p" => &[Family::Posts, Family::Pages],
            "page_id" => &[Family::Pages, Family::Posts],
            _ => return None,
        };
        let id = value.trim().parse().ok()?;
        Some(DocumentRef { id, candidates })
    })
}

/// Destination entry id for a link target, when the referenced document has
/// already been migrated.
pub fn resolve_entry<'m>(href: &str, maps: &'m IdentityMap) -> Option<&'m str> {
    let doc = parse_document_ref(href)?;
    doc.candidates
        .iter()
        .find_map(|family| maps.get(*family, doc.id))
}
