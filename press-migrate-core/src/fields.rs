//! Destination `fields` objects, one builder per entry family.
//!
//! Every value is wrapped in the configured locale (`{"title": {"en-US": …}}`).
//! References are looked up in the identity map at build time; whatever does
//! not resolve yet is left out, so a page whose parent is missing simply
//! becomes a top-level page.

use serde_json::{json, Map, Value};

use crate::identity_map::IdentityMap;
use crate::sanitize::{plain_text, plain_text_opt};
use crate::source::{Family, SourceEntity, SourceId};
use crate::transform::{TransformOptions, Transformer};

/// Fields ready for `create_entity`, plus transformer warnings for the body.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDraft {
    pub fields: Value,
    pub warnings: Vec<String>,
}

pub fn link(link_type: &str, id: &str) -> Value {
    json!({ "sys": { "type": "Link", "linkType": link_type, "id": id } })
}

struct Fields<'a> {
    locale: &'a str,
    map: Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn new(locale: &'a str) -> Self {
        Self {
            locale,
            map: Map::new(),
        }
    }

    fn set(&mut self, name: &str, value: Value) {
        self.map.insert(name.to_string(), json!({ self.locale: value }));
    }

    fn set_opt(&mut self, name: &str, value: Option<Value>) {
        if let Some(value) = value {
            self.set(name, value);
        }
    }

    fn into_value(self) -> Value {
        Value::Object(self.map)
    }
}

fn entry_link(maps: &IdentityMap, family: Family, id: Option<SourceId>) -> Option<Value> {
    maps.get(family, id?).map(|dest| link("Entry", dest))
}

fn entry_links(maps: &IdentityMap, family: Family, ids: &[SourceId]) -> Option<Value> {
    let links: Vec<Value> = ids
        .iter()
        .filter_map(|id| maps.get(family, *id))
        .map(|dest| link("Entry", dest))
        .collect();
    (!links.is_empty()).then(|| Value::Array(links))
}

/// Builds the `fields` object for one entity of an entry family.
pub fn build_entry(
    family: Family,
    entity: &SourceEntity,
    maps: &IdentityMap,
    locale: &str,
    options: &TransformOptions,
) -> EntryDraft {
    let mut fields = Fields::new(locale);
    let mut warnings = Vec::new();
    let title = plain_text(&entity.title);

    match family {
        Family::Authors => {
            fields.set("name", json!(title));
            fields.set("slug", json!(entity.slug));
            fields.set_opt("bio", plain_text_opt(entity.description.as_deref()).map(Value::from));
        }
        Family::Tags | Family::Categories => {
            fields.set("name", json!(title));
            fields.set("slug", json!(entity.slug));
            fields.set_opt(
                "description",
                plain_text_opt(entity.description.as_deref()).map(Value::from),
            );
            if family == Family::Categories {
                fields.set_opt(
                    "parentCategory",
                    entry_link(maps, Family::Categories, entity.parent_id()),
                );
            }
        }
        Family::Posts | Family::Pages => {
            fields.set("title", json!(title));
            fields.set("slug", json!(entity.slug));
            if entity.body.is_some() {
                let output = Transformer::new(maps)
                    .with_options(options.clone())
                    .transform(entity.body.as_deref());
                fields.set("body", output.document.to_json());
                warnings = output.warnings;
            }
            fields.set_opt("publishDate", entity.date.clone().map(Value::from));

            if family == Family::Posts {
                fields.set_opt(
                    "excerpt",
                    plain_text_opt(entity.excerpt.as_deref()).map(Value::from),
                );
                fields.set_opt("author", entry_link(maps, Family::Authors, entity.author));
                fields.set_opt("categories", entry_links(maps, Family::Categories, &entity.categories));
                fields.set_opt("tags", entry_links(maps, Family::Tags, &entity.tags));
                fields.set_opt(
                    "featuredImage",
                    entity
                        .featured_media
                        .and_then(|id| maps.asset(id))
                        .map(|dest| link("Asset", dest)),
                );
            } else {
                fields.set_opt("parentPage", entry_link(maps, Family::Pages, entity.parent_id()));
            }
        }
        Family::Media => {}
    }

    EntryDraft {
        fields: fields.into_value(),
        warnings,
    }
}
