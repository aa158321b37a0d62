//! Rich-text document tree and its JSON wire shape.
//!
//! Every node serializes as `{ "nodeType", "data", "content" }`; text runs as
//! `{ "nodeType": "text", "value", "marks", "data" }`. The destination
//! rejects empty `content` arrays on anything but childless blocks, so the
//! builders in this crate never produce them and [`Document::violations`]
//! double-checks.

use std::collections::BTreeSet;

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use serde_json::json;

/// Text formatting. Runs hold a set, so nesting the same mark twice is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Code,
    Subscript,
    Superscript,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingLevel {
    Two,
    Three,
    Four,
}

impl HeadingLevel {
    /// The target only knows levels 2–4: h1 folds up into 2, h5/h6 down into 4.
    pub fn from_tag_level(level: u8) -> Self {
        match level {
            0..=2 => HeadingLevel::Two,
            3 => HeadingLevel::Three,
            _ => HeadingLevel::Four,
        }
    }

    fn node_type(self) -> &'static str {
        match self {
            HeadingLevel::Two => "heading-2",
            HeadingLevel::Three => "heading-3",
            HeadingLevel::Four => "heading-4",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextRun {
    pub value: String,
    pub marks: BTreeSet<Mark>,
}

impl TextRun {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            marks: BTreeSet::new(),
        }
    }

    pub fn with_mark(mut self, mark: Mark) -> Self {
        self.marks.insert(mark);
        self
    }

    pub fn has_mark(&self, mark: Mark) -> bool {
        self.marks.contains(&mark)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(TextRun),
    Hyperlink { uri: String, content: Vec<TextRun> },
    EntryLink { entry_id: String, content: Vec<TextRun> },
}

impl Inline {
    pub fn text(value: impl Into<String>) -> Self {
        Inline::Text(TextRun::plain(value))
    }

    /// Concatenated text of this node, links included.
    pub fn plain_text(&self) -> String {
        match self {
            Inline::Text(run) => run.value.clone(),
            Inline::Hyperlink { content, .. } | Inline::EntryLink { content, .. } => {
                content.iter().map(|r| r.value.as_str()).collect()
            }
        }
    }

    /// Unions `mark` onto every text run in this node, including link text.
    pub fn add_mark(&mut self, mark: Mark) {
        match self {
            Inline::Text(run) => {
                run.marks.insert(mark);
            }
            Inline::Hyperlink { content, .. } | Inline::EntryLink { content, .. } => {
                for run in content {
                    run.marks.insert(mark);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub content: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(Vec<Inline>),
    Heading { level: HeadingLevel, content: Vec<Inline> },
    UnorderedList(Vec<ListItem>),
    OrderedList(Vec<ListItem>),
    Blockquote(Vec<Block>),
    Hr,
    EmbeddedAsset { asset_id: String },
    EmbeddedEntry { entry_id: String },
}

impl Block {
    pub fn paragraph_text(value: impl Into<String>) -> Self {
        Block::Paragraph(vec![Inline::text(value)])
    }

    pub fn node_type(&self) -> &'static str {
        match self {
            Block::Paragraph(_) => "paragraph",
            Block::Heading { level, .. } => level.node_type(),
            Block::UnorderedList(_) => "unordered-list",
            Block::OrderedList(_) => "ordered-list",
            Block::Blockquote(_) => "blockquote",
            Block::Hr => "hr",
            Block::EmbeddedAsset { .. } => "embedded-asset-block",
            Block::EmbeddedEntry { .. } => "embedded-entry-block",
        }
    }

    pub fn is_childless(&self) -> bool {
        matches!(
            self,
            Block::Hr | Block::EmbeddedAsset { .. } | Block::EmbeddedEntry { .. }
        )
    }
}

/// Root node. Never empty: see [`Document::empty`].
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub content: Vec<Block>,
}

impl Default for Document {
    fn default() -> Self {
        Self::empty()
    }
}

impl Document {
    /// The canonical empty document: one paragraph holding one empty run.
    pub fn empty() -> Self {
        Document {
            content: vec![Block::paragraph_text("")],
        }
    }

    /// Wraps blocks into a document, substituting [`Document::empty`] for an empty list.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        if blocks.is_empty() {
            Self::empty()
        } else {
            Document { content: blocks }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        // Serializing plain data into a Value cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Schema problems the destination would reject. Empty when valid.
    pub fn violations(&self) -> Vec<String> {
        let mut found = Vec::new();
        if self.content.is_empty() {
            found.push("document: empty content".to_string());
        }
        for (i, block) in self.content.iter().enumerate() {
            check_block(block, &format!("content[{i}]"), &mut found);
        }
        found
    }
}

fn check_block(block: &Block, path: &str, found: &mut Vec<String>) {
    match block {
        Block::Paragraph(inlines) | Block::Heading { content: inlines, .. } => {
            if inlines.is_empty() {
                found.push(empty_content(path, block));
            }
            for (i, inline) in inlines.iter().enumerate() {
                check_inline(inline, &format!("{path}.content[{i}]"), found);
            }
        }
        Block::UnorderedList(items) | Block::OrderedList(items) => {
            if items.is_empty() {
                found.push(empty_content(path, block));
            }
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}.content[{i}]");
                if item.content.is_empty() {
                    found.push(format!("{item_path} (list-item): empty content"));
                }
                for (j, child) in item.content.iter().enumerate() {
                    check_block(child, &format!("{item_path}.content[{j}]"), found);
                }
            }
        }
        Block::Blockquote(children) => {
            if children.is_empty() {
                found.push(empty_content(path, block));
            }
            for (i, child) in children.iter().enumerate() {
                let child_path = format!("{path}.content[{i}]");
                if !matches!(child, Block::Paragraph(_)) {
                    found.push(format!(
                        "{child_path}: {} is not allowed inside blockquote",
                        child.node_type()
                    ));
                }
                check_block(child, &child_path, found);
            }
        }
        Block::Hr | Block::EmbeddedAsset { .. } | Block::EmbeddedEntry { .. } => {}
    }
}

fn empty_content(path: &str, block: &Block) -> String {
    format!("{path} ({}): empty content", block.node_type())
}

fn check_inline(inline: &Inline, path: &str, found: &mut Vec<String>) {
    match inline {
        Inline::Text(_) => {}
        Inline::Hyperlink { content, .. } | Inline::EntryLink { content, .. } => {
            if content.is_empty() {
                found.push(format!("{path}: link without text"));
            }
        }
    }
}

fn link_target(link_type: &str, id: &str) -> serde_json::Value {
    json!({ "target": { "sys": { "id": id, "type": "Link", "linkType": link_type } } })
}

fn empty_data() -> serde_json::Value {
    json!({})
}

fn serialize_node<S, C>(
    serializer: S,
    node_type: &str,
    data: &serde_json::Value,
    content: &C,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    C: Serialize + ?Sized,
{
    let mut node = serializer.serialize_struct("Node", 3)?;
    node.serialize_field("nodeType", node_type)?;
    node.serialize_field("data", data)?;
    node.serialize_field("content", content)?;
    node.end()
}

impl Serialize for TextRun {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut node = serializer.serialize_struct("Text", 4)?;
        node.serialize_field("nodeType", "text")?;
        node.serialize_field("value", &self.value)?;
        node.serialize_field("marks", &self.marks)?;
        node.serialize_field("data", &empty_data())?;
        node.end()
    }
}

impl Serialize for Inline {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Inline::Text(run) => run.serialize(serializer),
            Inline::Hyperlink { uri, content } => {
                serialize_node(serializer, "hyperlink", &json!({ "uri": uri }), content)
            }
            Inline::EntryLink { entry_id, content } => serialize_node(
                serializer,
                "entry-hyperlink",
                &link_target("Entry", entry_id),
                content,
            ),
        }
    }
}

impl Serialize for ListItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_node(serializer, "list-item", &empty_data(), &self.content)
    }
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let none: [(); 0] = [];
        let node_type = self.node_type();
        match self {
            Block::Paragraph(content) | Block::Heading { content, .. } => {
                serialize_node(serializer, node_type, &empty_data(), content)
            }
            Block::UnorderedList(items) | Block::OrderedList(items) => {
                serialize_node(serializer, node_type, &empty_data(), items)
            }
            Block::Blockquote(children) => {
                serialize_node(serializer, node_type, &empty_data(), children)
            }
            Block::Hr => serialize_node(serializer, node_type, &empty_data(), &none),
            Block::EmbeddedAsset { asset_id } => {
                serialize_node(serializer, node_type, &link_target("Asset", asset_id), &none)
            }
            Block::EmbeddedEntry { entry_id } => {
                serialize_node(serializer, node_type, &link_target("Entry", entry_id), &none)
            }
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_node(serializer, "document", &empty_data(), &self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_serializes_as_single_empty_paragraph() {
        let value = Document::empty().to_json();
        assert_eq!(
            value,
            json!({
                "nodeType": "document",
                "data": {},
                "content": [{
                    "nodeType": "paragraph",
                    "data": {},
                    "content": [{ "nodeType": "text", "value": "", "marks": [], "data": {} }]
                }]
            })
        );
    }

    #[test]
    fn marks_serialize_as_typed_objects_in_stable_order() {
        let run = TextRun::plain("x").with_mark(Mark::Italic).with_mark(Mark::Bold);
        let value = serde_json::to_value(&run).unwrap();
        assert_eq!(value["marks"], json!([{ "type": "bold" }, { "type": "italic" }]));
    }

    #[test]
    fn embedded_nodes_carry_link_targets() {
        let asset = serde_json::to_value(Block::EmbeddedAsset { asset_id: "a1".into() }).unwrap();
        assert_eq!(asset["nodeType"], "embedded-asset-block");
        assert_eq!(asset["data"]["target"]["sys"]["linkType"], "Asset");
        assert_eq!(asset["content"], json!([]));

        let entry = serde_json::to_value(Block::EmbeddedEntry { entry_id: "e1".into() }).unwrap();
        assert_eq!(entry["data"]["target"]["sys"]["id"], "e1");
    }

    #[test]
    fn violations_flag_non_paragraph_blockquote_children() {
        let doc = Document {
            content: vec![Block::Blockquote(vec![Block::Hr])],
        };
        let problems = doc.violations();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("not allowed inside blockquote"));
    }
}
