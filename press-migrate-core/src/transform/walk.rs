//! Recursive descent over the parsed HTML tree.
//!
//! Two contexts exist. Block context ([`Walker::flow_children`],
//! [`Walker::block_nodes`]) produces [`Block`]s and owns image handling.
//! Inline context ([`Walker::inline_nodes`]) produces [`Inline`]s, ignores
//! images and never expects lists. Every block-producing function returns a
//! `Vec<Block>`, possibly empty.

use std::sync::LazyLock;

use scraper::{ElementRef, Node, Selector};
use tracing::debug;

use super::document::{Block, HeadingLevel, Inline, ListItem, Mark, TextRun};
use super::links;
use super::media;
use super::TransformOptions;
use crate::identity_map::IdentityMap;

static TABLE_ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());

const TABLE_CELL_SEPARATOR: &str = " | ";

/// Elements that start a new block when met in flow content.
fn is_block_tag(name: &str) -> bool {
    matches!(
        name,
        "p" | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "ul"
            | "ol"
            | "li"
            | "dl"
            | "dt"
            | "dd"
            | "blockquote"
            | "pre"
            | "hr"
            | "table"
            | "figure"
            | "figcaption"
            | "img"
            | "video"
            | "audio"
            | "iframe"
            | "embed"
            | "object"
            | "div"
            | "section"
            | "article"
            | "header"
            | "footer"
            | "main"
            | "aside"
            | "nav"
            | "address"
            | "details"
            | "summary"
            | "form"
            | "fieldset"
            | "center"
    )
}

/// Elements whose text is never content.
fn is_ignored_tag(name: &str) -> bool {
    matches!(name, "script" | "style" | "noscript" | "template")
}

fn is_unsupported_media(name: &str) -> bool {
    matches!(name, "video" | "audio" | "iframe" | "embed" | "object")
}

fn is_list_tag(name: &str) -> bool {
    matches!(name, "ul" | "ol")
}

fn mark_for(name: &str) -> Option<Mark> {
    match name {
        "strong" | "b" => Some(Mark::Bold),
        "em" | "i" => Some(Mark::Italic),
        "u" | "ins" => Some(Mark::Underline),
        "code" | "kbd" | "samp" | "tt" => Some(Mark::Code),
        // No highlight mark exists on the target; bold is the closest.
        "mark" => Some(Mark::Bold),
        "sub" => Some(Mark::Subscript),
        "sup" => Some(Mark::Superscript),
        _ => None,
    }
}

fn heading_level(name: &str) -> Option<HeadingLevel> {
    let digit = name.strip_prefix('h')?;
    match digit {
        "1" | "2" | "3" | "4" | "5" | "6" => digit.parse().ok().map(HeadingLevel::from_tag_level),
        _ => None,
    }
}

/// Inline elements that may still wrap block content (`<a><img></a>`).
fn is_inline_wrapper(name: &str) -> bool {
    !is_block_tag(name) && !is_ignored_tag(name)
}

fn tag<'a>(el: &ElementRef<'a>) -> &'a str {
    el.value().name()
}

/// An inline wrapper split around the blocks it contains.
enum Flow {
    Inline(Inline),
    Block(Block),
}

fn flatten_runs(nodes: Vec<Inline>) -> Vec<TextRun> {
    nodes
        .into_iter()
        .flat_map(|node| match node {
            Inline::Text(run) => vec![run],
            Inline::Hyperlink { content, .. } | Inline::EntryLink { content, .. } => content,
        })
        .collect()
}

fn trim_start(node: &mut Inline) {
    match node {
        Inline::Text(run) => run.value = run.value.trim_start().to_string(),
        Inline::Hyperlink { content, .. } | Inline::EntryLink { content, .. } => {
            while let Some(run) = content.first_mut() {
                run.value = run.value.trim_start().to_string();
                if !run.value.is_empty() {
                    break;
                }
                content.remove(0);
            }
        }
    }
}

fn trim_end(node: &mut Inline) {
    match node {
        Inline::Text(run) => run.value = run.value.trim_end().to_string(),
        Inline::Hyperlink { content, .. } | Inline::EntryLink { content, .. } => {
            while let Some(run) = content.last_mut() {
                run.value = run.value.trim_end().to_string();
                if !run.value.is_empty() {
                    break;
                }
                content.pop();
            }
        }
    }
}

fn ends_in_whitespace(nodes: &[Inline]) -> bool {
    match nodes.last() {
        None => true,
        Some(node) => node.plain_text().ends_with(char::is_whitespace),
    }
}

fn is_blank(node: &Inline) -> bool {
    match node {
        Inline::Text(run) => run.value.is_empty(),
        Inline::Hyperlink { content, .. } | Inline::EntryLink { content, .. } => content.is_empty(),
    }
}

pub(crate) struct Walker<'a> {
    maps: &'a IdentityMap,
    options: &'a TransformOptions,
    pub(crate) warnings: Vec<String>,
}

impl<'a> Walker<'a> {
    pub(crate) fn new(maps: &'a IdentityMap, options: &'a TransformOptions) -> Self {
        Self {
            maps,
            options,
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, message: String) {
        debug!(warning = %message, "Transformer degraded content");
        self.warnings.push(message);
    }

    /// Flow content: blocks are processed in place, runs of loose inline
    /// content between them become paragraphs.
    pub(crate) fn flow_children(&mut self, el: ElementRef<'_>) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut pending: Vec<Inline> = Vec::new();

        for child in el.children() {
            match child.value() {
                Node::Text(text) => {
                    let text: &str = text;
                    if text.trim().is_empty() && pending.is_empty() && !self.options.preserve_whitespace {
                        continue;
                    }
                    pending.push(Inline::text(text));
                }
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if self.is_inline_flow(&child_el) {
                        let nodes = self.inline_nodes(child_el);
                        pending.extend(nodes);
                    } else if is_inline_wrapper(tag(&child_el)) {
                        for piece in self.split_inline(child_el) {
                            match piece {
                                Flow::Inline(node) => pending.push(node),
                                Flow::Block(block) => {
                                    self.flush_paragraph(&mut pending, &mut blocks);
                                    blocks.push(block);
                                }
                            }
                        }
                    } else {
                        self.flush_paragraph(&mut pending, &mut blocks);
                        let nodes = self.block_nodes(child_el);
                        blocks.extend(nodes);
                    }
                }
                _ => {}
            }
        }
        self.flush_paragraph(&mut pending, &mut blocks);
        blocks
    }

    /// Walks an inline element that contains blocks. The element's mark, or
    /// its link for `a`, is carried onto every inline piece between blocks.
    fn split_inline(&mut self, el: ElementRef<'_>) -> Vec<Flow> {
        let mut pieces = Vec::new();
        for child in el.children() {
            match child.value() {
                Node::Text(text) => {
                    let text: &str = text;
                    pieces.push(Flow::Inline(Inline::text(text)));
                }
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if self.is_inline_flow(&child_el) {
                        let nodes = self.inline_nodes(child_el);
                        pieces.extend(nodes.into_iter().map(Flow::Inline));
                    } else if is_inline_wrapper(tag(&child_el)) {
                        pieces.extend(self.split_inline(child_el));
                    } else {
                        let blocks = self.block_nodes(child_el);
                        pieces.extend(blocks.into_iter().map(Flow::Block));
                    }
                }
                _ => {}
            }
        }

        let name = tag(&el);
        if let Some(mark) = mark_for(name) {
            for piece in &mut pieces {
                if let Flow::Inline(node) = piece {
                    node.add_mark(mark);
                }
            }
            return pieces;
        }
        match (name, el.value().attr("href")) {
            ("a", Some(href)) => self.link_pieces(href, pieces),
            _ => pieces,
        }
    }

    /// Wraps each run of inline pieces between blocks in its own link.
    fn link_pieces(&self, href: &str, pieces: Vec<Flow>) -> Vec<Flow> {
        let mut out = Vec::new();
        let mut group: Vec<Inline> = Vec::new();
        for piece in pieces {
            match piece {
                Flow::Inline(node) => group.push(node),
                Flow::Block(block) => {
                    out.extend(self.link_group(href, std::mem::take(&mut group)));
                    out.push(Flow::Block(block));
                }
            }
        }
        out.extend(self.link_group(href, group));
        out
    }

    fn link_group(&self, href: &str, group: Vec<Inline>) -> Vec<Flow> {
        let runs = flatten_runs(group);
        if runs.iter().all(|r| r.value.trim().is_empty()) {
            return runs
                .into_iter()
                .map(|run| Flow::Inline(Inline::Text(run)))
                .collect();
        }
        vec![Flow::Inline(self.link_node(href, runs))]
    }

    fn link_node(&self, href: &str, content: Vec<TextRun>) -> Inline {
        match links::resolve_entry(href, self.maps) {
            Some(entry_id) => Inline::EntryLink {
                entry_id: entry_id.to_string(),
                content,
            },
            None => Inline::Hyperlink {
                uri: href.to_string(),
                content,
            },
        }
    }

    fn flush_paragraph(&self, pending: &mut Vec<Inline>, blocks: &mut Vec<Block>) {
        if pending.is_empty() {
            return;
        }
        if let Some(content) = self.finish_inlines(std::mem::take(pending), true) {
            blocks.push(Block::Paragraph(content));
        }
    }

    /// Inline elements stay in the current paragraph unless they wrap
    /// something block-level (an image inside a link, a stray div in a span).
    fn is_inline_flow(&self, el: &ElementRef<'_>) -> bool {
        let name = tag(el);
        if is_block_tag(name) || is_ignored_tag(name) {
            return false;
        }
        !el.descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .any(|d| is_block_tag(tag(&d)))
    }

    pub(crate) fn block_nodes(&mut self, el: ElementRef<'_>) -> Vec<Block> {
        let name = tag(&el);
        if let Some(level) = heading_level(name) {
            return self.heading(el, level);
        }
        match name {
            "ul" => self.list(el, false),
            "ol" => self.list(el, true),
            "blockquote" => self.blockquote(el),
            "pre" => self.preformatted(el),
            "hr" => vec![Block::Hr],
            "table" => self.table(el),
            "img" => vec![self.image(el)],
            "figure" => self.figure(el),
            n if is_unsupported_media(n) => {
                self.warn(format!("{n} skipped"));
                Vec::new()
            }
            n if is_ignored_tag(n) => Vec::new(),
            _ => self.flow_children(el),
        }
    }

    fn heading(&mut self, el: ElementRef<'_>, level: HeadingLevel) -> Vec<Block> {
        let inlines = self.inline_children(el);
        let mut blocks = Vec::new();
        if let Some(content) = self.finish_inlines(inlines, true) {
            blocks.push(Block::Heading { level, content });
        }
        blocks.extend(self.images_within(el));
        blocks
    }

    fn preformatted(&mut self, el: ElementRef<'_>) -> Vec<Block> {
        let inlines = self.inline_children(el);
        self.finish_inlines(inlines, false)
            .map(Block::Paragraph)
            .into_iter()
            .collect()
    }

    fn list(&mut self, el: ElementRef<'_>, ordered: bool) -> Vec<Block> {
        let mut items: Vec<ListItem> = Vec::new();

        for child in el.children() {
            match child.value() {
                Node::Text(text) => {
                    let text: &str = text;
                    if !text.trim().is_empty() {
                        items.push(ListItem {
                            content: vec![Block::paragraph_text(text.trim())],
                        });
                    }
                }
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let name = tag(&child_el);
                    if is_list_tag(name) {
                        // A list directly inside a list belongs to the previous item.
                        let nested = self.list(child_el, name == "ol");
                        match items.last_mut() {
                            Some(prev) => prev.content.extend(nested),
                            None if !nested.is_empty() => items.push(ListItem { content: nested }),
                            None => {}
                        }
                    } else if let Some(item) = self.list_item(child_el) {
                        items.push(item);
                    }
                }
                _ => {}
            }
        }

        if items.is_empty() {
            return Vec::new();
        }
        vec![if ordered {
            Block::OrderedList(items)
        } else {
            Block::UnorderedList(items)
        }]
    }

    /// Item content is flow content: loose text becomes paragraphs, nested
    /// lists, images and block children keep their document order.
    fn list_item(&mut self, li: ElementRef<'_>) -> Option<ListItem> {
        let content = self.flow_children(li);
        if content.is_empty() {
            None
        } else {
            Some(ListItem { content })
        }
    }

    /// Only paragraphs may sit inside a blockquote on the target. Headings
    /// keep their text as a paragraph, other blocks are dropped.
    fn blockquote(&mut self, el: ElementRef<'_>) -> Vec<Block> {
        let mut paragraphs = Vec::new();
        let mut dropped = 0;
        for block in self.flow_children(el) {
            match block {
                Block::Paragraph(content) | Block::Heading { content, .. } => {
                    paragraphs.push(Block::Paragraph(content))
                }
                _ => dropped += 1,
            }
        }

        if dropped > 0 {
            self.warn(format!("blockquote: {dropped} non-paragraph block(s) dropped"));
        }
        if !paragraphs.is_empty() {
            return vec![Block::Blockquote(paragraphs)];
        }

        if el.text().all(|t| t.trim().is_empty()) {
            return Vec::new();
        }
        let content = self.inline_content(el);
        vec![Block::Blockquote(vec![Block::Paragraph(content)])]
    }

    fn table(&mut self, el: ElementRef<'_>) -> Vec<Block> {
        self.warn("table converted to text".to_string());

        let rows: Vec<String> = el
            .select(&TABLE_ROW)
            .map(|row| {
                row.children()
                    .filter_map(ElementRef::wrap)
                    .filter(|cell| matches!(tag(cell), "td" | "th"))
                    .map(|cell| {
                        cell.text()
                            .collect::<String>()
                            .split_whitespace()
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .collect::<Vec<_>>()
                    .join(TABLE_CELL_SEPARATOR)
            })
            .filter(|row| !row.trim().is_empty())
            .collect();

        if rows.is_empty() {
            return Vec::new();
        }
        vec![Block::paragraph_text(rows.join("\n"))]
    }

    fn figure(&mut self, el: ElementRef<'_>) -> Vec<Block> {
        let nests_figures = el
            .children()
            .filter_map(ElementRef::wrap)
            .any(|c| tag(&c) == "figure");
        let images: Vec<ElementRef<'_>> = el
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|d| tag(d) == "img")
            .collect();

        if nests_figures || images.is_empty() {
            return self.flow_children(el);
        }

        let mut blocks: Vec<Block> = images.into_iter().map(|img| self.image(img)).collect();
        let caption = el
            .children()
            .filter_map(ElementRef::wrap)
            .find(|c| tag(c) == "figcaption");
        if let Some(caption) = caption {
            let inlines = self.inline_children(caption);
            if let Some(content) = self.finish_inlines(inlines, true) {
                blocks.push(Block::Paragraph(content));
            }
        }
        blocks
    }

    /// Embedded asset when the image resolves, italic placeholder otherwise.
    fn image(&mut self, img: ElementRef<'_>) -> Block {
        let src = media::image_src(&img);

        if let Some((media_id, via)) = media::media_id(&img) {
            if let Some(asset_id) = self.maps.asset(media_id) {
                return Block::EmbeddedAsset {
                    asset_id: asset_id.to_string(),
                };
            }
            debug!(media_id, ?via, "Image media id has no migrated asset");
        }

        let alt = img
            .value()
            .attr("alt")
            .map(str::trim)
            .filter(|a| !a.is_empty());
        let label = alt.or(src).unwrap_or("image");
        self.warn(format!("asset not found for image: {}", src.unwrap_or(label)));
        Block::Paragraph(vec![Inline::Text(
            TextRun::plain(format!("[Image: {label}]")).with_mark(Mark::Italic),
        )])
    }

    /// Images nested anywhere inside `el`, skipping nested lists (they handle
    /// their own).
    fn images_within(&mut self, el: ElementRef<'_>) -> Vec<Block> {
        let mut blocks = Vec::new();
        for child in el.children().filter_map(ElementRef::wrap) {
            match tag(&child) {
                "img" => blocks.push(self.image(child)),
                name if is_list_tag(name) => {}
                _ => blocks.extend(self.images_within(child)),
            }
        }
        blocks
    }

    /// Block children read inline are kept apart by a single space.
    pub(crate) fn inline_children(&mut self, el: ElementRef<'_>) -> Vec<Inline> {
        let mut out = Vec::new();
        let mut after_block = false;
        for child in el.children() {
            match child.value() {
                Node::Text(text) => {
                    let text: &str = text;
                    if after_block && !text.trim().is_empty() && !text.starts_with(char::is_whitespace) {
                        out.push(Inline::text(" "));
                    }
                    after_block &= text.trim().is_empty();
                    out.push(Inline::text(text));
                }
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let is_block = is_block_tag(tag(&child_el));
                    let nodes = self.inline_nodes(child_el);
                    if nodes.is_empty() {
                        continue;
                    }
                    if (is_block || after_block) && !ends_in_whitespace(&out) {
                        out.push(Inline::text(" "));
                    }
                    after_block = is_block;
                    out.extend(nodes);
                }
                _ => {}
            }
        }
        out
    }

    pub(crate) fn inline_nodes(&mut self, el: ElementRef<'_>) -> Vec<Inline> {
        let name = tag(&el);
        if let Some(mark) = mark_for(name) {
            let mut nodes = self.inline_children(el);
            for node in &mut nodes {
                node.add_mark(mark);
            }
            return nodes;
        }
        match name {
            "br" => vec![Inline::text("\n")],
            "a" => self.anchor(el),
            "img" => Vec::new(),
            n if is_ignored_tag(n) => Vec::new(),
            n if is_unsupported_media(n) => {
                self.warn(format!("{n} skipped"));
                Vec::new()
            }
            _ => self.inline_children(el),
        }
    }

    fn anchor(&mut self, el: ElementRef<'_>) -> Vec<Inline> {
        let children = self.inline_children(el);
        let Some(href) = el.value().attr("href") else {
            // Named anchors carry no target; keep their text.
            return children;
        };

        let mut runs = flatten_runs(children);
        if runs.iter().all(|r| r.value.trim().is_empty()) {
            let label = if href.trim().is_empty() { "link" } else { href };
            runs = vec![TextRun::plain(label)];
        }
        vec![self.link_node(href, runs)]
    }

    /// Merges adjacent runs with equal marks, trims paragraph edges (unless
    /// whitespace is preserved) and drops empty runs. `None` when nothing is left.
    fn finish_inlines(&self, inlines: Vec<Inline>, trim: bool) -> Option<Vec<Inline>> {
        let trim = trim && !self.options.preserve_whitespace;
        let mut out: Vec<Inline> = Vec::with_capacity(inlines.len());

        for node in inlines {
            if let Inline::Text(run) = &node {
                if let Some(Inline::Text(prev)) = out.last_mut() {
                    if prev.marks == run.marks {
                        prev.value.push_str(&run.value);
                        continue;
                    }
                }
            }
            out.push(node);
        }

        if trim {
            while let Some(first) = out.first_mut() {
                trim_start(first);
                if !is_blank(first) {
                    break;
                }
                out.remove(0);
            }
            while let Some(last) = out.last_mut() {
                trim_end(last);
                if !is_blank(last) {
                    break;
                }
                out.pop();
            }
        }
        out.retain(|node| !is_blank(node));

        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// Inline content of `el`, never empty.
    pub(crate) fn inline_content(&mut self, el: ElementRef<'_>) -> Vec<Inline> {
        let inlines = self.inline_children(el);
        self.finish_inlines(inlines, true)
            .unwrap_or_else(|| vec![Inline::text("")])
    }
}
