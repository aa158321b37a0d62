//! Recovering a source media id from image markup.
//!
//! Strategies run in order and the first one that yields an id wins:
//! 1. an explicit `data-id` / `data-attachment-id` attribute,
//! 2. the editor's `wp-image-<id>` class,
//! 3. the last purely numeric segment of the `src` path.
//!
//! The third one is a guess. Upload paths such as `/2023/05/cat.jpg` contain
//! date segments that look like ids, so a hit there can point at an unrelated
//! asset.

use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;

use crate::source::SourceId;

static WP_IMAGE_CLASS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^wp-image-(\d+)$").unwrap());

const ID_ATTRIBUTES: [&str; 2] = ["data-id", "data-attachment-id"];

/// The strategy that produced an id, kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    Attribute,
    ClassName,
    UrlSegment,
}

type Strategy = fn(&ElementRef<'_>) -> Option<SourceId>;

const STRATEGIES: [(IdSource, Strategy); 3] = [
    (IdSource::Attribute, from_attribute),
    (IdSource::ClassName, from_class),
    (IdSource::UrlSegment, from_url_segment),
];

/// Runs the strategies against an `<img>` element.
pub fn media_id(img: &ElementRef<'_>) -> Option<(SourceId, IdSource)> {
    STRATEGIES
        .iter()
        .find_map(|(source, strategy)| strategy(img).map(|id| (id, *source)))
}

pub fn image_src<'a>(img: &ElementRef<'a>) -> Option<&'a str> {
    img.value()
        .attr("src")
        .or_else(|| img.value().attr("data-src"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn from_attribute(img: &ElementRef<'_>) -> Option<SourceId> {
    ID_ATTRIBUTES
        .iter()
        .filter_map(|name| img.value().attr(name))
        .find_map(|raw| raw.trim().parse().ok())
}

fn from_class(img: &ElementRef<'_>) -> Option<SourceId> {
    img.value()
        .classes()
        .find_map(|class| WP_IMAGE_CLASS.captures(class))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn from_url_segment(img: &ElementRef<'_>) -> Option<SourceId> {
    numeric_path_segment(image_src(img)?)
}

/// Last path segment made only of digits, ignoring query and fragment.
pub fn numeric_path_segment(src: &str) -> Option<SourceId> {
    let path = src.split(['?', '#']).next().unwrap_or(src);
    path.rsplit('/')
        .find(|seg| !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|seg| seg.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn with_img<T>(html: &str, f: impl FnOnce(ElementRef<'_>) -> T) -> T {
        let doc = Html::parse_fragment(html);
        let selector = Selector::parse("img").unwrap();
        let img = doc.select(&selector).next().expect("fixture has an img");
        f(img)
    }

    #[test]
    fn attribute_beats_class_and_url() {
        let found = with_img(
            r#"<img data-id="7" class="wp-image-8" src="https://x.test/media/9/a.jpg">"#,
            |img| media_id(&img),
        );
        assert_eq!(found, Some((7, IdSource::Attribute)));
    }

    #[test]
    fn class_beats_url() {
        let found = with_img(r#"<img class="size-full wp-image-8" src="/media/9/a.jpg">"#, |img| {
            media_id(&img)
        });
        assert_eq!(found, Some((8, IdSource::ClassName)));
    }

    #[test]
    fn url_segment_is_the_last_resort() {
        let found = with_img(r#"<img src="https://x.test/media/9/a.jpg?w=300">"#, |img| media_id(&img));
        assert_eq!(found, Some((9, IdSource::UrlSegment)));
    }

    #[test]
    fn url_segment_matches_date_folders_too() {
        // Known false positive: the month folder reads as an id.
        assert_eq!(numeric_path_segment("/wp-content/uploads/2023/05/cat.jpg"), Some(5));
    }

    #[test]
    fn nothing_numeric_means_no_id() {
        let found = with_img(r#"<img src="/uploads/cat.jpg" alt="cat">"#, |img| media_id(&img));
        assert_eq!(found, None);
    }
}
