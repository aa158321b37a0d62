//! Plain-text cleanup for titles, excerpts and descriptions.

use scraper::Html;

/// Strips tags and decodes named and numeric entities, then trims.
///
/// Goes through the HTML parser rather than a regex so that `&amp;`,
/// `&#8217;` and friends come out exactly as a browser would render them.
pub fn plain_text(html: &str) -> String {
    if !html.contains(['<', '&']) {
        return html.trim().to_string();
    }
    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect();
    text.trim().to_string()
}

/// [`plain_text`] for optional fields, mapping blank results to `None`.
pub fn plain_text_opt(html: Option<&str>) -> Option<String> {
    html.map(plain_text).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_entities_and_strips_tags() {
        assert_eq!(plain_text("Tom &amp; Jerry&#8217;s <em>big</em> day"), "Tom & Jerry\u{2019}s big day");
        assert_eq!(plain_text("<p>\n  Hello &quot;world&quot;\n</p>"), "Hello \"world\"");
    }

    #[test]
    fn plain_input_is_only_trimmed() {
        assert_eq!(plain_text("  hi  "), "hi");
    }

    #[test]
    fn blank_optional_text_becomes_none() {
        assert_eq!(plain_text_opt(Some("<p> </p>")), None);
        assert_eq!(plain_text_opt(None), None);
        assert_eq!(plain_text_opt(Some("x")), Some("x".to_string()));
    }
}
