//! String rewrites applied to raw HTML before it is parsed.

use std::sync::LazyLock;

use regex::Regex;

static SHORTCODE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([A-Za-z][\w-]*)(?:\s[^\[\]]*)?/?\]").unwrap());
static SHORTCODE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[/[A-Za-z][\w-]*\]").unwrap());
static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--\s*/?wp:.*?-->").unwrap());

/// Runs every pre-parse rewrite in order.
pub fn preprocess(html: &str) -> String {
    strip_block_comments(&strip_shortcodes(html))
}

/// Removes bracketed shortcodes.
///
/// `[tag attrs]inner[/tag]` keeps `inner` (itself stripped recursively).
/// Self-closing `[tag /]`, openers without a matching closer and stray
/// closers are removed outright.
pub fn strip_shortcodes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(caps) = SHORTCODE_OPEN.captures(rest) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        out.push_str(&rest[..whole.start()]);
        let after = &rest[whole.end()..];

        if whole.as_str().ends_with("/]") {
            rest = after;
            continue;
        }

        let closer = format!("[/{}]", name.as_str());
        match after.find(&closer) {
            Some(pos) => {
                out.push_str(&strip_shortcodes(&after[..pos]));
                rest = &after[pos + closer.len()..];
            }
            None => rest = after,
        }
    }
    out.push_str(rest);

    SHORTCODE_CLOSE.replace_all(&out, "").into_owned()
}

/// Removes `<!-- wp:… -->` / `<!-- /wp:… -->` block annotations. Other
/// comments are left for the parser, which drops them.
pub fn strip_block_comments(input: &str) -> String {
    BLOCK_COMMENT.replace_all(input, "").into_owned()
}
