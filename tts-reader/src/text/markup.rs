//! Markdown stripping
//!
//! Removes markdown/Obsidian syntax so the engine reads prose, not markup.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static FRONTMATTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\A---.*?---\n?").unwrap());
static CODE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`\n]+`").unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s+").unwrap());
static HORIZONTAL_RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^---+$").unwrap());
static BLOCKQUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^>[ \t]?").unwrap());
static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^([ \t]*[-*+]|[ \t]*\d+\.)[ \t]+").unwrap());
static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
static WIKI_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\]|]+)\|?([^\]]*)\]\]").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

// No backreferences in `regex`, so each emphasis marker gets its own pattern,
// longest first.
static EMPHASIS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\*\*\*(.+?)\*\*\*",
        r"\*\*(.+?)\*\*",
        r"\*(.+?)\*",
        r"___(.+?)___",
        r"__(.+?)__",
        r"_(.+?)_",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Strip markdown syntax, keeping the readable text.
pub fn strip_markdown(text: &str) -> String {
    let text = FRONTMATTER.replace(text, "");
    let text = CODE_BLOCK.replace_all(&text, "");
    let text = INLINE_CODE.replace_all(&text, "");
    let text = HEADING.replace_all(&text, "");
    let text = HORIZONTAL_RULE.replace_all(&text, "");
    let text = BLOCKQUOTE.replace_all(&text, "");
    let text = LIST_MARKER.replace_all(&text, "");
    let text = IMAGE.replace_all(&text, "");
    let text = WIKI_LINK.replace_all(&text, |caps: &Captures| {
        let alias = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        if alias.is_empty() {
            caps[1].to_string()
        } else {
            alias.to_string()
        }
    });
    let mut text = LINK.replace_all(&text, "$1").into_owned();

    for pattern in EMPHASIS.iter() {
        text = pattern.replace_all(&text, "$1").into_owned();
    }

    let text = HTML_TAG.replace_all(&text, "");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontmatter_and_headings() {
        let input = "---\ntitle: Note\ntags: [a]\n---\n# Heading\nBody text.";
        assert_eq!(strip_markdown(input), "Heading\nBody text.");
    }

    #[test]
    fn test_emphasis_keeps_inner_text() {
        assert_eq!(
            strip_markdown("This is **bold**, *italic* and ***both***."),
            "This is bold, italic and both."
        );
        assert_eq!(strip_markdown("__under__ and _score_"), "under and score");
    }

    #[test]
    fn test_links_keep_display_text() {
        assert_eq!(
            strip_markdown("See [the docs](https://example.com) now."),
            "See the docs now."
        );
        assert_eq!(
            strip_markdown("Go to [[Some Page]] or [[Other Page|alias]]."),
            "Go to Some Page or alias."
        );
    }

    #[test]
    fn test_images_removed_entirely() {
        assert_eq!(strip_markdown("Look ![diagram](img.png) here."), "Look  here.");
    }

    #[test]
    fn test_code_removed() {
        let input = "Before.\n```rust\nfn main() {}\n```\nAfter `inline` done.";
        assert_eq!(strip_markdown(input), "Before.\n\nAfter  done.");
    }

    #[test]
    fn test_lists_quotes_rules_and_html() {
        let input = "- first\n* second\n1. third\n> quoted\n---\n<b>tag</b> text";
        assert_eq!(
            strip_markdown(input),
            "first\nsecond\nthird\nquoted\n\ntag text"
        );
    }

    #[test]
    fn test_collapses_blank_lines() {
        assert_eq!(strip_markdown("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_plain_text_untouched() {
        let input = "Just a plain sentence. Another one!";
        assert_eq!(strip_markdown(input), input);
    }
}
