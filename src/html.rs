//! HTML cleaning for harvested free text.
//!
//! Source descriptions frequently carry markup. Search documents keep two
//! renditions: plain text ([`strip_tags`]) for matching and a restricted
//! formatting subset ([`clean`]) for display.

use html_escape::decode_html_entities;
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Tags kept by [`clean`]; attributes are always dropped.
const ALLOWED_TAGS: [&str; 10] = ["b", "strong", "i", "em", "u", "p", "br", "ul", "ol", "li"];

/// Tags that separate words when removed.
const BLOCK_TAGS: [&str; 14] = [
    "br", "p", "div", "li", "ul", "ol", "tr", "td", "h1", "h2", "h3", "h4", "h5", "h6",
];

fn script_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>").ok())
        .as_ref()
}

fn tag_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)<\s*(/?)\s*([a-zA-Z][a-zA-Z0-9]*)\b[^>]*>|<!--.*?-->").ok())
        .as_ref()
}

fn tag_name(caps: &Captures<'_>) -> Option<String> {
    caps.get(2).map(|m| m.as_str().to_ascii_lowercase())
}

/// Removes all markup and decodes named and numeric entities.
pub fn strip_tags(input: &str) -> String {
    let (Some(scripts), Some(tags)) = (script_pattern(), tag_pattern()) else {
        return collapse_whitespace(input);
    };

    let without_scripts = scripts.replace_all(input, " ");
    let text = tags.replace_all(&without_scripts, |caps: &Captures<'_>| {
        match tag_name(caps) {
            Some(name) if BLOCK_TAGS.contains(&name.as_str()) => " ",
            _ => "",
        }
    });
    collapse_whitespace(&decode_html_entities(&text))
}

/// Keeps basic formatting tags (without attributes) and removes the rest.
pub fn clean(input: &str) -> String {
    let (Some(scripts), Some(tags)) = (script_pattern(), tag_pattern()) else {
        return input.trim().to_string();
    };

    let without_scripts = scripts.replace_all(input, "");
    tags.replace_all(&without_scripts, |caps: &Captures<'_>| match tag_name(caps) {
        Some(name) if ALLOWED_TAGS.contains(&name.as_str()) => {
            let closing = caps.get(1).map_or("", |m| m.as_str());
            format!("<{closing}{name}>")
        }
        _ => String::new(),
    })
    .trim()
    .to_string()
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
