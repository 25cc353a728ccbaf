//! HTML to plain text, for destinations that cannot take formatted runs.

use lazy_static::lazy_static;
use regex::Regex;

use crate::blocks::flatten_blocks;
use crate::entities::decode_entities;

lazy_static! {
    static ref RE_INLINE_SPACE: Regex = Regex::new(r"[ \t]+").unwrap();
    static ref RE_P_OPEN: Regex = Regex::new(r"(?i)<p(\s[^>]*)?>").unwrap();
    static ref RE_P_CLOSE: Regex = Regex::new(r"(?i)</p\s*>").unwrap();
    static ref RE_BR: Regex = Regex::new(r"(?i)<br[^>]*>").unwrap();
    static ref RE_ANY_TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref RE_BLANK_LINES: Regex = Regex::new(r"\n\s*\n\s*\n").unwrap();

    // (pattern, replacement) pairs for the Markdown-style markers, applied in order.
    static ref MARKDOWN_RULES: Vec<(Regex, String)> = {
        let wrap = |tag: &str, marker: &str| {
            (
                Regex::new(&format!(r"(?is)<{tag}(\s[^>]*)?>(.*?)</{tag}\s*>")).unwrap(),
                format!("{marker}${{2}}{marker}"),
            )
        };
        let mut rules = vec![wrap("b", "**"), wrap("strong", "**")];
        for level in 1..=6 {
            rules.push((
                Regex::new(&format!(r"(?is)<h{level}(\s[^>]*)?>(.*?)</h{level}\s*>")).unwrap(),
                "\n\n**${2}**\n".to_string(),
            ));
        }
        rules.extend([wrap("i", "*"), wrap("em", "*"), wrap("u", "_")]);
        rules
    };
}

/// How inline formatting is rendered in plain text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InlineMarkers {
    /// Formatting is dropped.
    #[default]
    Plain,
    /// `**bold**`, `*italic*`, `_underline_`, headings as bold lines.
    Markdown,
}

fn apply_markers(html: String, markers: InlineMarkers) -> String {
    match markers {
        InlineMarkers::Plain => html,
        InlineMarkers::Markdown => MARKDOWN_RULES
            .iter()
            .fold(html, |acc, (re, rep)| re.replace_all(&acc, rep.as_str()).into_owned()),
    }
}

/// Convert HTML into plain text, keeping tables, lists and paragraphs readable.
pub fn clean_html_content(html: &str, markers: InlineMarkers) -> String {
    let text = RE_INLINE_SPACE.replace_all(html, " ");
    let text = flatten_blocks(&text);
    let text = apply_markers(text, markers);

    let text = RE_P_OPEN.replace_all(&text, "\n\n");
    let text = RE_P_CLOSE.replace_all(&text, "");
    let text = RE_BR.replace_all(&text, "\n");
    let text = RE_ANY_TAG.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = RE_BLANK_LINES.replace_all(&text, "\n\n");

    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
