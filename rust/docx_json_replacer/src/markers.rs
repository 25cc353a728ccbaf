//! `{{dotted.key}}` placeholders and `[dx-img:key]` inline image markers.

use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Range;

lazy_static! {
    static ref RE_INLINE_IMAGE: Regex = Regex::new(r"\[dx-img:([^\]]+)\]").unwrap();
    static ref RE_PLACEHOLDER: Regex = Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").unwrap();
    static ref RE_ANY_MARKER: Regex =
        Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}|\[dx-img:([^\]]+)\]").unwrap();
}

/// A `{{key}}` occurrence in a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub key: String,
    /// Byte range of the whole token, braces included.
    pub span: Range<usize>,
}

/// Text split at markers, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Placeholder { key: &'a str, raw: &'a str },
    InlineImage { key: &'a str, raw: &'a str },
}

pub fn has_inline_images(text: &str) -> bool {
    RE_INLINE_IMAGE.is_match(text)
}

/// Keys of all `[dx-img:key]` markers in `text`.
pub fn find_inline_images(text: &str) -> Vec<String> {
    RE_INLINE_IMAGE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

pub fn has_placeholders(text: &str) -> bool {
    find_placeholders(text).next().is_some()
}

/// All `{{key}}` placeholders with a non-empty key.
pub fn find_placeholders(text: &str) -> impl Iterator<Item = Placeholder> + '_ {
    RE_PLACEHOLDER.captures_iter(text).filter_map(|caps| {
        let whole = caps.get(0)?;
        let key = caps.get(1)?.as_str();
        (!key.is_empty()).then(|| Placeholder {
            key: key.to_string(),
            span: whole.range(),
        })
    })
}

/// Whether `text` contains anything [`split_markers`] would pick out.
pub fn has_markers(text: &str) -> bool {
    has_placeholders(text) || has_inline_images(text)
}

/// Split `text` into literal text, placeholders and inline image markers.
/// Empty placeholders (`{{}}`) stay literal text.
pub fn split_markers(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut cursor = 0usize;

    for caps in RE_ANY_MARKER.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let marker = if let Some(key) = caps.get(1) {
            if key.as_str().is_empty() {
                continue;
            }
            Segment::Placeholder {
                key: key.as_str(),
                raw: whole.as_str(),
            }
        } else if let Some(key) = caps.get(2) {
            Segment::InlineImage {
                key: key.as_str(),
                raw: whole.as_str(),
            }
        } else {
            continue;
        };

        if whole.start() > cursor {
            segments.push(Segment::Text(&text[cursor..whole.start()]));
        }
        segments.push(marker);
        cursor = whole.end();
    }

    if cursor < text.len() {
        segments.push(Segment::Text(&text[cursor..]));
    }
    segments
}
