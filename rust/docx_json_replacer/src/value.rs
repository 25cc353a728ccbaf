//! Resolving placeholder keys against JSON data and deciding how a value is
//! rendered.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::blocks::flatten_blocks;
use crate::image::{classify, ImageList, ImageSpec, ImageValue};
use crate::plain_text::{clean_html_content, InlineMarkers};
use crate::rich_text::{has_html_formatting, parse_to_runs, FormattedRun};

lazy_static! {
    static ref RE_LOOKS_LIKE_HTML: Regex = Regex::new(r"</?[a-zA-Z][^>]*>").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOptions {
    /// Interpret HTML in string values. When off, strings are inserted verbatim.
    pub html: bool,
}

impl Default for ReplaceOptions {
    fn default() -> Self {
        Self { html: true }
    }
}

/// What a placeholder is replaced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement {
    Text(String),
    Rich(Vec<FormattedRun>),
    Image(ImageSpec),
    Images(ImageList),
}

impl Replacement {
    pub fn from_value(value: &Value, options: &ReplaceOptions) -> Self {
        match classify(value) {
            ImageValue::Single(image) => return Replacement::Image(image),
            ImageValue::List(list) => return Replacement::Images(list),
            ImageValue::NotImage => {}
        }

        match value {
            Value::String(s) if options.html && has_html_formatting(s) => {
                Replacement::Rich(parse_to_runs(&flatten_blocks(s)))
            }
            Value::String(s) if options.html && RE_LOOKS_LIKE_HTML.is_match(s) => {
                Replacement::Text(clean_html_content(s, InlineMarkers::Plain))
            }
            other => Replacement::Text(value_to_text(other)),
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Replacement::Image(_) | Replacement::Images(_))
    }
}

/// Look up `key` in `data`.
///
/// An exact top-level key wins (`{"input.name": ...}`); otherwise the key is
/// walked segment by segment through objects and array indices.
pub fn lookup<'a>(data: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(found) = data.as_object().and_then(|map| map.get(key)) {
        return Some(found);
    }

    key.split('.').try_fold(data, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Best-effort text for any value.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
