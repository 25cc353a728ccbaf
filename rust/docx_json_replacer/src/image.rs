//! Detection, validation and normalization of image values.
//!
//! A single image looks like
//! `{"type": "image", "data": "<base64>", "width": "5cm", "alignment": "center"}`,
//! a list of images like
//! `{"type": "images", "list": [{"data": ...}, ...], "layout": "horizontal"}`.
//! List-level `width`, `height`, `alignment` and `format` act as defaults for
//! the entries.

use base64::Engine;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Cursor;
use thiserror::Error;

use crate::dimension::{parse_dimension, parse_dimension_str, Emu};

pub const DEFAULT_FORMAT: &str = "png";
pub const DEFAULT_SPACING: &str = "0.5cm";

/// Image formats accepted in `format`, with the MIME type of the media part.
pub const SUPPORTED_FORMATS: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("tiff", "image/tiff"),
    ("webp", "image/webp"),
];

pub fn content_type_for(format: &str) -> Option<&'static str> {
    SUPPORTED_FORMATS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(format))
        .map(|&(_, mime)| mime)
}

#[derive(Debug, Error)]
pub enum DecodeImageError {
    #[error("expected a base64 string")]
    NotAString,
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
}

#[derive(Debug, Error)]
pub enum ImageSpecError {
    #[error("image spec must be a mapping")]
    NotAMapping,
    #[error("missing or invalid 'type' field")]
    InvalidType,
    #[error("empty 'data' field")]
    EmptyData,
    #[error("invalid base64 data: {0}")]
    InvalidData(#[source] DecodeImageError),
    #[error("'list' must be an array")]
    ListNotArray,
    #[error("'list' is empty")]
    EmptyList,
    #[error("item {0} in list must be a mapping")]
    ItemNotMapping(usize),
    #[error("item {0} missing 'data' field")]
    ItemMissingData(usize),
    #[error("item {index} has invalid base64 data: {source}")]
    ItemInvalidData {
        index: usize,
        #[source]
        source: DecodeImageError,
    },
    #[error("missing 'data' or 'list' field")]
    MissingDataOrList,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl Alignment {
    /// Case-insensitive parse; anything unrecognized is `Left`.
    pub fn parse_or_default(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "center" => Alignment::Center,
            "right" => Alignment::Right,
            _ => Alignment::Left,
        }
    }

    /// The `w:jc` value for this alignment.
    pub fn as_str(self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Vertical,
    Horizontal,
    Grid,
}

impl Layout {
    /// Case-insensitive parse; anything unrecognized is `Vertical`.
    pub fn parse_or_default(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "horizontal" => Layout::Horizontal,
            "grid" => Layout::Grid,
            _ => Layout::Vertical,
        }
    }
}

/// A normalized single image, ready to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub data: String,
    pub format: String,
    pub width: Option<Emu>,
    pub height: Option<Emu>,
    pub alignment: Alignment,
    /// Decoded image bytes; `None` means there is nothing to insert.
    pub bytes: Option<Vec<u8>>,
}

impl ImageSpec {
    pub fn stream(&self) -> Option<Cursor<&[u8]>> {
        self.bytes.as_deref().map(Cursor::new)
    }

    pub fn has_image(&self) -> bool {
        self.bytes.is_some()
    }

    pub fn content_type(&self) -> Option<&'static str> {
        content_type_for(&self.format)
    }
}

/// A normalized list of images plus how to lay them out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageList {
    pub images: Vec<ImageSpec>,
    pub layout: Layout,
    /// Gap between images, left as the raw dimension string.
    pub spacing: String,
}

impl ImageList {
    pub fn spacing_emu(&self) -> Option<Emu> {
        parse_dimension_str(&self.spacing)
    }
}

/// Result of classifying a data value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageValue {
    NotImage,
    Single(ImageSpec),
    List(ImageList),
}

fn type_field(map: &Map<String, Value>) -> Option<&str> {
    map.get("type").and_then(Value::as_str)
}

/// `{"type": "image", "data": ...}` without a `list` key.
pub fn is_image_data(value: &Value) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    type_field(map) == Some("image") && !map.contains_key("list") && map.contains_key("data")
}

/// `{"type": "image" | "images", "list": [...]}`.
pub fn is_image_list_data(value: &Value) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    matches!(type_field(map), Some("image" | "images"))
        && map.get("list").is_some_and(Value::is_array)
}

/// Classify a value and normalize it if it describes images.
pub fn classify(value: &Value) -> ImageValue {
    match value.as_object() {
        Some(map) if is_image_data(value) => ImageValue::Single(process_single_image(map)),
        Some(map) if is_image_list_data(value) => ImageValue::List(process_image_list(map)),
        _ => ImageValue::NotImage,
    }
}

/// Decode base64 image data, with or without a `data:<mime>;base64,` prefix.
/// Whitespace anywhere in the payload is ignored.
pub fn decode_base64_image(data: &str) -> Result<Vec<u8>, DecodeImageError> {
    let payload = match data.strip_prefix("data:") {
        Some(uri) => uri.split_once(',').map_or(data, |(_, payload)| payload),
        None => data,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}

fn decode_base64_value(value: &Value) -> Result<Vec<u8>, DecodeImageError> {
    match value {
        Value::String(s) => decode_base64_image(s),
        _ => Err(DecodeImageError::NotAString),
    }
}

/// Check an image spec before normalizing it.
pub fn validate_image_spec(spec: &Value) -> Result<(), ImageSpecError> {
    let map = spec.as_object().ok_or(ImageSpecError::NotAMapping)?;

    if !matches!(type_field(map), Some("image" | "images")) {
        return Err(ImageSpecError::InvalidType);
    }

    if let (Some(data), None) = (map.get("data"), map.get("list")) {
        match data {
            Value::Null => return Err(ImageSpecError::EmptyData),
            Value::String(s) if s.is_empty() => return Err(ImageSpecError::EmptyData),
            _ => {}
        }
        decode_base64_value(data).map_err(ImageSpecError::InvalidData)?;
        return Ok(());
    }

    if let Some(list) = map.get("list") {
        let items = list.as_array().ok_or(ImageSpecError::ListNotArray)?;
        if items.is_empty() {
            return Err(ImageSpecError::EmptyList);
        }
        for (index, item) in items.iter().enumerate() {
            let item = item
                .as_object()
                .ok_or(ImageSpecError::ItemNotMapping(index))?;
            let data = item
                .get("data")
                .ok_or(ImageSpecError::ItemMissingData(index))?;
            decode_base64_value(data)
                .map_err(|source| ImageSpecError::ItemInvalidData { index, source })?;
        }
        return Ok(());
    }

    Err(ImageSpecError::MissingDataOrList)
}

/// Normalize one image spec. Undecodable data leaves `bytes` empty.
pub fn process_single_image(spec: &Map<String, Value>) -> ImageSpec {
    let data = spec
        .get("data")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let format = spec
        .get("format")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_FORMAT.to_string());
    let alignment = spec
        .get("alignment")
        .and_then(Value::as_str)
        .map(Alignment::parse_or_default)
        .unwrap_or_default();

    let bytes = if data.is_empty() {
        None
    } else {
        match decode_base64_image(&data) {
            Ok(bytes) if bytes.is_empty() => {
                debug!("image data decoded to zero bytes");
                None
            }
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!("skipping image with undecodable data: {err}");
                None
            }
        }
    };

    ImageSpec {
        data,
        format,
        width: parse_dimension(spec.get("width")),
        height: parse_dimension(spec.get("height")),
        alignment,
        bytes,
    }
}

const INHERITED_FIELDS: [&str; 4] = ["format", "width", "height", "alignment"];

/// Normalize a list of images. Entries without decodable data and entries that
/// are not mappings are dropped; the order of the rest is kept.
pub fn process_image_list(spec: &Map<String, Value>) -> ImageList {
    let layout = spec
        .get("layout")
        .and_then(Value::as_str)
        .map(Layout::parse_or_default)
        .unwrap_or_default();
    let spacing = match spec.get("spacing") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => DEFAULT_SPACING.to_string(),
    };

    let entries = spec
        .get("list")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut images = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let Some(entry) = entry.as_object() else {
            debug!("image list entry {index} is not a mapping, skipping");
            continue;
        };

        let mut merged = Map::new();
        if let Some(data) = entry.get("data") {
            merged.insert("data".to_string(), data.clone());
        }
        for field in INHERITED_FIELDS {
            let value = entry.get(field).or_else(|| spec.get(field));
            if let Some(value) = value {
                merged.insert(field.to_string(), value.clone());
            }
        }

        let image = process_single_image(&merged);
        if image.has_image() {
            images.push(image);
        } else {
            debug!("image list entry {index} has no image data, skipping");
        }
    }

    ImageList {
        images,
        layout,
        spacing,
    }
}
