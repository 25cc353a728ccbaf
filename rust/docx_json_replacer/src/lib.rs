//! Building blocks for filling DOCX templates from JSON data.
//!
//! The crate does no I/O. It turns placeholder values into things a document
//! writer can insert: formatted text runs parsed from a small subset of inline
//! HTML, plain text for non-rich destinations, and normalized image specs with
//! decoded bytes.

pub mod blocks;
pub mod dimension;
pub mod entities;
pub mod image;
pub mod markers;
pub mod plain_text;
pub mod rich_text;
pub mod value;

pub use dimension::{parse_dimension, parse_dimension_str, Emu};
pub use entities::{decode_entities, xml_escape_text};
pub use image::{
    classify, decode_base64_image, is_image_data, is_image_list_data, process_image_list,
    process_single_image, validate_image_spec, Alignment, DecodeImageError, ImageList,
    ImageSpec, ImageSpecError, ImageValue, Layout,
};
pub use markers::{
    find_inline_images, find_placeholders, has_inline_images, has_markers, split_markers,
    Placeholder, Segment,
};
pub use plain_text::{clean_html_content, InlineMarkers};
pub use rich_text::{has_html_formatting, parse_to_runs, parse_value_to_runs, FormattedRun};
pub use value::{lookup, value_to_text, ReplaceOptions, Replacement};
