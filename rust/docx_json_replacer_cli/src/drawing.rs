//! Embedding decoded images into a package part as inline drawings.

use anyhow::Result;
use docx_json_replacer::{Emu, ImageSpec};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use std::collections::HashSet;
use std::io::Cursor;

use crate::package::{DocxPackage, IMAGE_REL_TYPE};

lazy_static! {
    static ref RE_DOC_PR_ID: Regex = Regex::new(r#"<wp:docPr\b[^>]*?\bid="(\d+)""#).unwrap();
}

/// Widest image sized from its pixels, about 15cm of text column.
pub const MAX_AUTO_WIDTH: i64 = 5_486_400;
const FALLBACK_EXTENT: (i64, i64) = (4_000_000, 3_000_000);

const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Pixel size of an encoded image, read from its header only.
fn pixel_size(bytes: &[u8]) -> Option<(u32, u32)> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    match reader.into_dimensions() {
        Ok((w, h)) if w > 0 && h > 0 => Some((w, h)),
        Ok(_) => None,
        Err(err) => {
            debug!("cannot read image size: {err}");
            None
        }
    }
}

fn scale(value: i64, num: u32, den: u32) -> i64 {
    (value as f64 * f64::from(num) / f64::from(den)).round() as i64
}

/// Final extent in EMU: explicit sizes win, a single given side keeps the
/// aspect ratio, and a missing size comes from the pixels at 96 DPI.
pub fn image_extent(spec: &ImageSpec, bytes: &[u8]) -> (i64, i64) {
    let width = spec.width.map(Emu::get).filter(|v| *v > 0);
    let height = spec.height.map(Emu::get).filter(|v| *v > 0);

    match (width, height, pixel_size(bytes)) {
        (Some(w), Some(h), _) => (w, h),
        (Some(w), None, Some((pw, ph))) => (w, scale(w, ph, pw)),
        (None, Some(h), Some((pw, ph))) => (scale(h, pw, ph), h),
        (None, None, Some((pw, ph))) => {
            let (w, h) = (Emu::from_px(pw.into()).get(), Emu::from_px(ph.into()).get());
            if w > MAX_AUTO_WIDTH {
                (MAX_AUTO_WIDTH, scale(MAX_AUTO_WIDTH, ph, pw))
            } else {
                (w, h)
            }
        }
        (Some(w), None, None) => (w, scale(w, FALLBACK_EXTENT.1 as u32, FALLBACK_EXTENT.0 as u32)),
        (None, Some(h), None) => (scale(h, FALLBACK_EXTENT.0 as u32, FALLBACK_EXTENT.1 as u32), h),
        (None, None, None) => FALLBACK_EXTENT,
    }
}

/// File extension and MIME type for the media part.
pub fn media_kind(spec: &ImageSpec, bytes: &[u8]) -> (String, &'static str) {
    if let Some(mime) = spec.content_type() {
        return (spec.format.to_ascii_lowercase(), mime);
    }
    match image::guess_format(bytes) {
        Ok(format) => {
            let ext = format.extensions_str().first().copied().unwrap_or("png");
            (ext.to_string(), format.to_mime_type())
        }
        Err(_) => {
            warn!("unknown image format '{}', storing as png", spec.format);
            ("png".to_string(), "image/png")
        }
    }
}

/// Gaps around an inline drawing, in EMU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Distance {
    pub bottom: i64,
    pub right: i64,
}

/// An image registered with a part, ready to be referenced from a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embedded {
    pub rel_id: String,
    pub doc_pr_id: u32,
    pub file_name: String,
    pub cx: i64,
    pub cy: i64,
}

impl Embedded {
    /// `<w:drawing>` element holding the image inline.
    pub fn drawing_xml(&self, dist: Distance) -> String {
        let Embedded {
            rel_id,
            doc_pr_id,
            file_name,
            cx,
            cy,
        } = self;
        format!(
            r#"<w:drawing><wp:inline xmlns:wp="{NS_WP}" distT="0" distB="{b}" distL="0" distR="{r}"><wp:extent cx="{cx}" cy="{cy}"/><wp:effectExtent l="0" t="0" r="0" b="0"/><wp:docPr id="{doc_pr_id}" name="Picture {doc_pr_id}"/><wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="{NS_A}" noChangeAspect="1"/></wp:cNvGraphicFramePr><a:graphic xmlns:a="{NS_A}"><a:graphicData uri="{NS_PIC}"><pic:pic xmlns:pic="{NS_PIC}"><pic:nvPicPr><pic:cNvPr id="0" name="{file_name}"/><pic:cNvPicPr/></pic:nvPicPr><pic:blipFill><a:blip xmlns:r="{NS_R}" r:embed="{rel_id}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill><pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing>"#,
            b = dist.bottom,
            r = dist.right,
        )
    }
}

/// Package-wide counters for media names and drawing ids.
#[derive(Debug)]
pub struct MediaCounter {
    next_image: usize,
    next_doc_pr: u32,
    taken: HashSet<String>,
}

impl MediaCounter {
    pub fn from_package(package: &DocxPackage) -> Self {
        let taken: HashSet<String> = package.names().map(str::to_string).collect();
        let mut max_doc_pr = 0u32;
        for name in package.names().filter(|n| n.ends_with(".xml")) {
            let Some(xml) = package.get(name) else {
                continue;
            };
            let xml = String::from_utf8_lossy(xml);
            for caps in RE_DOC_PR_ID.captures_iter(&xml) {
                if let Ok(id) = caps[1].parse::<u32>() {
                    max_doc_pr = max_doc_pr.max(id);
                }
            }
        }
        Self {
            next_image: 1,
            next_doc_pr: max_doc_pr.saturating_add(1),
            taken,
        }
    }

    fn media_path(&mut self, ext: &str) -> (String, String) {
        loop {
            let file_name = format!("image_dx{}.{ext}", self.next_image);
            self.next_image += 1;
            let path = format!("word/media/{file_name}");
            if self.taken.insert(path.clone()) {
                return (file_name, path);
            }
        }
    }

    fn doc_pr_id(&mut self) -> u32 {
        let id = self.next_doc_pr;
        self.next_doc_pr = self.next_doc_pr.saturating_add(1);
        id
    }
}

#[derive(Debug)]
struct PendingMedia {
    path: String,
    bytes: Vec<u8>,
    ext: String,
    content_type: &'static str,
    rel_id: String,
    target: String,
}

/// Images added to one part while it is being rewritten.
#[derive(Debug)]
pub struct PartImages<'a> {
    part: String,
    counter: &'a mut MediaCounter,
    used_rel_ids: HashSet<String>,
    next_rel: usize,
    pending: Vec<PendingMedia>,
}

impl<'a> PartImages<'a> {
    pub fn new(part: &str, counter: &'a mut MediaCounter, used_rel_ids: Vec<String>) -> Self {
        Self {
            part: part.to_string(),
            counter,
            used_rel_ids: used_rel_ids.into_iter().collect(),
            next_rel: 1,
            pending: Vec::new(),
        }
    }

    fn rel_id(&mut self) -> String {
        loop {
            let id = format!("rIdDx{}", self.next_rel);
            self.next_rel += 1;
            if self.used_rel_ids.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Register the image's bytes; `None` when the spec carries no image.
    pub fn embed(&mut self, spec: &ImageSpec) -> Option<Embedded> {
        let bytes = spec.bytes.as_deref()?;
        let (cx, cy) = image_extent(spec, bytes);
        let (ext, content_type) = media_kind(spec, bytes);
        let (file_name, path) = self.counter.media_path(&ext);
        let rel_id = self.rel_id();
        let doc_pr_id = self.counter.doc_pr_id();
        debug!("{}: embedding {path} ({cx}x{cy} EMU) as {rel_id}", self.part);

        self.pending.push(PendingMedia {
            path,
            bytes: bytes.to_vec(),
            ext,
            content_type,
            rel_id: rel_id.clone(),
            target: format!("media/{file_name}"),
        });
        Some(Embedded {
            rel_id,
            doc_pr_id,
            file_name,
            cx,
            cy,
        })
    }

    /// Write media parts, relationships and content types into the package.
    pub fn commit(self, package: &mut DocxPackage) -> Result<()> {
        let mut rels = Vec::with_capacity(self.pending.len());
        for media in self.pending {
            package.ensure_default_content_type(&media.ext, media.content_type)?;
            package.put(&media.path, media.bytes);
            rels.push((media.rel_id, IMAGE_REL_TYPE, media.target));
        }
        package.add_relationships(&self.part, &rels)
    }
}
