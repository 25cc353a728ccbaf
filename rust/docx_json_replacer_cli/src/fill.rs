//! Rewriting paragraphs of a package part with data values.

use anyhow::{bail, Context, Result};
use docx_json_replacer::image::DEFAULT_SPACING;
use docx_json_replacer::{
    has_markers, lookup, parse_dimension_str, split_markers, validate_image_spec, Alignment,
    xml_escape_text, FormattedRun, Layout, ReplaceOptions, Replacement, Segment,
};
use log::{debug, info, warn};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::Value;
use std::ops::{AddAssign, Range};

use crate::drawing::{Distance, MediaCounter, PartImages};
use crate::package::{is_fillable_part, DocxPackage};
use crate::xml::{
    merge_ordered, nodes_to_string, write_events, Events, Node, PPR_ORDER, RPR_ORDER,
};

/// Run children that make a run more than plain text. Such runs are kept as is.
const OPAQUE_RUN_CHILDREN: &[&[u8]] = &[
    b"w:drawing",
    b"w:pict",
    b"w:object",
    b"w:fldChar",
    b"w:instrText",
    b"w:sym",
    b"w:ptab",
    b"w:ruby",
    b"w:footnoteReference",
    b"w:endnoteReference",
    b"w:footnoteRef",
    b"w:endnoteRef",
    b"w:commentReference",
    b"w:separator",
    b"w:continuationSeparator",
    b"mc:AlternateContent",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub replace: ReplaceOptions,
    /// Abort on an image value that fails validation instead of dropping it.
    pub strict_images: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub paragraphs: usize,
    pub replaced: usize,
    pub unresolved: usize,
    pub images: usize,
    pub skipped_images: usize,
}

impl AddAssign for Stats {
    fn add_assign(&mut self, other: Self) {
        self.paragraphs += other.paragraphs;
        self.replaced += other.replaced;
        self.unresolved += other.unresolved;
        self.images += other.images;
        self.skipped_images += other.skipped_images;
    }
}

/// Fill every part that can hold placeholders.
pub fn fill_package(package: &mut DocxPackage, data: &Value, options: &Options) -> Result<Stats> {
    let parts: Vec<String> = package
        .names()
        .filter(|name| is_fillable_part(name))
        .map(str::to_string)
        .collect();
    let mut counter = MediaCounter::from_package(package);
    let mut total = Stats::default();

    for part in parts {
        let Some(xml) = package.get_str(&part)? else {
            continue;
        };
        let used_ids = package.relationship_ids(&part)?;
        let mut filler = PartFiller {
            data,
            options,
            images: PartImages::new(&part, &mut counter, used_ids),
            stats: Stats::default(),
        };
        let rewritten = filler
            .rewrite_part(&xml)
            .with_context(|| format!("rewrite {part}"))?;
        let PartFiller { images, stats, .. } = filler;

        if let Some(rewritten) = rewritten {
            package.put(&part, rewritten.into_bytes());
        }
        images.commit(package)?;
        if stats.paragraphs > 0 {
            info!(
                "{part}: {} paragraphs, {} replaced, {} unresolved, {} images",
                stats.paragraphs, stats.replaced, stats.unresolved, stats.images
            );
        }
        total += stats;
    }
    Ok(total)
}

/// One part's worth of replacement state.
pub struct PartFiller<'a, 'm> {
    pub data: &'a Value,
    pub options: &'a Options,
    pub images: PartImages<'m>,
    pub stats: Stats,
}

/// Output pieces; `source` indexes the template run whose `w:rPr` they take.
#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Run { run: FormattedRun, source: usize },
    Break { source: usize },
    Drawing { xml: String, source: usize },
}

#[derive(Debug, Default)]
struct Rendered {
    pieces: Vec<Piece>,
    /// Source run for pieces pushed next.
    source: usize,
    first_alignment: Option<Alignment>,
    has_text: bool,
    has_image: bool,
}

impl Rendered {
    /// Append a run, merging it into the previous one when it has the same
    /// formatting and source run.
    fn push_run(&mut self, run: FormattedRun) {
        if !run.text.trim().is_empty() {
            self.has_text = true;
        }
        if let Some(Piece::Run { run: prev, source }) = self.pieces.last_mut() {
            if *source == self.source
                && (prev.bold, prev.italic, prev.underline) == (run.bold, run.italic, run.underline)
            {
                prev.text.push_str(&run.text);
                return;
            }
        }
        self.pieces.push(Piece::Run {
            run,
            source: self.source,
        });
    }

    fn text(&mut self, text: impl Into<String>) {
        self.push_run(FormattedRun::plain(text));
    }

    fn push_break(&mut self) {
        self.pieces.push(Piece::Break {
            source: self.source,
        });
    }

    fn push_drawing(&mut self, xml: String) {
        self.has_image = true;
        self.pieces.push(Piece::Drawing {
            xml,
            source: self.source,
        });
    }

    /// `w:jc` for a paragraph made only of images.
    fn alignment(&self) -> Option<Alignment> {
        if self.has_image && !self.has_text {
            self.first_alignment
        } else {
            None
        }
    }
}

enum Child {
    Properties,
    TextRun { text: String, rpr: Vec<Node> },
    Other,
}

/// Byte ranges of the paragraph text contributed by each non-empty text run.
#[derive(Debug, Default)]
struct SourceRuns<'p> {
    runs: Vec<(Range<usize>, &'p [Node])>,
}

impl<'p> SourceRuns<'p> {
    fn push(&mut self, range: Range<usize>, rpr: &'p [Node]) {
        if !range.is_empty() {
            self.runs.push((range, rpr));
        }
    }

    /// Index of the run holding byte `offset`.
    fn at(&self, offset: usize) -> usize {
        self.runs
            .partition_point(|(range, _)| range.end <= offset)
            .min(self.runs.len().saturating_sub(1))
    }

    fn end_of(&self, index: usize) -> Option<usize> {
        self.runs.get(index).map(|(range, _)| range.end)
    }

    fn rpr(&self, index: usize) -> &'p [Node] {
        self.runs.get(index).map(|(_, rpr)| *rpr).unwrap_or_default()
    }
}

fn is_break(e: &BytesStart) -> bool {
    !e.attributes().flatten().any(|attr| {
        attr.key.as_ref() == b"w:type" && attr.value.as_ref() != b"textWrapping"
    })
}

/// Plain text of a run, or `None` if the run holds anything besides text.
fn run_text(run: &Node) -> Result<Option<String>> {
    if run.contains(|name| OPAQUE_RUN_CHILDREN.iter().any(|opaque| *opaque == name)) {
        return Ok(None);
    }
    let mut text = String::new();
    let mut in_text = false;
    for ev in run.inner() {
        match ev {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) if e.name().as_ref() == b"w:t" => in_text = false,
            Event::Text(t) if in_text => text.push_str(&t.unescape()?),
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" if is_break(e) => text.push('\n'),
                b"w:br" => return Ok(None),
                _ => {}
            },
            _ => {}
        }
    }
    Ok(Some(text))
}

fn classify_child(child: &Node) -> Result<Child> {
    if child.is("w:pPr") {
        return Ok(Child::Properties);
    }
    if !child.is("w:r") {
        return Ok(Child::Other);
    }
    Ok(match run_text(child)? {
        Some(text) => Child::TextRun {
            text,
            rpr: child
                .child("w:rPr")
                .map(|rpr| rpr.children())
                .unwrap_or_default(),
        },
        None => Child::Other,
    })
}

fn run_properties_xml(base: &[Node], run: &FormattedRun) -> Result<String> {
    let mut remove = Vec::new();
    let mut add = Vec::new();
    if run.bold {
        remove.push("w:b");
        add.push(Node::empty("w:b", &[]));
    }
    if run.italic {
        remove.push("w:i");
        add.push(Node::empty("w:i", &[]));
    }
    if run.underline {
        remove.push("w:u");
        add.push(Node::empty("w:u", &[("w:val", "single")]));
    }
    let merged = merge_ordered(base, &remove, add, RPR_ORDER);
    if merged.is_empty() {
        return Ok(String::new());
    }
    Ok(format!("<w:rPr>{}</w:rPr>", nodes_to_string(&merged)?))
}

/// Run content for text: newlines become `w:br`, tabs `w:tab`.
fn text_content_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 32);
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push_str("<w:br/>");
        }
        for (j, piece) in line.split('\t').enumerate() {
            if j > 0 {
                out.push_str("<w:tab/>");
            }
            if !piece.is_empty() {
                out.push_str(r#"<w:t xml:space="preserve">"#);
                out.push_str(&xml_escape_text(piece));
                out.push_str("</w:t>");
            }
        }
    }
    out
}

fn pieces_xml(sources: &SourceRuns<'_>, pieces: &[Piece]) -> Result<String> {
    let plain = FormattedRun::default();
    let mut body = String::new();
    for piece in pieces {
        match piece {
            Piece::Run { run, source } => {
                if run.text.is_empty() {
                    continue;
                }
                body.push_str("<w:r>");
                body.push_str(&run_properties_xml(sources.rpr(*source), run)?);
                body.push_str(&text_content_xml(&run.text));
                body.push_str("</w:r>");
            }
            Piece::Break { source } => {
                body.push_str("<w:r>");
                body.push_str(&run_properties_xml(sources.rpr(*source), &plain)?);
                body.push_str("<w:br/></w:r>");
            }
            Piece::Drawing { xml, source } => {
                body.push_str("<w:r>");
                body.push_str(&run_properties_xml(sources.rpr(*source), &plain)?);
                body.push_str(xml);
                body.push_str("</w:r>");
            }
        }
    }
    Ok(body)
}

fn write_raw(writer: &mut Writer<Vec<u8>>, xml: &str) -> Result<()> {
    writer.write_event(Event::Text(BytesText::from_escaped(xml)))?;
    Ok(())
}

/// Paragraph properties with `w:jc` set, keeping every other setting.
fn write_aligned_properties(
    writer: &mut Writer<Vec<u8>>,
    ppr: Option<&Node>,
    alignment: Alignment,
) -> Result<()> {
    let children = ppr.map(Node::children).unwrap_or_default();
    let jc = Node::empty("w:jc", &[("w:val", alignment.as_str())]);
    let merged = merge_ordered(&children, &["w:jc"], vec![jc], PPR_ORDER);

    let start = match ppr.and_then(|n| n.events.first()) {
        Some(Event::Start(e) | Event::Empty(e)) => e.clone(),
        _ => BytesStart::new("w:pPr"),
    };
    writer.write_event(Event::Start(start))?;
    for node in &merged {
        write_events(writer, &node.events)?;
    }
    writer.write_event(Event::End(BytesEnd::new("w:pPr")))?;
    Ok(())
}

impl PartFiller<'_, '_> {
    /// Rewrite every paragraph with markers. `None` when nothing changed.
    pub fn rewrite_part(&mut self, xml: &str) -> Result<Option<String>> {
        let mut reader = Reader::from_str(xml);
        let mut writer = Writer::new(Vec::with_capacity(xml.len()));
        let mut paragraph: Option<Events> = None;
        let mut depth = 0usize;
        let mut changed = false;

        loop {
            let event = reader
                .read_event()
                .with_context(|| format!("malformed XML at byte {}", reader.buffer_position()))?;
            if matches!(event, Event::Eof) {
                break;
            }
            let is_p = |e: &BytesStart| e.name().as_ref() == b"w:p";

            if let Some(events) = paragraph.as_mut() {
                match &event {
                    Event::Start(e) if is_p(e) => depth += 1,
                    Event::End(e) if e.name().as_ref() == b"w:p" => depth -= 1,
                    _ => {}
                }
                events.push(event.into_owned());
                if depth == 0 {
                    if let Some(events) = paragraph.take() {
                        changed |= self.rewrite_paragraph(events, &mut writer)?;
                    }
                }
            } else if matches!(&event, Event::Start(e) if is_p(e)) {
                depth = 1;
                paragraph = Some(vec![event.into_owned()]);
            } else {
                writer.write_event(event)?;
            }
        }

        if let Some(events) = paragraph {
            write_events(&mut writer, &events)?;
        }
        if !changed {
            return Ok(None);
        }
        Ok(Some(String::from_utf8(writer.into_inner())?))
    }

    fn rewrite_paragraph(&mut self, events: Events, writer: &mut Writer<Vec<u8>>) -> Result<bool> {
        let paragraph = Node { events };
        let children = paragraph.children();
        let kinds = children
            .iter()
            .map(classify_child)
            .collect::<Result<Vec<_>>>()?;

        let mut text = String::new();
        let mut sources = SourceRuns::default();
        for kind in &kinds {
            if let Child::TextRun { text: t, rpr } = kind {
                let start = text.len();
                text.push_str(t);
                sources.push(start..text.len(), rpr);
            }
        }
        if !has_markers(&text) {
            write_events(writer, &paragraph.events)?;
            return Ok(false);
        }

        let rendered = self.render(&text, &sources)?;
        let body = pieces_xml(&sources, &rendered.pieces)?;
        let alignment = rendered.alignment();
        let (Some(open), Some(close)) = (paragraph.events.first(), paragraph.events.last()) else {
            return Ok(false);
        };

        writer.write_event(open)?;
        let has_ppr = kinds.iter().any(|k| matches!(k, Child::Properties));
        if let (Some(alignment), false) = (alignment, has_ppr) {
            write_aligned_properties(writer, None, alignment)?;
        }
        let mut body_written = false;
        for (child, kind) in children.iter().zip(&kinds) {
            match kind {
                Child::Properties => match alignment {
                    Some(alignment) => write_aligned_properties(writer, Some(child), alignment)?,
                    None => write_events(writer, &child.events)?,
                },
                Child::TextRun { .. } if !body_written => {
                    write_raw(writer, &body)?;
                    body_written = true;
                }
                Child::TextRun { .. } => {}
                Child::Other => write_events(writer, &child.events)?,
            }
        }
        writer.write_event(close)?;

        self.stats.paragraphs += 1;
        Ok(true)
    }

    /// Text keeps the formatting of the run it came from; a marker takes the
    /// formatting of the run it starts in.
    fn render(&mut self, text: &str, sources: &SourceRuns<'_>) -> Result<Rendered> {
        let mut out = Rendered::default();
        let mut offset = 0usize;
        for segment in split_markers(text) {
            let start = offset;
            offset += match segment {
                Segment::Text(t) => t.len(),
                Segment::Placeholder { raw, .. } | Segment::InlineImage { raw, .. } => raw.len(),
            };
            out.source = sources.at(start);
            match segment {
                Segment::Text(t) => {
                    let mut pos = start;
                    while pos < offset {
                        let index = sources.at(pos);
                        let end = sources.end_of(index).map_or(offset, |end| end.min(offset));
                        let end = if end > pos { end } else { offset };
                        out.source = index;
                        out.text(&t[pos - start..end - start]);
                        pos = end;
                    }
                }
                Segment::Placeholder { key, raw } => {
                    let Some(value) = lookup(self.data, key) else {
                        debug!("no value for '{key}', leaving {raw}");
                        self.stats.unresolved += 1;
                        out.text(raw);
                        continue;
                    };
                    match Replacement::from_value(value, &self.options.replace) {
                        Replacement::Text(t) => out.text(t),
                        Replacement::Rich(runs) => runs.into_iter().for_each(|r| out.push_run(r)),
                        image => self.place_images(key, value, image, &mut out)?,
                    }
                    self.stats.replaced += 1;
                }
                Segment::InlineImage { key, raw } => {
                    let replacement = lookup(self.data, key)
                        .map(|value| (value, Replacement::from_value(value, &self.options.replace)));
                    match replacement {
                        Some((value, image)) if image.is_image() => {
                            self.place_images(key, value, image, &mut out)?;
                            self.stats.replaced += 1;
                        }
                        Some(_) => {
                            warn!("'{key}' is not an image, leaving {raw}");
                            self.stats.unresolved += 1;
                            out.text(raw);
                        }
                        None => {
                            debug!("no value for '{key}', leaving {raw}");
                            self.stats.unresolved += 1;
                            out.text(raw);
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn place_images(
        &mut self,
        key: &str,
        value: &Value,
        replacement: Replacement,
        out: &mut Rendered,
    ) -> Result<()> {
        if let Err(err) = validate_image_spec(value) {
            if self.options.strict_images {
                bail!("invalid image '{key}': {err}");
            }
            warn!("skipping image '{key}': {err}");
            self.stats.skipped_images += 1;
            return Ok(());
        }

        let (specs, layout, gap) = match replacement {
            Replacement::Image(spec) => (vec![spec], Layout::Vertical, 0),
            Replacement::Images(list) => {
                let gap = list
                    .spacing_emu()
                    .or_else(|| parse_dimension_str(DEFAULT_SPACING))
                    .map_or(0, |emu| emu.get().max(0));
                (list.images, list.layout, gap)
            }
            _ => return Ok(()),
        };

        let last = specs.len().saturating_sub(1);
        let mut placed = 0usize;
        for (i, spec) in specs.iter().enumerate() {
            out.first_alignment.get_or_insert(spec.alignment);
            let Some(embedded) = self.images.embed(spec) else {
                warn!("image {i} of '{key}' has no decodable data");
                self.stats.skipped_images += 1;
                continue;
            };
            let dist = match (layout, i < last) {
                (_, false) => Distance::default(),
                (Layout::Vertical, true) => Distance {
                    bottom: gap,
                    right: 0,
                },
                (Layout::Horizontal | Layout::Grid, true) => Distance {
                    bottom: 0,
                    right: gap,
                },
            };
            if placed > 0 && layout == Layout::Vertical {
                out.push_break();
            }
            out.push_drawing(embedded.drawing_xml(dist));
            placed += 1;
            self.stats.images += 1;
        }
        Ok(())
    }
}
