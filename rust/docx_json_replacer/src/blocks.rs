//! Flattening of `<table>`, `<ol>` and `<ul>` blocks into plain-text lines.
//!
//! Blocks are located with regexes and their cell/item text is extracted from
//! an html5ever DOM. The output is still HTML-safe (`&`, `<`, `>` escaped), so
//! the caller can keep running its own tag and entity handling over it.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::{Captures, Regex};

use crate::entities::xml_escape_text;

lazy_static! {
    static ref RE_TABLE: Regex = Regex::new(r"(?is)<table\b[^>]*>.*?</table\s*>").unwrap();
    static ref RE_OL: Regex = Regex::new(r"(?is)<ol\b[^>]*>.*?</ol\s*>").unwrap();
    static ref RE_UL: Regex = Regex::new(r"(?is)<ul\b[^>]*>.*?</ul\s*>").unwrap();
}

/// Columns are never narrower than this many characters.
pub const MIN_COLUMN_WIDTH: usize = 8;
pub const BULLET: &str = "\u{2022} ";

fn parse_to_dom(input: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(input)
}

fn node_children(h: &Handle) -> Vec<Handle> {
    h.children.borrow().clone()
}

fn elem_tag_lower(h: &Handle) -> Option<String> {
    match &h.data {
        NodeData::Element { name, .. } => Some(name.local.to_string().to_ascii_lowercase()),
        _ => None,
    }
}

fn collect_elements(node: &Handle, tags: &[&str], out: &mut Vec<Handle>) {
    for c in node_children(node) {
        if elem_tag_lower(&c).is_some_and(|t| tags.contains(&t.as_str())) {
            out.push(c.clone());
        }
        collect_elements(&c, tags, out);
    }
}

fn text_content(node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        NodeData::Element { .. } | NodeData::Document => {
            for c in node_children(node) {
                text_content(&c, out);
            }
        }
        _ => {}
    }
}

/// Text of an element with whitespace collapsed and trimmed.
fn cell_text(node: &Handle) -> String {
    let mut raw = String::new();
    text_content(node, &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Default, PartialEq, Eq)]
struct TableCells {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

fn extract_table(block: &str) -> TableCells {
    let dom = parse_to_dom(block);

    let mut header_cells = Vec::new();
    collect_elements(&dom.document, &["th"], &mut header_cells);
    let headers: Vec<String> = header_cells.iter().map(cell_text).collect();

    let mut tr = Vec::new();
    collect_elements(&dom.document, &["tr"], &mut tr);
    let mut rows: Vec<Vec<String>> = tr
        .iter()
        .map(|row| {
            node_children(row)
                .iter()
                .filter(|c| matches!(elem_tag_lower(c).as_deref(), Some("th" | "td")))
                .map(cell_text)
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    if !headers.is_empty() && rows.first() == Some(&headers) {
        rows.remove(0);
    }

    TableCells { headers, rows }
}

fn render_table(table: &TableCells) -> String {
    let has_headers = !table.headers.is_empty();
    let all_rows: Vec<&Vec<String>> = has_headers
        .then_some(&table.headers)
        .into_iter()
        .chain(table.rows.iter())
        .collect();

    let columns = all_rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if columns == 0 {
        return String::new();
    }

    let widths: Vec<usize> = (0..columns)
        .map(|i| {
            all_rows
                .iter()
                .map(|r| r.get(i).map_or(0, |c| c.chars().count()))
                .max()
                .unwrap_or(0)
                .max(MIN_COLUMN_WIDTH)
        })
        .collect();

    let line = |cells: &[String]| {
        widths
            .iter()
            .enumerate()
            .map(|(i, &w)| {
                let cell = cells.get(i).map(String::as_str).unwrap_or("");
                xml_escape_text(&format!("{cell:<w$}"))
            })
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut out: Vec<String> = Vec::new();
    if has_headers {
        out.push(line(&table.headers));
        out.push(
            widths
                .iter()
                .map(|&w| "-".repeat(w))
                .collect::<Vec<_>>()
                .join(" | "),
        );
    }
    out.extend(table.rows.iter().map(|r| line(r)));
    out.join("\n")
}

fn list_items(block: &str) -> Vec<String> {
    let dom = parse_to_dom(block);
    let mut items = Vec::new();
    collect_elements(&dom.document, &["li"], &mut items);
    items.iter().map(cell_text).collect()
}

/// Render one `<table>` block as aligned text lines.
pub fn table_to_text(block: &str) -> String {
    render_table(&extract_table(block))
}

/// Render one `<ol>`/`<ul>` block as numbered or bulleted lines.
pub fn list_to_text(block: &str, ordered: bool) -> String {
    list_items(block)
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let item = xml_escape_text(item);
            if ordered {
                format!("{}. {item}", i + 1)
            } else {
                format!("{BULLET}{item}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace every table and list block in `html` with its text rendering,
/// set on its own lines. Surrounding markup is left alone.
pub fn flatten_blocks(html: &str) -> String {
    let mut out = html.to_string();
    if RE_TABLE.is_match(&out) {
        out = RE_TABLE
            .replace_all(&out, |caps: &Captures| format!("\n{}\n", table_to_text(&caps[0])))
            .into_owned();
    }
    if RE_OL.is_match(&out) {
        out = RE_OL
            .replace_all(&out, |caps: &Captures| format!("\n{}\n", list_to_text(&caps[0], true)))
            .into_owned();
    }
    if RE_UL.is_match(&out) {
        out = RE_UL
            .replace_all(&out, |caps: &Captures| format!("\n{}\n", list_to_text(&caps[0], false)))
            .into_owned();
    }
    out
}
