//! End-to-end tests for the docx-json-replacer binary.

use assert_cmd::Command;
use base64::Engine;
use predicates::prelude::*;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

fn document_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><w:body>{body}<w:sectPr/></w:body></w:document>"#
    )
}

/// Write a minimal template; it has no document relationships part.
fn write_template(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("template.docx");
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    let opt = SimpleFileOptions::default();
    for (name, data) in [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("word/document.xml", document_xml(body)),
    ] {
        zip.start_file(name, opt).unwrap();
        zip.write_all(data.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    path
}

fn write_json(dir: &Path, json: &serde_json::Value) -> PathBuf {
    let path = dir.join("data.json");
    std::fs::write(&path, json.to_string()).unwrap();
    path
}

fn read_entry(docx: &Path, name: &str) -> Option<Vec<u8>> {
    let mut archive = ZipArchive::new(File::open(docx).unwrap()).unwrap();
    let mut entry = archive.by_name(name).ok()?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).unwrap();
    Some(buf)
}

fn read_text(docx: &Path, name: &str) -> String {
    String::from_utf8(read_entry(docx, name).unwrap()).unwrap()
}

fn png_base64() -> String {
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([0, 120, 255]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    base64::engine::general_purpose::STANDARD.encode(buf.into_inner())
}

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("docx-json-replacer"))
}

#[test]
fn replaces_text_and_formatting() {
    let dir = TempDir::new().unwrap();
    let template = write_template(
        dir.path(),
        r#"<w:p><w:r><w:t>Dear {{cust</w:t></w:r><w:r><w:t>omer.name}},</w:t></w:r></w:p><w:p><w:r><w:t>{{note}}</w:t></w:r></w:p>"#,
    );
    let data = write_json(
        dir.path(),
        &serde_json::json!({
            "customer": {"name": "Ada"},
            "note": "Please <b>pay</b> today",
        }),
    );

    cmd().arg(&template).arg(&data).assert().success();

    let out = dir.path().join("template_replaced.docx");
    let xml = read_text(&out, "word/document.xml");
    assert!(xml.contains("Dear Ada,"));
    assert!(xml.contains(r#"<w:rPr><w:b/></w:rPr><w:t xml:space="preserve">pay</w:t>"#));
    assert!(!xml.contains("{{"));
}

#[test]
fn embeds_image() {
    let dir = TempDir::new().unwrap();
    let template = write_template(dir.path(), r#"<w:p><w:r><w:t>[dx-img:logo]</w:t></w:r></w:p>"#);
    let data = write_json(
        dir.path(),
        &serde_json::json!({
            "logo": {"type": "image", "data": png_base64(), "width": "1in", "alignment": "center"},
        }),
    );
    let out = dir.path().join("out").join("filled.docx");

    cmd()
        .arg(&template)
        .arg(&data)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    assert!(read_entry(&out, "word/media/image_dx1.png").is_some());
    let rels = read_text(&out, "word/_rels/document.xml.rels");
    assert!(rels.contains(r#"Target="media/image_dx1.png""#));
    let types = read_text(&out, "[Content_Types].xml");
    assert!(types.contains(r#"<Default Extension="png" ContentType="image/png"/>"#));
    let xml = read_text(&out, "word/document.xml");
    assert!(xml.contains(r#"<wp:extent cx="914400" cy="914400"/>"#));
    assert!(xml.contains(r#"<w:jc w:val="center"/>"#));
    // Untouched parts are carried over.
    assert_eq!(read_text(&out, "_rels/.rels"), ROOT_RELS);
}

#[test]
fn no_html_flag_keeps_markup_literal() {
    let dir = TempDir::new().unwrap();
    let template = write_template(dir.path(), r#"<w:p><w:r><w:t>{{v}}</w:t></w:r></w:p>"#);
    let data = write_json(dir.path(), &serde_json::json!({"v": "<i>raw</i>"}));

    cmd().arg(&template).arg(&data).arg("--no-html").assert().success();

    let xml = read_text(&dir.path().join("template_replaced.docx"), "word/document.xml");
    assert!(xml.contains("&lt;i&gt;raw&lt;/i&gt;"));
}

#[test]
fn strict_images_fails_on_bad_image() {
    let dir = TempDir::new().unwrap();
    let template = write_template(dir.path(), r#"<w:p><w:r><w:t>{{pic}}</w:t></w:r></w:p>"#);
    let data = write_json(
        dir.path(),
        &serde_json::json!({"pic": {"type": "images", "list": []}}),
    );

    cmd()
        .arg(&template)
        .arg(&data)
        .arg("--strict-images")
        .assert()
        .failure()
        .stderr(predicate::str::contains("'list' is empty"));

    // Without the flag the placeholder is dropped with a warning.
    cmd()
        .arg(&template)
        .arg(&data)
        .assert()
        .success()
        .stderr(predicate::str::contains("skipping image 'pic'"));
}

#[test]
fn rejects_bad_inputs() {
    let dir = TempDir::new().unwrap();
    let template = write_template(dir.path(), "<w:p/>");

    let array = dir.path().join("array.json");
    std::fs::write(&array, "[1, 2]").unwrap();
    cmd()
        .arg(&template)
        .arg(&array)
        .assert()
        .failure()
        .stderr(predicate::str::contains("root must be a JSON object"));

    let not_docx = dir.path().join("plain.docx");
    std::fs::write(&not_docx, "hello").unwrap();
    let data = write_json(dir.path(), &serde_json::json!({}));
    cmd()
        .arg(&not_docx)
        .arg(&data)
        .assert()
        .failure()
        .stderr(predicate::str::contains("plain.docx"));
}
