use anyhow::{anyhow, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

lazy_static! {
    static ref RE_REL_ID: Regex = Regex::new(r#"\bId="([^"]+)""#).unwrap();
    static ref RE_FILLABLE_PART: Regex =
        Regex::new(r"^word/(document|header\d*|footer\d*|footnotes|endnotes)\.xml$").unwrap();
}

pub const CONTENT_TYPES: &str = "[Content_Types].xml";
pub const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

fn empty_rels_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
</Relationships>"#
}

/// Parts whose paragraphs may carry placeholders.
pub fn is_fillable_part(name: &str) -> bool {
    RE_FILLABLE_PART.is_match(name)
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`.
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// A `.docx` held in memory as an ordered list of zip entries.
#[derive(Debug, Default)]
pub struct DocxPackage {
    entries: Vec<(String, Vec<u8>)>,
}

impl DocxPackage {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("read {}", path.display()))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader).context("not a zip archive")?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut buf)
                .with_context(|| format!("read entry {name}"))?;
            entries.push((name, buf));
        }

        let package = Self { entries };
        if package.get(CONTENT_TYPES).is_none() {
            return Err(anyhow!("missing {CONTENT_TYPES}; not a Word document"));
        }
        Ok(package)
    }

    pub fn save(&self, out_path: &Path) -> Result<()> {
        if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file =
            File::create(out_path).with_context(|| format!("create {}", out_path.display()))?;
        self.write_to(file)
    }

    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut zip = ZipWriter::new(writer);
        let opt = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in &self.entries {
            zip.start_file(name.as_str(), opt)?;
            zip.write_all(data)?;
        }
        zip.finish()?;
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    pub fn get_str(&self, name: &str) -> Result<Option<String>> {
        self.get(name)
            .map(|data| {
                String::from_utf8(data.to_vec()).with_context(|| format!("{name} is not UTF-8"))
            })
            .transpose()
    }

    /// Replace an entry, or append it if it does not exist yet.
    pub fn put(&mut self, name: &str, data: Vec<u8>) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = data,
            None => self.entries.push((name.to_string(), data)),
        }
    }

    /// Register a default content type for a file extension, once.
    pub fn ensure_default_content_type(&mut self, extension: &str, content_type: &str) -> Result<()> {
        let xml = self
            .get_str(CONTENT_TYPES)?
            .ok_or_else(|| anyhow!("missing {CONTENT_TYPES}"))?;
        let needle = format!(r#"Extension="{}""#, extension.to_ascii_lowercase());
        if xml.to_ascii_lowercase().contains(&needle) {
            return Ok(());
        }
        let close = xml
            .rfind("</Types>")
            .ok_or_else(|| anyhow!("malformed {CONTENT_TYPES}"))?;
        let mut updated = String::with_capacity(xml.len() + 96);
        updated.push_str(&xml[..close]);
        updated.push_str(&format!(
            r#"<Default Extension="{extension}" ContentType="{content_type}"/>"#
        ));
        updated.push_str(&xml[close..]);
        self.put(CONTENT_TYPES, updated.into_bytes());
        Ok(())
    }

    /// Relationship ids already used by `part`.
    pub fn relationship_ids(&self, part: &str) -> Result<Vec<String>> {
        let Some(xml) = self.get_str(&rels_path_for(part))? else {
            return Ok(Vec::new());
        };
        Ok(RE_REL_ID
            .captures_iter(&xml)
            .map(|caps| caps[1].to_string())
            .collect())
    }

    /// Append relationships `(id, type, target)` to the `.rels` file of `part`,
    /// creating it when needed.
    pub fn add_relationships(&mut self, part: &str, rels: &[(String, &str, String)]) -> Result<()> {
        if rels.is_empty() {
            return Ok(());
        }
        let path = rels_path_for(part);
        let xml = self
            .get_str(&path)?
            .unwrap_or_else(|| empty_rels_xml().to_string());
        let close = xml
            .rfind("</Relationships>")
            .ok_or_else(|| anyhow!("malformed {path}"))?;

        let mut updated = String::with_capacity(xml.len() + rels.len() * 160);
        updated.push_str(&xml[..close]);
        for (id, rel_type, target) in rels {
            updated.push_str(&format!(
                r#"<Relationship Id="{id}" Type="{rel_type}" Target="{target}"/>"#
            ));
        }
        updated.push_str(&xml[close..]);
        self.put(&path, updated.into_bytes());
        Ok(())
    }
}
