//! PDF and zipped office formats (OOXML, OpenDocument).

use super::OfficeKind;
use super::markup::markup_text;
use crate::error::ExtractError;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

pub(super) type ZipFile = zip::ZipArchive<BufReader<File>>;

pub(super) fn read(kind: OfficeKind, path: &Path) -> Result<String, ExtractError> {
    match kind {
        OfficeKind::Pdf => read_pdf(path),
        OfficeKind::Docx => {
            let mut archive = open_zip(path)?;
            let xml = zip_entry(&mut archive, "word/document.xml")?;
            ooxml_runs(&xml, b"p", "\n")
        }
        OfficeKind::Pptx => read_pptx(path),
        OfficeKind::Odt => {
            let mut archive = open_zip(path)?;
            let xml = zip_entry(&mut archive, "content.xml")?;
            markup_text(&xml, false)
        }
    }
}

fn read_pdf(path: &Path) -> Result<String, ExtractError> {
    let bytes = fs::read(path)?;
    // pdf-extract panics on some malformed inputs
    std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes))
        .map_err(|_| ExtractError::Parse("PDF parser panicked".to_string()))?
        .map_err(ExtractError::parse)
}

fn read_pptx(path: &Path) -> Result<String, ExtractError> {
    let mut archive = open_zip(path)?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| numbered_part(name, "ppt/slides/slide"));

    let mut sections = Vec::with_capacity(slide_names.len());
    for (idx, name) in slide_names.iter().enumerate() {
        let xml = zip_entry(&mut archive, name)?;
        let text = ooxml_runs(&xml, b"p", "\n")?;
        sections.push(format!("Slide {}:\n{}", idx + 1, text));
    }
    Ok(sections.join("\n"))
}

pub(super) fn open_zip(path: &Path) -> Result<ZipFile, ExtractError> {
    let file = File::open(path)?;
    zip::ZipArchive::new(BufReader::new(file)).map_err(ExtractError::parse)
}

pub(super) fn zip_entry(archive: &mut ZipFile, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive.by_name(name).map_err(ExtractError::parse)?;
    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Parse(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Sort key for `prefixN.xml` parts so that slide10 follows slide9.
pub(super) fn numbered_part(name: &str, prefix: &str) -> u32 {
    name.trim_start_matches(prefix)
        .trim_end_matches(".xml")
        .parse::<u32>()
        .unwrap_or(u32::MAX)
}

/// Concatenate `<*:t>` runs, inserting `separator` after each `block` element.
pub(super) fn ooxml_runs(
    xml: &[u8],
    block: &[u8],
    separator: &str,
) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = Reader::from_reader(xml);
    let mut in_t = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Text(te)) if in_t => {
                out.push_str(te.unescape().map_err(ExtractError::parse)?.as_ref());
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_t = false;
                } else if name.as_ref() == block && !out.is_empty() && !out.ends_with(separator) {
                    out.push_str(separator);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::parse(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}
