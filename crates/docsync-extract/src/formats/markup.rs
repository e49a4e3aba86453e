use super::MarkupKind;
use super::text::{decode, read_text};
use crate::error::ExtractError;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs;
use std::path::Path;
use tracing::debug;

pub(super) fn read(kind: MarkupKind, path: &Path) -> Result<String, ExtractError> {
    match kind {
        MarkupKind::Json => read_json(path),
        MarkupKind::Xml | MarkupKind::Html => {
            let bytes = fs::read(path)?;
            match markup_text(&bytes, kind == MarkupKind::Html) {
                Ok(text) => Ok(text),
                Err(e) => {
                    debug!("Markup parse failed for {:?}, reading as text: {}", path, e);
                    Ok(decode(bytes))
                }
            }
        }
    }
}

fn read_json(path: &Path) -> Result<String, ExtractError> {
    let raw = read_text(path)?;
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(value) => serde_json::to_string_pretty(&value).map_err(ExtractError::parse),
        Err(e) => {
            debug!("Invalid JSON in {:?}, reading as text: {}", path, e);
            Ok(raw)
        }
    }
}

/// Collect the text nodes of an XML or HTML document, joined by spaces.
pub(crate) fn markup_text(bytes: &[u8], lenient: bool) -> Result<String, ExtractError> {
    let mut reader = Reader::from_reader(bytes);
    let config = reader.config_mut();
    config.trim_text(true);
    if lenient {
        // HTML void elements (<br>, <img>) never close
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
    }

    let mut parts: Vec<String> = Vec::new();
    let mut skip_depth = 0usize;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if lenient && (name.as_ref() == b"script" || name.as_ref() == b"style") {
                    skip_depth += 1;
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if skip_depth > 0 && (name.as_ref() == b"script" || name.as_ref() == b"style") {
                    skip_depth -= 1;
                }
            }
            Ok(Event::Text(te)) if skip_depth == 0 => {
                let text = te
                    .unescape()
                    .map(|t| t.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&te).into_owned());
                if !text.trim().is_empty() {
                    parts.push(text.trim().to_string());
                }
            }
            Ok(Event::CData(cd)) if skip_depth == 0 => {
                let text = String::from_utf8_lossy(&cd).trim().to_string();
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::parse(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(parts.join(" "))
}
