use super::placeholder;
use crate::error::ExtractError;
use std::fs;
use std::path::Path;

/// Bytes inspected when sniffing an unknown file for binary content.
const SNIFF_LEN: usize = 8192;

/// Read a file as text: UTF-8 when valid, Latin-1 otherwise.
pub(crate) fn read_text(path: &Path) -> Result<String, ExtractError> {
    let bytes = fs::read(path)?;
    Ok(decode(bytes))
}

pub(crate) fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(s),
        // Every byte is a valid Latin-1 code point
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}

pub(crate) fn read_unknown(path: &Path) -> Result<String, ExtractError> {
    let bytes = fs::read(path)?;
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    if head.contains(&0) {
        return Ok(placeholder("BINARY", path));
    }
    Ok(decode(bytes))
}
