use super::office::open_zip;
use super::{ArchiveKind, placeholder};
use crate::error::ExtractError;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Entries listed per archive.
const MAX_ENTRIES: usize = 100;
const TAR_BLOCK: usize = 512;

pub(super) fn read(kind: ArchiveKind, path: &Path) -> Result<String, ExtractError> {
    let names = match kind {
        ArchiveKind::Zip => {
            let archive = open_zip(path)?;
            archive
                .file_names()
                .take(MAX_ENTRIES)
                .map(str::to_string)
                .collect()
        }
        ArchiveKind::Tar => tar_entries(path)?,
        // Compressed streams need decompression before they can be listed
        ArchiveKind::Gzip => return Ok(placeholder("ARCHIVE", path)),
    };

    Ok(format!(
        "{}\nContents:\n{}",
        placeholder("ARCHIVE", path),
        names.join("\n")
    ))
}

/// Walk ustar headers and collect entry names.
fn tar_entries(path: &Path) -> Result<Vec<String>, ExtractError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut header = [0u8; TAR_BLOCK];
    let mut names = Vec::new();

    while names.len() < MAX_ENTRIES {
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        if header.iter().all(|b| *b == 0) {
            break;
        }
        if !checksum_matches(&header) {
            return Err(ExtractError::Parse("invalid tar header checksum".to_string()));
        }

        let name = field_str(&header[0..100]);
        let prefix = field_str(&header[345..500]);
        let size = parse_octal(&header[124..136])
            .ok_or_else(|| ExtractError::Parse("invalid tar size field".to_string()))?;

        let full = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        if !full.is_empty() {
            names.push(full);
        }

        let padded = size.div_ceil(TAR_BLOCK as u64) * TAR_BLOCK as u64;
        std::io::copy(&mut (&mut reader).take(padded), &mut std::io::sink())?;
    }

    Ok(names)
}

fn field_str(field: &[u8]) -> String {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).trim().to_string()
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    let text = field_str(field);
    if text.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(&text, 8).ok()
}

fn checksum_matches(header: &[u8; TAR_BLOCK]) -> bool {
    let Some(stored) = parse_octal(&header[148..156]) else {
        return false;
    };
    let computed: u64 = header
        .iter()
        .enumerate()
        .map(|(i, b)| if (148..156).contains(&i) { b' ' as u64 } else { *b as u64 })
        .sum();
    stored == computed
}
