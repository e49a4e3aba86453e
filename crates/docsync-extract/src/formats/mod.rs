//! Format families and their readers.

mod archive;
mod image;
mod markup;
mod office;
mod tabular;
mod text;

use crate::error::ExtractError;
use std::path::Path;

pub(crate) use text::read_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupKind {
    Json,
    Xml,
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Csv,
    Tsv,
    Xlsx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    Gzip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfficeKind {
    Pdf,
    Docx,
    Pptx,
    Odt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Capability tag deciding how a file is turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatFamily {
    PlainText,
    StructuredMarkup(MarkupKind),
    Tabular(TableKind),
    ArchiveListing(ArchiveKind),
    OfficeDocument(OfficeKind),
    ImageOcr,
    Media(MediaKind),
    /// Unknown format: read as text unless the bytes look binary.
    Fallback,
}

impl FormatFamily {
    /// Run this family's reader. `Parse` errors are left to the caller.
    pub(crate) fn read(self, path: &Path) -> Result<String, ExtractError> {
        match self {
            Self::PlainText => read_text(path),
            Self::StructuredMarkup(kind) => markup::read(kind, path),
            Self::Tabular(kind) => tabular::read(kind, path),
            Self::ArchiveListing(kind) => archive::read(kind, path),
            Self::OfficeDocument(kind) => office::read(kind, path),
            Self::ImageOcr => image::read(path),
            Self::Media(_) => Ok(self.placeholder(path)),
            Self::Fallback => text::read_unknown(path),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::PlainText | Self::Fallback => "TEXT",
            Self::StructuredMarkup(MarkupKind::Json) => "JSON",
            Self::StructuredMarkup(MarkupKind::Xml) => "XML",
            Self::StructuredMarkup(MarkupKind::Html) => "HTML",
            Self::Tabular(TableKind::Xlsx) => "EXCEL",
            Self::Tabular(_) => "TABLE",
            Self::ArchiveListing(_) => "ARCHIVE",
            Self::OfficeDocument(OfficeKind::Pdf) => "PDF",
            Self::OfficeDocument(OfficeKind::Docx) => "WORD",
            Self::OfficeDocument(OfficeKind::Pptx) => "POWERPOINT",
            Self::OfficeDocument(OfficeKind::Odt) => "ODT",
            Self::ImageOcr => "IMAGE",
            Self::Media(MediaKind::Audio) => "AUDIO",
            Self::Media(MediaKind::Video) => "VIDEO",
        }
    }

    /// One-line description used when the content itself is unavailable.
    pub fn placeholder(self, path: &Path) -> String {
        placeholder(self.label(), path)
    }
}

pub(crate) fn placeholder(label: &str, path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    format!("[{} FILE] {}", label, name)
}
