//! Extension / MIME lookup from a path to its [`FormatFamily`].

use crate::error::ExtractError;
use crate::formats::{
    ArchiveKind, FormatFamily, MarkupKind, MediaKind, OfficeKind, TableKind,
};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Default maximum input size (50 MiB)
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

const PLAIN_TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "log", "rtf", "py", "js", "ts", "java", "cpp", "c", "h",
    "hpp", "rs", "go", "rb", "css", "sql", "sh", "yml", "yaml", "toml", "ini", "cfg",
];

/// Turns files into plain text.
///
/// Immutable once built, so one instance can be shared by every sync worker.
pub struct TextExtractor {
    by_extension: HashMap<&'static str, FormatFamily>,
    max_file_size: u64,
}

impl TextExtractor {
    pub fn new() -> Self {
        let mut by_extension = HashMap::new();

        for ext in PLAIN_TEXT_EXTENSIONS {
            by_extension.insert(*ext, FormatFamily::PlainText);
        }

        let table: &[(&'static str, FormatFamily)] = &[
            ("json", FormatFamily::StructuredMarkup(MarkupKind::Json)),
            ("xml", FormatFamily::StructuredMarkup(MarkupKind::Xml)),
            ("html", FormatFamily::StructuredMarkup(MarkupKind::Html)),
            ("htm", FormatFamily::StructuredMarkup(MarkupKind::Html)),
            ("csv", FormatFamily::Tabular(TableKind::Csv)),
            ("tsv", FormatFamily::Tabular(TableKind::Tsv)),
            ("xlsx", FormatFamily::Tabular(TableKind::Xlsx)),
            ("zip", FormatFamily::ArchiveListing(ArchiveKind::Zip)),
            ("tar", FormatFamily::ArchiveListing(ArchiveKind::Tar)),
            ("gz", FormatFamily::ArchiveListing(ArchiveKind::Gzip)),
            ("tgz", FormatFamily::ArchiveListing(ArchiveKind::Gzip)),
            ("pdf", FormatFamily::OfficeDocument(OfficeKind::Pdf)),
            ("docx", FormatFamily::OfficeDocument(OfficeKind::Docx)),
            ("pptx", FormatFamily::OfficeDocument(OfficeKind::Pptx)),
            ("odt", FormatFamily::OfficeDocument(OfficeKind::Odt)),
            ("jpg", FormatFamily::ImageOcr),
            ("jpeg", FormatFamily::ImageOcr),
            ("png", FormatFamily::ImageOcr),
            ("bmp", FormatFamily::ImageOcr),
            ("tiff", FormatFamily::ImageOcr),
            ("gif", FormatFamily::ImageOcr),
        ];
        by_extension.extend(table.iter().copied());

        Self {
            by_extension,
            max_file_size: MAX_FILE_SIZE,
        }
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Resolve the family for a path: extension first, then guessed MIME type.
    pub fn family_for(&self, path: &Path) -> FormatFamily {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        if let Some(family) = ext.as_deref().and_then(|e| self.by_extension.get(e)) {
            return *family;
        }

        match mime_guess::from_path(path).first() {
            Some(mime) => match mime.type_().as_str() {
                "text" => FormatFamily::PlainText,
                "image" => FormatFamily::ImageOcr,
                "audio" => FormatFamily::Media(MediaKind::Audio),
                "video" => FormatFamily::Media(MediaKind::Video),
                _ => FormatFamily::Fallback,
            },
            None => FormatFamily::Fallback,
        }
    }

    /// Extract plain text from `path`.
    ///
    /// Fails only when the file is missing, not a regular file, over the size
    /// limit, or unreadable. Content that cannot be parsed yields a placeholder.
    pub fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let metadata = fs::metadata(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ExtractError::NotFound(path.to_path_buf()),
            _ => ExtractError::Io(e),
        })?;

        if !metadata.is_file() {
            return Err(ExtractError::NotAFile(path.to_path_buf()));
        }

        let size = metadata.len();
        if size > self.max_file_size {
            return Err(ExtractError::TooLarge {
                size,
                max: self.max_file_size,
            });
        }

        if size == 0 {
            debug!("Empty file: {:?}", path);
            return Ok(String::new());
        }

        let family = self.family_for(path);
        debug!("Extracting {:?} as {:?}", path, family);

        match family.read(path) {
            Ok(text) => Ok(text),
            Err(ExtractError::Parse(reason)) => {
                warn!("Could not read {:?} as {}: {}", path, family.label(), reason);
                Ok(family.placeholder(path))
            }
            Err(ExtractError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Err(ExtractError::NotFound(path.to_path_buf()))
            }
            Err(e) => Err(e),
        }
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_family_by_extension() {
        let extractor = TextExtractor::new();
        assert_eq!(extractor.family_for(Path::new("a/notes.TXT")), FormatFamily::PlainText);
        assert_eq!(
            extractor.family_for(Path::new("report.docx")),
            FormatFamily::OfficeDocument(OfficeKind::Docx)
        );
        assert_eq!(
            extractor.family_for(Path::new("data.tsv")),
            FormatFamily::Tabular(TableKind::Tsv)
        );
    }

    #[test]
    fn test_family_by_mime() {
        let extractor = TextExtractor::new();
        assert_eq!(
            extractor.family_for(Path::new("song.mp3")),
            FormatFamily::Media(MediaKind::Audio)
        );
        assert_eq!(
            extractor.family_for(Path::new("clip.mp4")),
            FormatFamily::Media(MediaKind::Video)
        );
        assert_eq!(extractor.family_for(Path::new("README")), FormatFamily::Fallback);
    }

    #[test]
    fn test_extract_plain_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "hello").unwrap();
        assert_eq!(TextExtractor::new().extract(&path).unwrap(), "hello");
    }

    #[test]
    fn test_extract_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.md");
        fs::write(&path, "").unwrap();
        assert_eq!(TextExtractor::new().extract(&path).unwrap(), "");
    }

    #[test]
    fn test_extract_too_large() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, "0123456789").unwrap();
        let err = TextExtractor::new()
            .with_max_file_size(4)
            .extract(&path)
            .unwrap_err();
        assert!(matches!(err, ExtractError::TooLarge { size: 10, max: 4 }));
    }

    #[test]
    fn test_extract_missing() {
        let dir = tempdir().unwrap();
        let err = TextExtractor::new()
            .extract(&dir.path().join("gone.txt"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::NotFound(_)));
    }

    #[test]
    fn test_extract_directory() {
        let dir = tempdir().unwrap();
        let err = TextExtractor::new().extract(dir.path()).unwrap_err();
        assert!(matches!(err, ExtractError::NotAFile(_)));
    }

    #[test]
    fn test_corrupt_content_degrades_to_placeholder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        fs::write(&path, "definitely not a zip").unwrap();
        assert_eq!(
            TextExtractor::new().extract(&path).unwrap(),
            "[EXCEL FILE] broken.xlsx"
        );
    }

    #[test]
    fn test_media_placeholder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("voice.wav");
        fs::write(&path, [1u8, 2, 3]).unwrap();
        assert_eq!(
            TextExtractor::new().extract(&path).unwrap(),
            "[AUDIO FILE] voice.wav"
        );
    }
}
