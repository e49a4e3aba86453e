//! Plain-text extraction for arbitrary files.
//!
//! A [`TextExtractor`] maps each path to a [`FormatFamily`] (by extension
//! first, then by guessed MIME type) and runs that family's reader. Format
//! errors never escape: a file whose content cannot be parsed is described by
//! a one-line placeholder instead, so it still lands in the index.

pub mod error;
pub mod formats;
pub mod registry;

pub use error::ExtractError;
pub use formats::{ArchiveKind, FormatFamily, MarkupKind, MediaKind, OfficeKind, TableKind};
pub use registry::{MAX_FILE_SIZE, TextExtractor};
