use super::placeholder;
use crate::error::ExtractError;
use std::path::Path;
use std::process::Command;
use tracing::debug;

const OCR_BINARY: &str = "tesseract";

/// OCR through the `tesseract` CLI when it is installed.
pub(super) fn read(path: &Path) -> Result<String, ExtractError> {
    let output = match Command::new(OCR_BINARY).arg(path).arg("stdout").output() {
        Ok(output) => output,
        Err(e) => {
            debug!("OCR unavailable for {:?}: {}", path, e);
            return Ok(placeholder("IMAGE", path));
        }
    };

    if !output.status.success() {
        return Err(ExtractError::Parse(format!(
            "{} exited with {}: {}",
            OCR_BINARY,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        Ok(placeholder("IMAGE", path))
    } else {
        Ok(text)
    }
}
