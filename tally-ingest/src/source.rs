use std::fs;
use std::path::Path;

use crate::error::ParseError;

/// Read a whole statement into memory. Statements are small, so nothing is
/// streamed.
pub fn read_source(path: &Path) -> Result<String, ParseError> {
    let text = fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(strip_bom(&text).to_string())
}

pub(crate) fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}
