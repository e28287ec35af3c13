//! Localized parse failures.
//!
//! Every error names the statement file and, where the parser can know it,
//! the 1-based source line, the field index and the transaction ordinal, so a
//! message is actionable without re-running the parse.

use std::fmt;
use std::path::{Path, PathBuf};

/// Where in a statement a failure was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: PathBuf,
    /// 1-based source line.
    pub line: Option<usize>,
    /// 0-based field index. For the CSV dialects this is a running field
    /// counter taken modulo the dialect's column count, so it only points at
    /// the exact column while every earlier row had the nominal width.
    pub field: Option<usize>,
    /// 1-based position of the transaction within its list.
    pub transaction: Option<usize>,
}

impl Location {
    pub fn file(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            line: None,
            field: None,
            transaction: None,
        }
    }

    pub fn line(path: &Path, line: usize) -> Self {
        Self {
            line: Some(line),
            ..Self::file(path)
        }
    }

    pub fn with_field(mut self, field: usize) -> Self {
        self.field = Some(field);
        self
    }

    pub fn with_transaction(mut self, ordinal: usize) -> Self {
        self.transaction = Some(ordinal);
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
        }
        if let Some(field) = self.field {
            write!(f, " (field {field})")?;
        }
        if let Some(ordinal) = self.transaction {
            write!(f, " (transaction {ordinal})")?;
        }
        Ok(())
    }
}

/// Broad classes of failure, for callers that only need to decide what to do
/// next (e.g. offer a different parser on `UnsupportedContent`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    MalformedField,
    StructuralViolation,
    UnsupportedContent,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The statement could not be read at all.
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value could not be parsed as a date or numeral, or a row was too
    /// short to contain it.
    #[error("{location}: could not parse {field} '{value}': {reason}")]
    MalformedField {
        location: Location,
        field: String,
        value: String,
        reason: String,
    },

    /// A required tag, element or attribute is absent.
    #[error("{location}: missing {element}")]
    MissingElement { location: Location, element: String },

    /// The input has the right shape overall but violates the format's
    /// structure (bad header, unexpected node, empty list).
    #[error("{location}: {message}")]
    InvalidStructure { location: Location, message: String },

    /// The input is not this dialect at all.
    #[error("{location}: unsupported content: {message}")]
    Unsupported { location: Location, message: String },

    /// A defect in the parser rather than in the input.
    #[error("{location}: internal parser error: {message}")]
    Internal { location: Location, message: String },
}

impl ParseError {
    pub fn malformed(
        location: Location,
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self::MalformedField {
            location,
            field: field.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    pub fn missing(location: Location, element: impl Into<String>) -> Self {
        Self::MissingElement {
            location,
            element: element.into(),
        }
    }

    pub fn structure(location: Location, message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            location,
            message: message.into(),
        }
    }

    pub fn unsupported(location: Location, message: impl Into<String>) -> Self {
        Self::Unsupported {
            location,
            message: message.into(),
        }
    }

    pub fn internal(location: Location, message: impl fmt::Display) -> Self {
        Self::Internal {
            location,
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::Io { .. } => ErrorKind::Io,
            ParseError::MalformedField { .. } => ErrorKind::MalformedField,
            ParseError::MissingElement { .. } | ParseError::InvalidStructure { .. } => {
                ErrorKind::StructuralViolation
            }
            ParseError::Unsupported { .. } => ErrorKind::UnsupportedContent,
            ParseError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// The position of the failure. I/O errors only know the file.
    pub fn location(&self) -> Location {
        match self {
            ParseError::Io { path, .. } => Location::file(path),
            ParseError::MalformedField { location, .. }
            | ParseError::MissingElement { location, .. }
            | ParseError::InvalidStructure { location, .. }
            | ParseError::Unsupported { location, .. }
            | ParseError::Internal { location, .. } => location.clone(),
        }
    }
}
