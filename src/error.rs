use std::fmt;
use thiserror::Error;

/// A single field's raw text did not have the expected shape.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot parse {what} from {input:?}")]
pub struct FormatError {
    pub what: &'static str,
    pub input: String,
}

impl FormatError {
    pub fn new(what: &'static str, input: &str) -> Self {
        Self {
            what,
            input: input.to_string(),
        }
    }
}

/// The embedded JSON payload of a page is missing or unusable.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no embedded data block found")]
    Missing,

    #[error("embedded data block from {locator} is not valid JSON: {source}")]
    Json {
        locator: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("embedded data block from {locator} is not a JSON array")]
    NotAnArray { locator: &'static str },
}

/// A required section of a page is missing, so the page layout is not one we know.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("missing {section} section")]
pub struct StructuralError {
    pub section: &'static str,
}

/// Why a document produced no record.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::Decode(_) => ErrorKind::Decode,
            ParseError::Structural(_) => ErrorKind::Structural,
            ParseError::Identifier(_) => ErrorKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("no listing identifier in {url}")]
pub struct IdentifierError {
    pub url: String,
}

/// Tag written in front of each error-log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Http(u16),
    Timeout,
    Decode,
    Structural,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Http(status) => write!(f, "{}", status),
            ErrorKind::Timeout => f.write_str("TimeoutError"),
            ErrorKind::Decode => f.write_str("DecodeError"),
            ErrorKind::Structural => f.write_str("StructuralError"),
            ErrorKind::Other => f.write_str("Other"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_tags() {
        assert_eq!(ErrorKind::Http(404).to_string(), "404");
        assert_eq!(ErrorKind::Timeout.to_string(), "TimeoutError");
        assert_eq!(ErrorKind::Decode.to_string(), "DecodeError");
        assert_eq!(ErrorKind::Structural.to_string(), "StructuralError");
        assert_eq!(ErrorKind::Other.to_string(), "Other");
    }

    #[test]
    fn test_parse_error_kind_follows_variant() {
        let err = ParseError::from(StructuralError { section: "broker" });
        assert_eq!(err.kind(), ErrorKind::Structural);
        assert_eq!(err.to_string(), "missing broker section");

        let err = ParseError::from(DecodeError::Missing);
        assert_eq!(err.kind(), ErrorKind::Decode);
    }
}
