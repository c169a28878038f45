//! Decode error types
//!
//! Every decode failure carries its kind plus a snippet of the offending
//! payload so a dropped message can be identified from the log line alone.

use std::fmt;

use crate::types::ReadingError;

/// Longest payload snippet kept in an error
const MAX_CONTEXT_CHARS: usize = 50;

/// Decode failure with the payload it came from
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    /// What went wrong
    pub kind: DecodeErrorKind,
    /// The problematic payload (truncated if too long)
    pub context: Option<String>,
}

impl DecodeError {
    /// Create a new decode error
    pub fn new(kind: DecodeErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Shorthand for a field count failure
    pub fn field_count(expected: usize, found: usize) -> Self {
        Self::new(DecodeErrorKind::FieldCountMismatch { expected, found })
    }

    /// Shorthand for a numeric parse failure
    pub fn numeric(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(DecodeErrorKind::NumericParseFailure {
            field: field.into(),
            value: value.into(),
        })
    }

    /// Shorthand for a record whose outer structure is broken
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::new(DecodeErrorKind::MalformedRecord {
            reason: reason.into(),
        })
    }

    /// Shorthand for an unknown region
    pub fn unknown_region(region: impl Into<String>) -> Self {
        Self::new(DecodeErrorKind::UnknownRegion {
            region: region.into(),
        })
    }

    /// Attach the payload snippet
    pub fn with_context(mut self, context: impl AsRef<str>) -> Self {
        let ctx = context.as_ref();
        self.context = if ctx.chars().count() > MAX_CONTEXT_CHARS {
            let head: String = ctx.chars().take(MAX_CONTEXT_CHARS - 3).collect();
            Some(format!("{}...", head))
        } else {
            Some(ctx.to_string())
        };
        self
    }

    /// Stable label for the error kind, used as a metrics label
    pub fn kind_label(&self) -> &'static str {
        self.kind.label()
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref ctx) = self.context {
            write!(f, " in '{}'", ctx)?;
        }
        Ok(())
    }
}

impl std::error::Error for DecodeError {}

impl From<ReadingError> for DecodeError {
    fn from(err: ReadingError) -> Self {
        match err {
            ReadingError::UnknownRegion(region) => DecodeError::unknown_region(region),
            ReadingError::NonFinite { field, value } => {
                DecodeError::numeric(field, value.to_string())
            },
        }
    }
}

/// Kinds of decode failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Payload did not split into the expected number of fields
    FieldCountMismatch {
        /// Fields required by the format
        expected: usize,
        /// Fields actually present
        found: usize,
    },

    /// A field could not be read as a finite number
    NumericParseFailure {
        /// Field name
        field: String,
        /// Raw field text
        value: String,
    },

    /// Region outside the closed set
    UnknownRegion {
        /// Region text as received
        region: String,
    },

    /// Canonical form without its wrapper, or a record that is not valid JSON
    MalformedRecord {
        /// What was wrong with the structure
        reason: String,
    },
}

impl DecodeErrorKind {
    /// Every kind label, in a fixed order
    pub const LABELS: [&'static str; 4] = [
        "field_count_mismatch",
        "numeric_parse_failure",
        "unknown_region",
        "malformed_record",
    ];

    /// Stable snake_case label
    pub fn label(&self) -> &'static str {
        match self {
            DecodeErrorKind::FieldCountMismatch { .. } => Self::LABELS[0],
            DecodeErrorKind::NumericParseFailure { .. } => Self::LABELS[1],
            DecodeErrorKind::UnknownRegion { .. } => Self::LABELS[2],
            DecodeErrorKind::MalformedRecord { .. } => Self::LABELS[3],
        }
    }
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeErrorKind::FieldCountMismatch { expected, found } => {
                write!(f, "Expected {} fields, found {}", expected, found)
            },
            DecodeErrorKind::NumericParseFailure { field, value } => {
                write!(f, "Field '{}' is not a finite number: '{}'", field, value)
            },
            DecodeErrorKind::UnknownRegion { region } => {
                write!(f, "Unknown region: '{}'", region)
            },
            DecodeErrorKind::MalformedRecord { reason } => {
                write!(f, "Malformed record: {}", reason)
            },
        }
    }
}
