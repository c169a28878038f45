//! Region codec registry
//!
//! Each region publishes readings in its own text layout. The layouts only
//! differ in two dimensions, so they are described as data rather than code:
//!
//! ```text
//! ┌────────┬──────────────────┬──────────┬───────────┐
//! │ region │ wire syntax      │ brackets │ delimiter │
//! ├────────┼──────────────────┼──────────┼───────────┤
//! │ norte  │ p-r-t-h          │ none     │ "-"       │
//! │ sul    │ (p; r; t; h)     │ ( )      │ "; "      │
//! │ leste  │ {p, r, t, h}     │ { }      │ ", "      │
//! │ oeste  │ p#r#t#h          │ none     │ "#"       │
//! └────────┴──────────────────┴──────────┴───────────┘
//! ```
//!
//! Field order is fixed for every region: pressure, radiation, temperature,
//! humidity. A decimal comma inside a field is accepted as a decimal point.
//!
//! The canonical outbound encodings live in [`canonical`].

pub mod canonical;
pub mod error;

pub use error::{DecodeError, DecodeErrorKind};

use std::collections::HashMap;

use crate::types::{Reading, Region};

/// Field names in wire order
pub const FIELD_ORDER: [&str; 4] = ["pressure", "radiation", "temperature", "humidity"];

/// Number of numeric fields per reading
pub const FIELD_COUNT: usize = FIELD_ORDER.len();

// ============================================================================
// Format Descriptor
// ============================================================================

/// Wire layout for one region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    /// Region this layout belongs to
    pub region: Region,
    /// Enclosing bracket pair, if any
    pub brackets: Option<(char, char)>,
    /// Exact separator string between fields
    pub delimiter: &'static str,
}

/// Built-in layouts, one per region
pub const DEFAULT_FORMATS: [FormatDescriptor; Region::COUNT] = [
    FormatDescriptor {
        region: Region::Norte,
        brackets: None,
        delimiter: "-",
    },
    FormatDescriptor {
        region: Region::Sul,
        brackets: Some(('(', ')')),
        delimiter: "; ",
    },
    FormatDescriptor {
        region: Region::Leste,
        brackets: Some(('{', '}')),
        delimiter: ", ",
    },
    FormatDescriptor {
        region: Region::Oeste,
        brackets: None,
        delimiter: "#",
    },
];

impl FormatDescriptor {
    /// Built-in layout for a region
    pub fn for_region(region: Region) -> &'static FormatDescriptor {
        &DEFAULT_FORMATS[region.index()]
    }

    /// Decode a raw payload laid out in this format
    pub fn decode(&self, raw: &str) -> Result<Reading, DecodeError> {
        let values = self.split_values(raw)?;
        Reading::new(self.region, values[0], values[1], values[2], values[3])
            .map_err(|e| DecodeError::from(e).with_context(raw))
    }

    /// Split and parse the four numeric fields of a payload
    pub fn split_values(&self, raw: &str) -> Result<[f64; FIELD_COUNT], DecodeError> {
        let mut body = raw.trim();
        if let Some((open, close)) = self.brackets {
            body = body.trim_start_matches(open).trim_end_matches(close);
        }

        let fields: Vec<&str> = body.split(self.delimiter).collect();
        if fields.len() != FIELD_COUNT {
            return Err(DecodeError::field_count(FIELD_COUNT, fields.len()).with_context(raw));
        }

        let mut values = [0.0; FIELD_COUNT];
        for (i, field) in fields.iter().enumerate() {
            values[i] = parse_number(field)
                .ok_or_else(|| DecodeError::numeric(FIELD_ORDER[i], field.trim()).with_context(raw))?;
        }
        Ok(values)
    }

    /// Produce wire text for the given values, 2 decimals each
    pub fn encode(&self, values: [f64; FIELD_COUNT]) -> String {
        let body = values
            .iter()
            .map(|v| format!("{:.2}", v))
            .collect::<Vec<_>>()
            .join(self.delimiter);

        match self.brackets {
            Some((open, close)) => format!("{}{}{}", open, body, close),
            None => body,
        }
    }
}

/// Parse one trimmed field, normalizing a decimal comma
fn parse_number(field: &str) -> Option<f64> {
    let normalized = field.trim().replace(',', ".");
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============================================================================
// Registry
// ============================================================================

/// Lookup table from region to wire layout
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    formats: HashMap<Region, FormatDescriptor>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self {
            formats: DEFAULT_FORMATS.iter().map(|d| (d.region, *d)).collect(),
        }
    }
}

impl CodecRegistry {
    /// Registry loaded with the built-in layouts
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the layout for a region
    pub fn register(&mut self, descriptor: FormatDescriptor) {
        self.formats.insert(descriptor.region, descriptor);
    }

    /// Layout for a region, if registered
    pub fn descriptor(&self, region: Region) -> Option<&FormatDescriptor> {
        self.formats.get(&region)
    }

    /// Decode a payload from a known region
    pub fn decode(&self, region: Region, raw: &str) -> Result<Reading, DecodeError> {
        self.descriptor(region)
            .ok_or_else(|| DecodeError::unknown_region(region.as_str()).with_context(raw))?
            .decode(raw)
    }

    /// Resolve a region identifier then decode
    pub fn decode_str(&self, region: &str, raw: &str) -> Result<Reading, DecodeError> {
        let region: Region = region
            .parse()
            .map_err(|e| DecodeError::from(e).with_context(raw))?;
        self.decode(region, raw)
    }

    /// Produce producer-side wire text for a region
    pub fn encode_wire(&self, region: Region, values: [f64; FIELD_COUNT]) -> Option<String> {
        self.descriptor(region).map(|d| d.encode(values))
    }
}

/// Decode a payload with the built-in layout for `region`
pub fn decode(region: Region, raw: &str) -> Result<Reading, DecodeError> {
    FormatDescriptor::for_region(region).decode(raw)
}

/// Wire text for `region` with the built-in layout
pub fn encode_wire(region: Region, values: [f64; FIELD_COUNT]) -> String {
    FormatDescriptor::for_region(region).encode(values)
}
