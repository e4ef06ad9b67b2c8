use crate::core::{AnchorId, RangeReading};
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Errors that can occur while parsing a single frame or link entry.
///
/// None of them end the session: the offending frame (or link) is dropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("frame is not valid UTF-8: {details}")]
    InvalidUtf8 { details: String },

    #[error("malformed JSON: {details}")]
    MalformedJson { details: String },

    #[error("unexpected message shape: {details}")]
    UnexpectedShape { details: String },

    #[error("link {index} is invalid: {details}")]
    InvalidLink { index: usize, details: String },

    #[error("link {index} has no anchor identifier")]
    MissingAnchorId { index: usize },

    #[error("invalid range for anchor {anchor_id}: {value:?}")]
    InvalidRange { anchor_id: AnchorId, value: String },

    #[error("frame of {bytes} bytes exceeds the size limit")]
    FrameTooLong { bytes: usize },
}

/// Largest magnitude at which every integer is exactly representable in f64
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Anchor identifier as it appears on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum WireAnchorId {
    Text(String),
    Number(Number),
}

impl WireAnchorId {
    /// Numeric ids map to their integer text, so `51`, `51.0` and `"51"`
    /// all name the same anchor.
    pub fn to_anchor_id(&self) -> AnchorId {
        match self {
            WireAnchorId::Text(text) => AnchorId::new(text.trim()),
            WireAnchorId::Number(number) => {
                if number.is_i64() || number.is_u64() {
                    return AnchorId::new(number.to_string());
                }
                match number.as_f64() {
                    Some(value) if value.fract() == 0.0 && value.abs() < MAX_EXACT_INTEGER => {
                        AnchorId::new(format!("{}", value as i64))
                    }
                    _ => AnchorId::new(number.to_string()),
                }
            }
        }
    }
}

/// Range value as it appears on the wire: a number or a numeric string
#[derive(Debug, Clone, PartialEq)]
pub enum WireRange {
    Number(f64),
    Text(String),
}

/// One entry of the `links` array. Fields other than `A` and `R` are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeLink {
    pub anchor: WireAnchorId,
    pub range: Option<WireRange>,
}

impl RangeLink {
    /// Classify the `index`-th entry of `links`.
    pub fn from_entry(index: usize, entry: &Value) -> Result<Self, ParseError> {
        let fields = entry.as_object().ok_or_else(|| ParseError::InvalidLink {
            index,
            details: format!("expected an object, got {}", entry),
        })?;

        let anchor = match field(fields, "A") {
            None => return Err(ParseError::MissingAnchorId { index }),
            Some(Value::String(text)) => WireAnchorId::Text(text.clone()),
            Some(Value::Number(number)) => WireAnchorId::Number(number.clone()),
            Some(other) => {
                return Err(ParseError::InvalidLink {
                    index,
                    details: format!("anchor id must be a string or number, got {}", other),
                })
            }
        };

        let range = match field(fields, "R") {
            None => None,
            Some(Value::String(text)) => Some(WireRange::Text(text.clone())),
            Some(Value::Number(number)) => match number.as_f64() {
                Some(value) => Some(WireRange::Number(value)),
                None => return Err(invalid_range(&anchor, number)),
            },
            Some(other) => return Err(invalid_range(&anchor, other)),
        };

        Ok(RangeLink { anchor, range })
    }

    /// Range in meters. A missing `R` reads as 0, which the estimator treats
    /// as "no reading".
    pub fn distance(&self) -> Result<f64, ParseError> {
        match &self.range {
            None => Ok(0.0),
            Some(WireRange::Number(value)) => Ok(*value),
            Some(WireRange::Text(text)) => {
                text.trim().parse::<f64>().map_err(|_| ParseError::InvalidRange {
                    anchor_id: self.anchor.to_anchor_id(),
                    value: text.clone(),
                })
            }
        }
    }
}

/// Present, non-null field
fn field<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|value| !value.is_null())
}

fn invalid_range(anchor: &WireAnchorId, value: impl ToString) -> ParseError {
    ParseError::InvalidRange {
        anchor_id: anchor.to_anchor_id(),
        value: value.to_string(),
    }
}

/// Parsed frame: `{ "links": [ { "A": ..., "R": ... }, ... ] }`
///
/// Entries are kept raw so each one is validated on its own.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LinkReport {
    pub links: Vec<Value>,
}

impl LinkReport {
    /// Convert links into readings, keeping per-link failures separate so a
    /// single bad entry does not discard the rest of the frame.
    pub fn into_readings(self) -> (Vec<RangeReading>, Vec<ParseError>) {
        let mut readings = Vec::with_capacity(self.links.len());
        let mut errors = Vec::new();

        for (index, entry) in self.links.iter().enumerate() {
            let reading = RangeLink::from_entry(index, entry).and_then(|link| {
                let distance_m = link.distance()?;
                Ok(RangeReading {
                    anchor_id: link.anchor.to_anchor_id(),
                    distance_m,
                })
            });

            match reading {
                Ok(reading) => readings.push(reading),
                Err(error) => errors.push(error),
            }
        }

        (readings, errors)
    }
}

/// Parse one complete frame (without its delimiter).
pub fn parse_frame(frame: &[u8]) -> Result<LinkReport, ParseError> {
    let text = std::str::from_utf8(frame).map_err(|e| ParseError::InvalidUtf8 {
        details: e.to_string(),
    })?;

    let value: Value = serde_json::from_str(text).map_err(|e| ParseError::MalformedJson {
        details: e.to_string(),
    })?;

    if !value.is_object() {
        return Err(ParseError::UnexpectedShape {
            details: "top-level value is not an object".to_string(),
        });
    }

    serde_json::from_value(value).map_err(|e| ParseError::UnexpectedShape {
        details: e.to_string(),
    })
}
