use std::fmt::Display;

use hifitime::Epoch;
use serde::{ser::SerializeStruct, Serialize, Serializer};

use crate::RawBits;

/// A typed raw or engineering value for a single item.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Boolean { value: bool, label: String },
    Enumerated { value: i64, label: String },
    String(String),
    Binary(RawBits),
    Time(Epoch),
}

impl Value {
    /// Numeric interpretation, if this value has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Unsigned(v) => Some(*v as f64),
            Value::Signed(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Boolean { value, .. } => Some(if *value { 1.0 } else { 0.0 }),
            Value::Enumerated { value, .. } => Some(*value as f64),
            Value::String(_) | Value::Binary(_) | Value::Time(_) => None,
        }
    }

    /// Exact integer interpretation, if this value has one.
    #[must_use]
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Unsigned(v) => Some(i128::from(*v)),
            Value::Signed(v) => Some(i128::from(*v)),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i128),
            Value::Boolean { value, .. } => Some(i128::from(*value)),
            Value::Enumerated { value, .. } => Some(i128::from(*value)),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Unsigned(v) => write!(f, "{v}"),
            Value::Signed(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Boolean { label, .. } | Value::Enumerated { label, .. } => f.write_str(label),
            Value::String(s) => f.write_str(s),
            Value::Binary(bits) => write!(f, "{bits}"),
            Value::Time(epoch) => write!(f, "{epoch}"),
        }
    }
}

/// Result of decoding a single item: its raw bits plus the uncalibrated and calibrated
/// (engineering) interpretations.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedValue {
    pub raw: RawBits,
    pub uncalibrated: Value,
    pub calibrated: Value,
}

impl DecodedValue {
    /// The value compared against for the given form.
    #[must_use]
    pub fn for_form(&self, form: crate::ValueForm) -> &Value {
        match form {
            crate::ValueForm::Calibrated => &self.calibrated,
            crate::ValueForm::Uncalibrated => &self.uncalibrated,
        }
    }
}

impl Display for DecodedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.calibrated)
    }
}

impl Serialize for DecodedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("DecodedValue", 3)?;
        s.serialize_field("raw", &self.raw.to_hex())?;
        s.serialize_field("uncalibrated", &self.uncalibrated.to_string())?;
        s.serialize_field("calibrated", &self.calibrated.to_string())?;
        s.end()
    }
}

/// A value along with any data anomalies encountered producing it.
///
/// Anomalies never abort decoding or encoding, they are collected here so the caller can
/// decide what to do about them.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Outcome {
            value,
            warnings: Vec::default(),
        }
    }

    pub fn with_warnings(value: T, warnings: Vec<String>) -> Self {
        Outcome { value, warnings }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            warnings: self.warnings,
        }
    }

    /// Move warnings into `sink` and return the value.
    pub fn drain_into(self, sink: &mut Vec<String>) -> T {
        sink.extend(self.warnings);
        self.value
    }

    pub fn into_parts(self) -> (T, Vec<String>) {
        (self.value, self.warnings)
    }
}

/// Parse an integer literal. Accepts decimal with optional sign, `0x` hex, and `0b` binary.
pub(crate) fn parse_integer(s: &str) -> Option<i128> {
    let s = s.trim();
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let magnitude = if let Some(h) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i128::from_str_radix(h, 16).ok()?
    } else if let Some(b) = digits
        .strip_prefix("0b")
        .or_else(|| digits.strip_prefix("0B"))
    {
        i128::from_str_radix(b, 2).ok()?
    } else {
        digits.parse::<i128>().ok()?
    };
    Some(if neg { -magnitude } else { magnitude })
}

/// Parse a floating point literal, also accepting any integer literal [parse_integer]
/// accepts.
pub(crate) fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<f64>() {
        return Some(v);
    }
    parse_integer(s).map(|v| v as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("42", Some(42))]
    #[test_case("-42", Some(-42))]
    #[test_case("0x1F", Some(31))]
    #[test_case("0b101", Some(5))]
    #[test_case("4.5", None)]
    #[test_case("abc", None)]
    fn integer_literals(s: &str, expected: Option<i128>) {
        assert_eq!(parse_integer(s), expected);
    }

    #[test]
    fn float_display_drops_trailing_zero() {
        assert_eq!(Value::Float(9.0).to_string(), "9");
        assert_eq!(Value::Float(14.25).to_string(), "14.25");
    }

    #[test]
    fn outcome_drain() {
        let mut sink = vec!["first".to_string()];
        let outcome = Outcome::with_warnings(5, vec!["second".to_string()]);
        assert_eq!(outcome.drain_into(&mut sink), 5);
        assert_eq!(sink, vec!["first", "second"]);
    }
}
