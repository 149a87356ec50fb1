#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Null,
    Bool,
    Int64,
    Float64,
    Utf8,
}

/// One raw respondent answer as exported from SPSS or CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Cell {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl Cell {
    #[must_use]
    pub fn kind(&self) -> CellKind {
        match self {
            Self::Null => CellKind::Null,
            Self::Bool(_) => CellKind::Bool,
            Self::Int64(_) => CellKind::Int64,
            Self::Float64(_) => CellKind::Float64,
            Self::Utf8(_) => CellKind::Utf8,
        }
    }

    /// `Null` and float NaN (SPSS system-missing) are both missing.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Category label used for frequency keys and string comparison.
    ///
    /// Whole-number floats render without a fractional part so that a
    /// code stored as `2.0` and a code stored as `2` share a label.
    /// Missing cells have no label.
    #[must_use]
    pub fn label(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(v) => Some(v.to_string()),
            Self::Int64(v) => Some(v.to_string()),
            Self::Float64(v) if v.is_nan() => None,
            Self::Float64(v) => Some(format_number(*v)),
            Self::Utf8(v) => Some(v.clone()),
        }
    }

    /// Equality that treats two missing values as equal.
    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_missing() && b.is_missing() => true,
            _ => self == other,
        }
    }

    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Null => Err(TypeError::ValueIsMissing),
            Self::Float64(v) if v.is_nan() => Err(TypeError::ValueIsMissing),
            other => try_numeric(other).ok_or_else(|| TypeError::NonNumericValue {
                value: other.label().unwrap_or_default(),
                kind: other.kind(),
            }),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => f.write_str(&label),
            None => Ok(()),
        }
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("value {value:?} of kind {kind:?} is not numeric")]
    NonNumericValue { value: String, kind: CellKind },
    #[error("value is missing")]
    ValueIsMissing,
}

/// Total numeric coercion shared by the evaluator and the aggregator.
///
/// Strings are trimmed and parsed; anything unparseable, missing, or NaN
/// yields `None`.
#[must_use]
pub fn try_numeric(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Null => None,
        Cell::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
        Cell::Int64(v) => Some(*v as f64),
        Cell::Float64(v) => (!v.is_nan()).then_some(*v),
        Cell::Utf8(v) => parse_number(v),
    }
}

/// Parse a free-standing token the same way string cells are coerced.
#[must_use]
pub fn parse_number(token: &str) -> Option<f64> {
    token
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| !value.is_nan())
}

#[must_use]
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Round half away from zero to `places` decimals.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::{Cell, CellKind, TypeError, format_number, round_to, try_numeric};

    #[test]
    fn numeric_coercion_is_total() {
        assert_eq!(try_numeric(&Cell::Int64(7)), Some(7.0));
        assert_eq!(try_numeric(&Cell::Utf8(" 5 ".to_owned())), Some(5.0));
        assert_eq!(try_numeric(&Cell::Utf8("x".to_owned())), None);
        assert_eq!(try_numeric(&Cell::Utf8("nan".to_owned())), None);
        assert_eq!(try_numeric(&Cell::Float64(f64::NAN)), None);
        assert_eq!(try_numeric(&Cell::Null), None);
        assert_eq!(try_numeric(&Cell::Bool(true)), Some(1.0));
    }

    #[test]
    fn nan_is_missing() {
        assert!(Cell::Float64(f64::NAN).is_missing());
        assert!(Cell::Null.is_missing());
        assert!(!Cell::Utf8(String::new()).is_missing());
    }

    #[test]
    fn whole_floats_share_integer_labels() {
        assert_eq!(Cell::Float64(2.0).label().as_deref(), Some("2"));
        assert_eq!(Cell::Int64(2).label().as_deref(), Some("2"));
        assert_eq!(Cell::Float64(2.5).label().as_deref(), Some("2.5"));
        assert_eq!(Cell::Null.label(), None);
        assert_eq!(format_number(-3.0), "-3");
    }

    #[test]
    fn to_f64_reports_non_numeric_strings() {
        let err = Cell::from("Male").to_f64().expect_err("must fail");
        assert_eq!(
            err,
            TypeError::NonNumericValue {
                value: "Male".to_owned(),
                kind: CellKind::Utf8,
            }
        );
        assert_eq!(err.to_string(), "value \"Male\" of kind Utf8 is not numeric");
    }

    #[test]
    fn rounding_goes_half_away_from_zero() {
        assert_eq!(round_to(66.666_666, 1), 66.7);
        assert_eq!(round_to(33.333_333, 1), 33.3);
        assert_eq!(round_to(1.005_1, 2), 1.01);
    }

    #[test]
    fn cell_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Cell::Int64(3)).expect("serialize");
        assert_eq!(json, r#"{"kind":"int64","value":3}"#);
    }
}
