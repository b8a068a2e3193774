//! Common types for cargo dimensions and length units.
//!
//! Dimensions are always held in millimetres once they enter the planner.
//! Conversion from user units happens exactly once, during item expansion.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Ordered (length, width, height) triple in millimetres.
///
/// Serialized as a plain JSON array `[length, width, height]` so that
/// snapshots stay compact and match what the 3D viewer consumes.
///
/// # Examples
/// ```
/// use load_planner::types::Dims;
///
/// let dims = Dims::new(1000.0, 500.0, 500.0);
/// assert_eq!(dims.volume(), 250_000_000.0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Dims {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl Dims {
    #[inline]
    pub const fn new(length: f64, width: f64, height: f64) -> Self {
        Self {
            length,
            width,
            height,
        }
    }

    /// Product of all three axes.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.length * self.width * self.height
    }

    /// Checks if all components and the volume are positive and finite.
    #[inline]
    pub fn is_valid(&self) -> bool {
        let volume = self.volume();
        [self.length, self.width, self.height]
            .iter()
            .all(|v| *v > 0.0 && v.is_finite())
            && volume > 0.0
            && volume.is_finite()
    }

    /// Checks if these dimensions fit within `outer` on every axis.
    ///
    /// Axes are compared pairwise; the item is never rotated.
    #[inline]
    pub fn fits_within(&self, outer: &Self) -> bool {
        self.length <= outer.length && self.width <= outer.width && self.height <= outer.height
    }

    /// Scales every axis by the same factor.
    #[inline]
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(
            self.length * factor,
            self.width * factor,
            self.height * factor,
        )
    }
}

impl From<[f64; 3]> for Dims {
    #[inline]
    fn from(values: [f64; 3]) -> Self {
        Self::new(values[0], values[1], values[2])
    }
}

impl From<Dims> for [f64; 3] {
    #[inline]
    fn from(dims: Dims) -> Self {
        [dims.length, dims.width, dims.height]
    }
}

/// Unit in which a row's dimensions were entered.
///
/// Deserialisation never fails: unknown units become millimetres.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum LengthUnit {
    #[default]
    Mm,
    Cm,
    M,
}

impl LengthUnit {
    /// Multiplier that converts a value in this unit to millimetres.
    pub const fn mm_factor(self) -> f64 {
        match self {
            LengthUnit::Mm => 1.0,
            LengthUnit::Cm => 10.0,
            LengthUnit::M => 1000.0,
        }
    }

    /// Multiplier that converts a value in this unit to metres.
    pub const fn metre_factor(self) -> f64 {
        match self {
            LengthUnit::Mm => 0.001,
            LengthUnit::Cm => 0.01,
            LengthUnit::M => 1.0,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            LengthUnit::Mm => "mm",
            LengthUnit::Cm => "cm",
            LengthUnit::M => "m",
        }
    }

    /// Parses a unit, falling back to millimetres for anything unknown.
    pub fn parse_or_default(raw: &str) -> Self {
        match raw.parse() {
            Ok(unit) => unit,
            Err(err) => {
                tracing::warn!(unit = raw, "{err}; using mm");
                LengthUnit::Mm
            }
        }
    }
}

impl From<String> for LengthUnit {
    fn from(raw: String) -> Self {
        Self::parse_or_default(&raw)
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unit strings outside `mm`, `cm` and `m`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown length unit '{0}'")]
pub struct UnknownUnit(pub String);

impl FromStr for LengthUnit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mm" => Ok(LengthUnit::Mm),
            "cm" => Ok(LengthUnit::Cm),
            "m" => Ok(LengthUnit::M),
            _ => Err(UnknownUnit(s.to_string())),
        }
    }
}

/// Returns the longest numeric prefix of `raw` as a float.
///
/// Leading whitespace is skipped. `"12abc"` yields `Some(12.0)`, `"abc"` yields `None`.
pub fn parse_leading_f64(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    let mut seen_dot = false;
    let mut seen_digit = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return None;
    }

    // Optional exponent, only taken when followed by at least one digit.
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    debug_assert!(end > digits_start);
    trimmed[..end].parse::<f64>().ok()
}

/// Returns the integer prefix of `raw`, truncating any fractional part.
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    trimmed[..end].parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dims_volume_is_exact_product() {
        let dims = Dims::new(1000.0, 500.0, 500.0);
        assert_eq!(dims.volume(), 250_000_000.0);
    }

    #[test]
    fn test_dims_fit_without_rotation() {
        let outer = Dims::new(5898.0, 2352.0, 2393.0);
        assert!(Dims::new(5898.0, 2352.0, 2393.0).fits_within(&outer));
        assert!(!Dims::new(2352.0, 5898.0, 2393.0).fits_within(&outer));
    }

    #[test]
    fn test_dims_validity() {
        assert!(Dims::new(1.0, 1.0, 1.0).is_valid());
        assert!(!Dims::new(0.0, 1.0, 1.0).is_valid());
        assert!(!Dims::new(1.0, f64::NAN, 1.0).is_valid());
        assert!(!Dims::new(1.0, 1.0, f64::INFINITY).is_valid());
        // finite axes whose product overflows or underflows
        assert!(!Dims::new(1e120, 1e120, 1e120).is_valid());
        assert!(!Dims::new(1e-120, 1e-120, 1e-120).is_valid());
    }

    #[test]
    fn test_dims_serialize_as_array() {
        let json = serde_json::to_string(&Dims::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(json, "[1.0,2.0,3.0]");
        let back: Dims = serde_json::from_str("[4,5,6]").unwrap();
        assert_eq!(back, Dims::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_unit_factors() {
        assert_eq!(LengthUnit::Mm.mm_factor(), 1.0);
        assert_eq!(LengthUnit::Cm.mm_factor(), 10.0);
        assert_eq!(LengthUnit::M.mm_factor(), 1000.0);
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("CM".parse::<LengthUnit>(), Ok(LengthUnit::Cm));
        assert_eq!(" m ".parse::<LengthUnit>(), Ok(LengthUnit::M));
        assert!("inch".parse::<LengthUnit>().is_err());
        assert_eq!(LengthUnit::parse_or_default("ft"), LengthUnit::Mm);
    }

    #[test]
    fn test_unit_json_falls_back_to_mm() {
        let unit: LengthUnit = serde_json::from_str("\"CM\"").unwrap();
        assert_eq!(unit, LengthUnit::Cm);
        let unit: LengthUnit = serde_json::from_str("\"yards\"").unwrap();
        assert_eq!(unit, LengthUnit::Mm);
        assert_eq!(serde_json::to_string(&LengthUnit::M).unwrap(), "\"m\"");
    }

    #[test]
    fn test_parse_leading_f64() {
        assert_eq!(parse_leading_f64("12"), Some(12.0));
        assert_eq!(parse_leading_f64("  2.5m"), Some(2.5));
        assert_eq!(parse_leading_f64("12abc"), Some(12.0));
        assert_eq!(parse_leading_f64("-3"), Some(-3.0));
        assert_eq!(parse_leading_f64("1e3"), Some(1000.0));
        assert_eq!(parse_leading_f64("7e"), Some(7.0));
        assert_eq!(parse_leading_f64(".5"), Some(0.5));
        assert_eq!(parse_leading_f64("abc"), None);
        assert_eq!(parse_leading_f64(""), None);
        assert_eq!(parse_leading_f64("-"), None);
    }

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("5"), Some(5));
        assert_eq!(parse_leading_int("2.7"), Some(2));
        assert_eq!(parse_leading_int("10 boxes"), Some(10));
        assert_eq!(parse_leading_int("-1"), Some(-1));
        assert_eq!(parse_leading_int("x"), None);
    }
}
