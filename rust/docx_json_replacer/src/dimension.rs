//! Image dimensions, normalized to EMU (English Metric Units).

use serde_json::Value;

pub const EMU_PER_INCH: i64 = 914_400;
pub const EMU_PER_CM: i64 = 360_000;
pub const EMU_PER_PT: i64 = 12_700;
/// One CSS pixel at 96 DPI.
pub const EMU_PER_PX: i64 = 9_525;

/// A length in EMU, the unit used throughout DrawingML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Emu(pub i64);

impl Emu {
    pub fn from_cm(cm: f64) -> Self {
        Emu((cm * EMU_PER_CM as f64) as i64)
    }

    pub fn from_inches(inches: f64) -> Self {
        Emu((inches * EMU_PER_INCH as f64) as i64)
    }

    pub fn from_pt(pt: f64) -> Self {
        Emu((pt * EMU_PER_PT as f64) as i64)
    }

    pub fn from_px(px: f64) -> Self {
        Self::from_pt(px * 0.75)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

// Tried in order; the first matching suffix wins.
const UNIT_RULES: &[(&str, fn(f64) -> Emu)] = &[
    ("cm", Emu::from_cm),
    ("in", Emu::from_inches),
    ("pt", Emu::from_pt),
    ("px", Emu::from_px),
    ("emu", raw_emu),
];

fn raw_emu(v: f64) -> Emu {
    Emu(v as i64)
}

fn parse_number(s: &str) -> Option<f64> {
    let v = s.trim().parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

/// Parse a dimension string such as `"5cm"`, `"2in"`, `"200px"` or `"auto"`.
///
/// A bare number is taken as centimeters. Anything unparseable yields `None`.
pub fn parse_dimension_str(dim: &str) -> Option<Emu> {
    let dim = dim.trim().to_ascii_lowercase();
    if dim == "auto" {
        return None;
    }

    for &(suffix, convert) in UNIT_RULES {
        if let Some(number) = dim.strip_suffix(suffix) {
            return parse_number(number).map(convert);
        }
    }
    parse_number(&dim).map(Emu::from_cm)
}

/// Parse a dimension from a JSON value: numbers are centimeters, strings go
/// through [`parse_dimension_str`], everything else is unspecified.
pub fn parse_dimension(value: Option<&Value>) -> Option<Emu> {
    match value? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).map(Emu::from_cm),
        Value::String(s) => parse_dimension_str(s),
        _ => None,
    }
}
