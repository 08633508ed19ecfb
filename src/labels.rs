use std::collections::BTreeSet;
use std::fmt;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// LabelStandard – the two NWC SAF cloud type codings
// ---------------------------------------------------------------------------

/// Cloud type coding standard of a label array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelStandard {
    /// Legacy coding, codes 1–20.
    V2013,
    /// Current coding, codes 1–15.
    V2018,
}

impl fmt::Display for LabelStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelStandard::V2013 => write!(f, "v2013"),
            LabelStandard::V2018 => write!(f, "v2018"),
        }
    }
}

/// Code 0 marks unprocessed cells in both standards.
pub const NOT_PROCESSED: i64 = 0;

const V2013_NAMES: [&str; 21] = [
    "non-processed",
    "cloud-free land",
    "cloud-free sea",
    "snow over land",
    "sea ice",
    "very low cumuliform",
    "very low stratiform",
    "low cumuliform",
    "low stratiform",
    "medium cumuliform",
    "medium stratiform",
    "high opaque cumuliform",
    "high opaque stratiform",
    "very high opaque cumuliform",
    "very high opaque stratiform",
    "high semitransparent thin",
    "high semitransparent meanly thick",
    "high semitransparent thick",
    "high semitransparent above low or medium",
    "fractional",
    "undefined",
];

const V2018_NAMES: [&str; 16] = [
    "non-processed",
    "cloud-free land",
    "cloud-free sea",
    "snow over land",
    "sea ice",
    "very low",
    "low",
    "mid-level",
    "high opaque",
    "very high opaque",
    "fractional",
    "high semitransparent thin",
    "high semitransparent moderately thick",
    "high semitransparent thick",
    "high semitransparent above low or medium",
    "high semitransparent above snow/ice",
];

/// Legacy code → current code. Cumuliform/stratiform pairs merge into one
/// height class; "undefined" maps to non-processed.
const V2013_TO_V2018: [i64; 21] = [0, 1, 2, 3, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 11, 12, 13, 14, 10, 0];

/// Current code → legacy code. Lossy: height classes map to the stratiform
/// member, "above snow/ice" to "above low or medium".
const V2018_TO_V2013: [i64; 16] = [0, 1, 2, 3, 4, 6, 8, 10, 12, 14, 19, 15, 16, 17, 18, 18];

/// Codes that only exist in the legacy table.
const V2013_ONLY: std::ops::RangeInclusive<i64> = 16..=20;

impl LabelStandard {
    fn names(self) -> &'static [&'static str] {
        match self {
            LabelStandard::V2013 => &V2013_NAMES,
            LabelStandard::V2018 => &V2018_NAMES,
        }
    }

    fn max_code(self) -> i64 {
        self.names().len() as i64 - 1
    }
}

/// Category name of `code` under `standard`.
pub fn describe(code: i64, standard: LabelStandard) -> Option<&'static str> {
    usize::try_from(code)
        .ok()
        .and_then(|i| standard.names().get(i).copied())
}

fn as_code(value: f64) -> Option<i64> {
    (value.fract() == 0.0).then_some(value as i64)
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Determine which standard a label array is coded in.
///
/// NaN and the non-processed code are ignored. Returns `None` when a code is
/// not an integer or lies outside both tables, and when every code lies in
/// `1..=15`, which both tables share.
pub fn detect(labels: ArrayView1<'_, f64>) -> Option<LabelStandard> {
    let mut codes = BTreeSet::new();
    for &value in labels.iter().filter(|v| !v.is_nan()) {
        let code = as_code(value)?;
        if code != NOT_PROCESSED {
            codes.insert(code);
        }
    }

    let (&lowest, &highest) = (codes.first()?, codes.last()?);
    if lowest < 1 || highest > LabelStandard::V2013.max_code() {
        return None;
    }
    if codes.iter().any(|c| V2013_ONLY.contains(c)) {
        return Some(LabelStandard::V2013);
    }
    None
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Re-code `labels` from standard `from` into standard `to`.
///
/// `from == to` returns the input unchanged. NaN and the non-processed code
/// pass through. An unknown source standard is an error: detect it first or
/// configure it explicitly.
pub fn convert(
    labels: ArrayView1<'_, f64>,
    from: Option<LabelStandard>,
    to: LabelStandard,
) -> Result<Array1<f64>> {
    let from = from.ok_or_else(|| {
        Error::Value(format!(
            "cannot convert labels to {to}: source coding standard is unknown"
        ))
    })?;
    if from == to {
        return Ok(labels.to_owned());
    }
    let table: &[i64] = match from {
        LabelStandard::V2013 => &V2013_TO_V2018,
        LabelStandard::V2018 => &V2018_TO_V2013,
    };

    labels
        .iter()
        .map(|&value| {
            if value.is_nan() {
                return Ok(value);
            }
            as_code(value)
                .and_then(|code| usize::try_from(code).ok())
                .and_then(|i| table.get(i))
                .map(|&mapped| mapped as f64)
                .ok_or_else(|| Error::Value(format!("label {value} is not a {from} code")))
        })
        .collect()
}
