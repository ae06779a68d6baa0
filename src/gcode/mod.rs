//! Line-level G-code field extraction
//!
//! Small pure functions that map a line of text to an optional numeric
//! value or a classification. The tracker stays free of parsing detail;
//! everything here is independently testable.

use regex::Regex;
use std::sync::LazyLock;

/// Signed decimal immediately following whitespace and the letter E.
static EXTRUSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\sE(-?\d+\.?\d*)").unwrap());

/// Decimal immediately following the letter F.
static FEEDRATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"F(\d+\.?\d*)").unwrap());

/// First decimal token on a line, used for header weight comments.
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(\.\d+)?").unwrap());

/// Extract the extrusion-axis value from a move or reset line.
///
/// A malformed or absent E field yields 0.0 rather than an error; the
/// accounting pass treats that as "no extrusion on this line".
pub fn extrusion_value(line: &str) -> f64 {
    EXTRUSION_RE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Extract the feedrate (F word) from a line, if one is present.
pub fn feedrate(line: &str) -> Option<f64> {
    FEEDRATE_RE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Scan header lines for a spool-weight comment.
///
/// Matches any line whose lowercase form contains "spool weight"; the
/// first numeric token is the weight in grams, multiplied by 1000 when
/// the line also mentions "kg".
pub fn spool_weight_from_header<'a, I>(lines: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a str>,
{
    for line in lines {
        let lower = line.to_lowercase();
        if !lower.contains("spool weight") {
            continue;
        }
        if let Some(m) = NUMBER_RE.find(line) {
            if let Ok(mut weight) = m.as_str().parse::<f64>() {
                if lower.contains("kg") {
                    weight *= 1000.0;
                }
                return Some(weight);
            }
        }
    }
    None
}

/// Layer-change marker inserted by upstream slicers.
pub fn is_layer_marker(trimmed: &str) -> bool {
    trimmed.starts_with("; layer")
}

/// G92 with an E field resets the extrusion counter.
pub fn is_counter_reset(trimmed: &str) -> bool {
    trimmed.starts_with("G92") && trimmed.contains('E')
}

/// G1 with an E field is a candidate extrusion move.
pub fn is_extrusion_move(trimmed: &str) -> bool {
    trimmed.starts_with("G1") && trimmed.contains('E')
}

/// Whether the line carries any positional axis word (X, Y, or Z).
/// A G1 E line without one is a pure retraction or prime.
pub fn has_positional_axis(trimmed: &str) -> bool {
    trimmed.contains('X') || trimmed.contains('Y') || trimmed.contains('Z')
}
