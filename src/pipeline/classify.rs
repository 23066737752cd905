//! Request classification
//!
//! Tags a question with the problem classes that drive prompt assembly and
//! the verification route. Pure substring/regex scanning over the lowercased
//! text; each rule is independent and tags are additive, never exclusive.

use once_cell::sync::Lazy;
use regex::Regex;

/// Problem-class tags derived once per request, immutable afterward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationTags {
    pub is_series: bool,
    pub is_trig_power_integral: bool,
    pub is_exp_times_trig: bool,
    /// Routes the request into the buffered, checked pipeline instead of the
    /// fast unchecked streaming path.
    pub requires_verification: bool,
}

impl ClassificationTags {
    /// Names of the tags that fired, for logging
    pub fn fired(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.is_series {
            names.push("series");
        }
        if self.is_trig_power_integral {
            names.push("trig_power_integral");
        }
        if self.is_exp_times_trig {
            names.push("exp_times_trig");
        }
        if self.requires_verification {
            names.push("requires_verification");
        }
        names
    }
}

// ============================================================================
// Pattern predicates
// ============================================================================

const INTEGRAL_MARKERS: &[&str] = &["integral", "integrate", "\\int", "∫"];
const SERIES_MARKERS: &[&str] = &["series", "converg", "diverg", "sum", "∑"];
const EXP_MARKERS: &[&str] = &["e^", "exp("];

/// Trig function immediately followed by a numeric exponent: `cos^3`,
/// `cos^{3}`, or the sloppy bare form `cos3`.
pub(crate) static TRIG_POWER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(sin|cos|tan|sec|csc|cot)\s*(\^\s*\{?\d+\}?|\d+)").unwrap()
});

static TRIG_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"sin|cos|tan|sec|csc|cot").unwrap());

pub(crate) fn has_integral_marker(lower: &str) -> bool {
    INTEGRAL_MARKERS.iter().any(|m| lower.contains(m))
}

fn has_series_marker(lower: &str) -> bool {
    SERIES_MARKERS.iter().any(|m| lower.contains(m))
}

fn has_exp_marker(lower: &str) -> bool {
    EXP_MARKERS.iter().any(|m| lower.contains(m))
}

// ============================================================================
// Classification
// ============================================================================

/// Classify a (normalized) question. O(len) scanning, no external state.
pub fn classify(text: &str) -> ClassificationTags {
    let lower = text.to_lowercase();

    let integral = has_integral_marker(&lower);

    let is_series = has_series_marker(&lower);
    let is_trig_power_integral = integral && TRIG_POWER.is_match(&lower);
    let is_exp_times_trig = integral && has_exp_marker(&lower) && TRIG_NAME.is_match(&lower);

    let tags = ClassificationTags {
        is_series,
        is_trig_power_integral,
        is_exp_times_trig,
        requires_verification: is_series || integral,
    };

    tracing::debug!(tags = ?tags.fired(), "classified question");
    tags
}
