//! Red-flag detection over candidate responses
//!
//! Deterministic, side-effect-free scan of a model response for structural
//! and policy defects: cheap syntactic proxies for the failure modes graded
//! solutions actually exhibit (unfinished answers, tool talk, known-wrong
//! closed forms, broken KaTeX grouping).
//!
//! Every rule runs on every call - there is no short-circuit - so the full
//! flag set is always available for logging even though only emptiness
//! drives the retry loop.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use super::classify::{has_integral_marker, ClassificationTags, TRIG_POWER};

// ============================================================================
// Flags
// ============================================================================

/// One named structural/policy defect found in a response.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DefectFlag {
    /// No `\boxed{...}` final-answer marker anywhere in the response
    MissingBoxedAnswer,
    /// A deny-listed phrase appeared (one flag per matched phrase)
    ForbiddenPhrase(String),
    /// Two or more distinct subscripted constants (C_1 and C_2) - an
    /// unintegrated or incorrectly split antiderivative
    MultipleArbitraryConstants,
    /// The final boxed answer still contains an integral sign
    UnevaluatedIntegralInFinalAnswer,
    /// `\left` and `\right` counts disagree
    UnbalancedDelimiterPair,
    /// Brace depth goes negative or ends nonzero
    UnmatchedBraces,
    /// A catalogued known-wrong closed form (e.g. claiming
    /// the antiderivative of cos^3 is (1/3)sin^3)
    WrongTrigAntiderivative,
    /// Integration by parts used on a trig-power integral
    MethodMisuseForTrigPower,
}

impl DefectFlag {
    /// Stable label for logs. Never shown to end users.
    pub fn label(&self) -> String {
        match self {
            DefectFlag::MissingBoxedAnswer => "missing_boxed_answer".into(),
            DefectFlag::ForbiddenPhrase(p) => format!("forbidden_phrase:{}", p),
            DefectFlag::MultipleArbitraryConstants => "multiple_arbitrary_constants".into(),
            DefectFlag::UnevaluatedIntegralInFinalAnswer => {
                "unevaluated_integral_in_final_answer".into()
            }
            DefectFlag::UnbalancedDelimiterPair => "unbalanced_delimiter_pair".into(),
            DefectFlag::UnmatchedBraces => "unmatched_braces".into(),
            DefectFlag::WrongTrigAntiderivative => "wrong_trig_antiderivative".into(),
            DefectFlag::MethodMisuseForTrigPower => "method_misuse_for_trig_power".into(),
        }
    }
}

// ============================================================================
// Policy
// ============================================================================

/// A deny-listed phrase and how to match it
#[derive(Debug, Clone)]
pub struct PhraseRule {
    pub phrase: String,
    /// Match only at word boundaries (for short tokens like "cas")
    pub whole_word: bool,
}

impl PhraseRule {
    fn substring(phrase: &str) -> Self {
        Self {
            phrase: phrase.into(),
            whole_word: false,
        }
    }

    fn word(phrase: &str) -> Self {
        Self {
            phrase: phrase.into(),
            whole_word: true,
        }
    }
}

/// Swappable pedagogical policy: which phrases and solution methods are
/// disallowed. The mechanism (pattern-triggered flags) is fixed; this text
/// is configuration.
#[derive(Debug, Clone)]
pub struct DetectorPolicy {
    pub forbidden_phrases: Vec<PhraseRule>,
    /// Wording that indicates integration by parts on a trig-power integral
    pub forbidden_trig_power_methods: Vec<String>,
}

impl Default for DetectorPolicy {
    fn default() -> Self {
        Self {
            forbidden_phrases: vec![
                PhraseRule::substring("numerical method"),
                PhraseRule::substring("software"),
                PhraseRule::substring("calculator"),
                PhraseRule::word("cas"),
                PhraseRule::substring("elliptic integral"),
                PhraseRule::substring("too complex"),
                PhraseRule::substring("requires computation"),
                PhraseRule::substring("cannot be expressed"),
                PhraseRule::substring("no closed form"),
            ],
            forbidden_trig_power_methods: vec![
                "integration by parts".into(),
                "tabular method".into(),
                "u\\,dv".into(),
                "u dv".into(),
            ],
        }
    }
}

// ============================================================================
// Rule table
// ============================================================================

struct DetectInput<'a> {
    text: &'a str,
    lower: &'a str,
    tags: &'a ClassificationTags,
    policy: &'a DetectorPolicy,
}

struct RedFlagRule {
    name: &'static str,
    check: fn(&DetectInput) -> Vec<DefectFlag>,
}

const RULES: &[RedFlagRule] = &[
    RedFlagRule {
        name: "missing_boxed_answer",
        check: check_missing_boxed,
    },
    RedFlagRule {
        name: "forbidden_phrases",
        check: check_forbidden_phrases,
    },
    RedFlagRule {
        name: "multiple_arbitrary_constants",
        check: check_multiple_constants,
    },
    RedFlagRule {
        name: "unevaluated_integral_in_final_answer",
        check: check_boxed_integral,
    },
    RedFlagRule {
        name: "unbalanced_delimiter_pair",
        check: check_delimiter_pairs,
    },
    RedFlagRule {
        name: "unmatched_braces",
        check: check_brace_depth,
    },
    RedFlagRule {
        name: "wrong_trig_antiderivative",
        check: check_wrong_trig_antiderivative,
    },
    RedFlagRule {
        name: "method_misuse_for_trig_power",
        check: check_method_misuse,
    },
];

/// Scan a candidate response and return its full defect set.
///
/// Pure and idempotent: the same `(text, tags)` always yields the same set.
pub fn detect(
    text: &str,
    tags: &ClassificationTags,
    policy: &DetectorPolicy,
) -> BTreeSet<DefectFlag> {
    let lower = text.to_lowercase();
    let input = DetectInput {
        text,
        lower: &lower,
        tags,
        policy,
    };

    let mut flags = BTreeSet::new();
    for rule in RULES {
        let hits = (rule.check)(&input);
        if !hits.is_empty() {
            tracing::debug!(rule = rule.name, hits = hits.len(), "red-flag rule fired");
        }
        flags.extend(hits);
    }
    flags
}

// ============================================================================
// Individual rules
// ============================================================================

const BOXED_MARKER: &str = "\\boxed{";

fn check_missing_boxed(input: &DetectInput) -> Vec<DefectFlag> {
    if input.text.contains(BOXED_MARKER) {
        vec![]
    } else {
        vec![DefectFlag::MissingBoxedAnswer]
    }
}

/// Case-insensitive phrase match, optionally bounded at word edges.
fn phrase_matches(lower: &str, rule: &PhraseRule) -> bool {
    let needle = rule.phrase.to_lowercase();
    if !rule.whole_word {
        return lower.contains(&needle);
    }
    let mut from = 0;
    while let Some(pos) = lower[from..].find(&needle) {
        let start = from + pos;
        let end = start + needle.len();
        let left_ok = start == 0
            || !lower[..start]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let right_ok = end == lower.len()
            || !lower[end..].chars().next().is_some_and(|c| c.is_alphanumeric());
        if left_ok && right_ok {
            return true;
        }
        from = end;
    }
    false
}

fn check_forbidden_phrases(input: &DetectInput) -> Vec<DefectFlag> {
    input
        .policy
        .forbidden_phrases
        .iter()
        .filter(|rule| phrase_matches(input.lower, rule))
        .map(|rule| DefectFlag::ForbiddenPhrase(rule.phrase.to_lowercase()))
        .collect()
}

/// Subscripted constant tokens: C_1, C_{1}, C1, C₁ (digits 1 and 2 only)
static CONSTANT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"C\s*(?:_\s*\{?\s*([12])\s*\}?|([12])|([₁₂]))").unwrap());

fn check_multiple_constants(input: &DetectInput) -> Vec<DefectFlag> {
    let mut seen = BTreeSet::new();
    for caps in CONSTANT_TOKEN.captures_iter(input.text) {
        let digit = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().chars().next().unwrap())
            .or_else(|| {
                caps.get(3).map(|m| match m.as_str() {
                    "₁" => '1',
                    _ => '2',
                })
            });
        if let Some(d) = digit {
            seen.insert(d);
        }
    }
    if seen.len() >= 2 {
        vec![DefectFlag::MultipleArbitraryConstants]
    } else {
        vec![]
    }
}

/// Content of the last `\boxed{...}` group, braces matched by depth.
/// Returns the remainder of the string when the group never closes.
fn final_boxed_content(text: &str) -> Option<&str> {
    let start = text.rfind(BOXED_MARKER)? + BOXED_MARKER.len();
    let mut depth = 1i32;
    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i]);
                }
            }
            _ => {}
        }
    }
    Some(&text[start..])
}

fn check_boxed_integral(input: &DetectInput) -> Vec<DefectFlag> {
    match final_boxed_content(input.text) {
        Some(content) if content.contains("\\int") || content.contains('∫') => {
            vec![DefectFlag::UnevaluatedIntegralInFinalAnswer]
        }
        _ => vec![],
    }
}

fn check_delimiter_pairs(input: &DetectInput) -> Vec<DefectFlag> {
    let lefts = input.text.matches("\\left").count();
    let rights = input.text.matches("\\right").count();
    if lefts != rights {
        vec![DefectFlag::UnbalancedDelimiterPair]
    } else {
        vec![]
    }
}

fn check_brace_depth(input: &DetectInput) -> Vec<DefectFlag> {
    let mut depth = 0i64;
    for ch in input.text.chars() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return vec![DefectFlag::UnmatchedBraces];
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        vec![DefectFlag::UnmatchedBraces]
    } else {
        vec![]
    }
}

/// Whole-claim pattern for "the antiderivative is (1/3) f^3": an optional
/// sign, the cubed-over-three term in any common spelling, an optional
/// variable, an optional +C. Matched against the compacted boxed content,
/// never a substring - f^3/3 is a legitimate term of the correct forms.
fn wrong_cubed_claim(f: &str) -> Regex {
    let pattern = format!(
        r"^[+-]?(?:\\frac\{{1\}}\{{3\}}\\?{f}\^\{{?3\}}?|\(1/3\)\\?{f}\^\{{?3\}}?|\\frac\{{\\?{f}\^\{{?3\}}?[a-z()\\]*\}}\{{3\}}|\\?{f}\^\{{?3\}}?[a-z()\\]*/3)(?:\([a-z]\)|[a-z])?(?:\+c(?:_\{{?\d\}}?)?)?$",
    );
    Regex::new(&pattern).unwrap()
}

/// Catalog of known-wrong closed forms: (integrand stated in the response,
/// wrong antiderivative claimed as the final boxed answer).
static WRONG_TRIG_FORMS: Lazy<Vec<(Regex, Regex)>> = Lazy::new(|| {
    vec![
        // claiming the antiderivative of cos^3 is (1/3)sin^3
        (
            Regex::new(r"cos\s*\^\s*\{?3").unwrap(),
            wrong_cubed_claim("sin"),
        ),
        // the symmetric sin^3 -> (1/3)cos^3 error
        (
            Regex::new(r"sin\s*\^\s*\{?3").unwrap(),
            wrong_cubed_claim("cos"),
        ),
    ]
});

fn check_wrong_trig_antiderivative(input: &DetectInput) -> Vec<DefectFlag> {
    let Some(content) = final_boxed_content(input.text) else {
        return vec![];
    };
    // Compact the claim: lowercase, no whitespace or spacing commands
    let compact: String = content
        .to_lowercase()
        .replace("\\,", "")
        .replace("\\;", "")
        .replace("\\!", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    for (integrand, claim) in WRONG_TRIG_FORMS.iter() {
        if integrand.is_match(input.lower) && claim.is_match(&compact) {
            return vec![DefectFlag::WrongTrigAntiderivative];
        }
    }
    vec![]
}

fn check_method_misuse(input: &DetectInput) -> Vec<DefectFlag> {
    if !input.tags.is_trig_power_integral {
        return vec![];
    }
    let has_trig_power_integral =
        has_integral_marker(input.lower) && TRIG_POWER.is_match(input.lower);
    if !has_trig_power_integral {
        return vec![];
    }
    let used_forbidden_method = input
        .policy
        .forbidden_trig_power_methods
        .iter()
        .any(|m| input.lower.contains(&m.to_lowercase()));
    if used_forbidden_method {
        vec![DefectFlag::MethodMisuseForTrigPower]
    } else {
        vec![]
    }
}
