//! Defensive repair of oracle scoring output.
//!
//! The oracle is asked for a JSON object with a `scores` array, but in
//! practice wraps the array under assorted keys, returns a bare array, or
//! pads the JSON with prose. [`repair`] turns whatever came back into a
//! complete result set for the expected ids: unknown ids are dropped, numeric
//! fields are clamped, and missing ids get placeholders. Pure and idempotent;
//! it never fails.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Canonical sub-score names, also used for zeroed placeholder breakdowns.
pub const BREAKDOWN_KEYS: [&str; 4] = ["skills", "experience", "education", "alignment"];

/// Diagnostic gap string installed on placeholder results.
pub const PLACEHOLDER_GAP: &str = "Unable to calculate match";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "Highly recommended")]
    HighlyRecommended,
    #[serde(rename = "Recommended")]
    Recommended,
    #[serde(rename = "Consider")]
    Consider,
    #[serde(rename = "Not recommended")]
    NotRecommended,
}

impl Recommendation {
    /// Band mapping: >=80 highly recommended, 65-79 recommended, 50-64
    /// consider, below 50 not recommended.
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Self::HighlyRecommended,
            65..=79 => Self::Recommended,
            50..=64 => Self::Consider,
            _ => Self::NotRecommended,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighlyRecommended => "Highly recommended",
            Self::Recommended => "Recommended",
            Self::Consider => "Consider",
            Self::NotRecommended => "Not recommended",
        }
    }
}

/// One scored work item, post-repair. Every field is guaranteed in range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    pub id: String,
    pub score: u8,
    pub breakdown: BTreeMap<String, u8>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    pub recommendation: Recommendation,
}

impl ScoreResult {
    /// Zero-score stand-in for an id the oracle failed to cover.
    pub fn placeholder(id: impl Into<String>) -> Self {
        let breakdown = BREAKDOWN_KEYS
            .iter()
            .map(|k| (k.to_string(), 0))
            .collect();
        Self {
            id: id.into(),
            score: 0,
            breakdown,
            strengths: Vec::new(),
            gaps: vec![PLACEHOLDER_GAP.to_string()],
            recommendation: Recommendation::NotRecommended,
        }
    }

    /// True when this result is a degradation placeholder rather than an
    /// oracle score.
    pub fn is_placeholder(&self) -> bool {
        self.score == 0 && self.gaps.iter().any(|g| g == PLACEHOLDER_GAP)
    }
}

/// Extract the first balanced JSON object or array from chatty model output.
///
/// Tolerates markdown fences and prose before and after the JSON. Returns
/// `None` when no balanced candidate parses.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(text.trim()) {
        return Some(v);
    }
    for open in ['{', '['] {
        let close = if open == '{' { '}' } else { ']' };
        let Some(start) = text.find(open) else {
            continue;
        };
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (i, c) in text[start..].char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' if in_string => escaped = true,
                '"' => in_string = !in_string,
                c if c == open && !in_string => depth += 1,
                c if c == close && !in_string => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &text[start..start + i + c.len_utf8()];
                        if let Ok(v) = serde_json::from_str::<Value>(candidate) {
                            return Some(v);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// A named way of locating the result array inside a parsed payload.
struct Extractor {
    name: &'static str,
    find: fn(&Value) -> Option<&Vec<Value>>,
}

fn under_key<'a>(value: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    value.get(key).and_then(Value::as_array)
}

/// Ordered strategy chain. First extractor that yields an array wins; later
/// ones are never consulted.
const EXTRACTORS: [Extractor; 7] = [
    Extractor {
        name: "scores_key",
        find: |v| under_key(v, "scores"),
    },
    Extractor {
        name: "results_key",
        find: |v| under_key(v, "results"),
    },
    Extractor {
        name: "jobs_key",
        find: |v| under_key(v, "jobs"),
    },
    Extractor {
        name: "items_key",
        find: |v| under_key(v, "items"),
    },
    Extractor {
        name: "entries_key",
        find: |v| under_key(v, "entries"),
    },
    Extractor {
        name: "bare_array",
        find: Value::as_array,
    },
    Extractor {
        name: "first_array_value",
        find: |v| {
            v.as_object()
                .and_then(|o| o.values().find_map(Value::as_array))
        },
    },
];

/// Clamp a JSON number (or numeric string) into the 0..=100 score range.
pub(crate) fn clamp_score(value: &Value) -> u8 {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                f.clamp(0.0, 100.0).round() as u8
            } else {
                0
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(|f| f.clamp(0.0, 100.0).round() as u8)
            .unwrap_or(0),
        _ => 0,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn entry_id(entry: &Value) -> Option<String> {
    for key in ["id", "job_id", "jobId", "item_id"] {
        match entry.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn parse_entry(entry: &Value) -> Option<ScoreResult> {
    let id = entry_id(entry)?;
    let score = entry
        .get("score")
        .or_else(|| entry.get("match_score"))
        .map(clamp_score)
        .unwrap_or(0);
    let mut breakdown = BTreeMap::new();
    if let Some(obj) = entry.get("breakdown").and_then(Value::as_object) {
        for (k, v) in obj {
            breakdown.insert(k.clone(), clamp_score(v));
        }
    }
    let recommendation = entry
        .get("recommendation")
        .and_then(|v| serde_json::from_value::<Recommendation>(v.clone()).ok())
        .unwrap_or_else(|| Recommendation::from_score(score));
    Some(ScoreResult {
        id,
        score,
        breakdown,
        strengths: string_list(entry.get("strengths")),
        gaps: string_list(entry.get("gaps")),
        recommendation,
    })
}

/// Repair a raw oracle response against the ids it was asked to score.
///
/// The returned map contains exactly `expected_ids`, once each: entries the
/// oracle covered (and that parsed) carry its scores, everything else is a
/// [`ScoreResult::placeholder`]. Ids the oracle invented are discarded.
pub fn repair(raw: &str, expected_ids: &[String]) -> BTreeMap<String, ScoreResult> {
    let mut out: BTreeMap<String, ScoreResult> = BTreeMap::new();

    if let Some(payload) = extract_json(raw) {
        let found = EXTRACTORS
            .iter()
            .find_map(|e| (e.find)(&payload).map(|arr| (e.name, arr)));
        if let Some((strategy, entries)) = found {
            for entry in entries {
                let Some(result) = parse_entry(entry) else {
                    continue;
                };
                if !expected_ids.contains(&result.id) {
                    warn!(id = %result.id, strategy, "discarding unexpected id in oracle output");
                    continue;
                }
                out.entry(result.id.clone()).or_insert(result);
            }
        } else {
            warn!("oracle payload parsed but no extraction strategy matched");
        }
    } else {
        warn!(len = raw.len(), "no JSON found in oracle output");
    }

    for id in expected_ids {
        out.entry(id.clone())
            .or_insert_with(|| ScoreResult::placeholder(id.clone()));
    }
    out
}

/// Placeholders for every expected id, used when the group call itself failed.
pub fn placeholders(expected_ids: &[String]) -> BTreeMap<String, ScoreResult> {
    expected_ids
        .iter()
        .map(|id| (id.clone(), ScoreResult::placeholder(id.clone())))
        .collect()
}
