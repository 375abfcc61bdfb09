//! Best-effort extraction of a verdict from four-step model output.
//!
//! The single-shot prompts ask the model to answer in this shape:
//!
//! ```text
//! Step 1: <summary>
//! Step 2: <Yes/No> - <justification>
//! Step 3: <projected image>
//! Step 4: Score = <-2..+2 or Unclear> - <justification>
//! ```
//!
//! Models rarely follow it exactly, so extraction is tolerant: each step is
//! captured from its marker up to the next step's marker (case-insensitive,
//! across newlines), and a missing step yields `None` instead of failing.
//!
//! [`parse_output`] never fails. If extraction itself errors, the result
//! degrades to [`Label::Uncertain`] with the raw text kept in `meta`.

use crate::models::Label;
use fancy_regex::Regex as FancyRegex;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

// Steps 1-3 end where the next step begins; a step without a following
// marker is treated as missing.
static STEP_1: LazyLock<FancyRegex> = LazyLock::new(|| {
    FancyRegex::new(r"(?is)Step\s*1[:\-–]\s*(.*?)(?=\nStep\s*2[:\-–])")
        .expect("Invalid step 1 pattern")
});
static STEP_2: LazyLock<FancyRegex> = LazyLock::new(|| {
    FancyRegex::new(r"(?is)Step\s*2[:\-–]\s*(.*?)(?=\nStep\s*3[:\-–])")
        .expect("Invalid step 2 pattern")
});
static STEP_3: LazyLock<FancyRegex> = LazyLock::new(|| {
    FancyRegex::new(r"(?is)Step\s*3[:\-–]\s*(.*?)(?=\nStep\s*4[:\-–])")
        .expect("Invalid step 3 pattern")
});
static STEP_4_SCORE: LazyLock<FancyRegex> = LazyLock::new(|| {
    FancyRegex::new(r"(?is)Step\s*4[:\-–]\s*Score\s*=\s*(.*)").expect("Invalid step 4 pattern")
});

// Case-sensitive: only the `Score=` marker counts, not "score" in prose.
static SCORE_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Score\s*=\s*([+-]?\d+)").expect("Invalid score pattern"));
static SIGNED_INT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[+-]?\d+").expect("Invalid integer pattern"));

/// Internal extraction failure. Never escapes [`parse_output`].
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("pattern evaluation failed: {0}")]
    Pattern(#[from] fancy_regex::Error),
}

/// Why the score line could not be turned into a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreError {
    /// The model explicitly declined to score.
    Unclear,
    /// The score line holds no integer.
    InvalidScore,
}

impl ScoreError {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreError::Unclear => "unclear",
            ScoreError::InvalidScore => "invalid_score",
        }
    }
}

impl fmt::Display for ScoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signals consumed by [`infer_label`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signals {
    /// Step 2 verdict: `Some(true)` iff it mentions "yes"; `None` if Step 2 is missing.
    pub politics: Option<bool>,
    /// Score parsed from the Step 4 line.
    pub score: Option<i64>,
    /// More than one distinct `Score=` value appears in the output.
    pub ambiguous: bool,
    /// Score line problem, if any.
    pub error: Option<ScoreError>,
}

/// Everything pulled out of one model response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub summary: Option<String>,
    pub relevance: Option<String>,
    pub image: Option<String>,
    pub score_line: Option<String>,
    pub signals: Signals,
}

/// Structured verdict produced from raw model text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub label: Label,
    /// `summary`, `image` and `score` (empty strings when absent).
    pub analysis: BTreeMap<String, String>,
    /// `politics`, `ambiguous`, `error` and the verbatim `raw_output`.
    pub meta: BTreeMap<String, String>,
}

/// Parse a four-step response into a label plus analysis/meta entries.
pub fn parse_output(output: &str) -> ParsedOutput {
    assemble(output, extract(output))
}

fn assemble(output: &str, extracted: Result<Extraction, ParseError>) -> ParsedOutput {
    match extracted {
        Ok(extraction) => {
            let signals = &extraction.signals;
            let label = infer_label(signals);

            let mut analysis = BTreeMap::new();
            analysis.insert("summary".to_string(), extraction.summary.clone().unwrap_or_default());
            analysis.insert("image".to_string(), extraction.image.clone().unwrap_or_default());
            analysis.insert(
                "score".to_string(),
                signals.score.map(|s| s.to_string()).unwrap_or_default(),
            );

            let politics = match signals.politics {
                Some(true) => "true",
                Some(false) => "false",
                None => "none",
            };

            let mut meta = BTreeMap::new();
            meta.insert("politics".to_string(), politics.to_string());
            meta.insert("ambiguous".to_string(), signals.ambiguous.to_string());
            meta.insert(
                "error".to_string(),
                signals.error.map(|e| e.to_string()).unwrap_or_default(),
            );
            meta.insert("raw_output".to_string(), output.to_string());

            ParsedOutput {
                label,
                analysis,
                meta,
            }
        }
        Err(e) => degraded(output, &e),
    }
}

/// Locate the four steps and derive the inference signals.
pub fn extract(output: &str) -> Result<Extraction, ParseError> {
    let summary = capture_step(&STEP_1, output)?;
    let relevance = capture_step(&STEP_2, output)?;
    let image = capture_step(&STEP_3, output)?;
    let score_line = capture_step(&STEP_4_SCORE, output)?;

    let politics = relevance
        .as_deref()
        .map(|text| text.to_lowercase().contains("yes"));

    let (score, error) = match score_line.as_deref() {
        Some(line) => interpret_score_line(line),
        None => (None, None),
    };

    Ok(Extraction {
        summary,
        relevance,
        image,
        score_line,
        signals: Signals {
            politics,
            score,
            ambiguous: is_ambiguous(output),
            error,
        },
    })
}

/// Decide the final label from parsed signals.
///
/// First match wins; irrelevance and unresolved ambiguity override an
/// otherwise valid score.
pub fn infer_label(signals: &Signals) -> Label {
    if signals.politics == Some(false) {
        return Label::Irrelevant;
    }
    if signals.error == Some(ScoreError::Unclear) {
        return Label::NeedHumanReview;
    }
    if signals.error.is_some() || signals.ambiguous {
        return Label::Uncertain;
    }
    match signals.score {
        Some(score) if score <= -1 => Label::Negative,
        Some(0) => Label::Neutral,
        Some(_) => Label::Positive,
        None => Label::Uncertain,
    }
}

fn capture_step(pattern: &FancyRegex, text: &str) -> Result<Option<String>, ParseError> {
    let captured = pattern
        .captures(text)?
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string());
    Ok(captured)
}

fn interpret_score_line(line: &str) -> (Option<i64>, Option<ScoreError>) {
    if line.to_lowercase().contains("unclear") {
        return (None, Some(ScoreError::Unclear));
    }
    match SIGNED_INT
        .find(line)
        .and_then(|m| m.as_str().parse::<i64>().ok())
    {
        Some(score) => (Some(score), None),
        None => (None, Some(ScoreError::InvalidScore)),
    }
}

/// More than one distinct numeric `Score=` mention anywhere in the text.
///
/// `+1` and `1` count as the same value.
fn is_ambiguous(output: &str) -> bool {
    let distinct: BTreeSet<String> = SCORE_MENTION
        .captures_iter(output)
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            let raw = m.as_str();
            raw.parse::<i64>()
                .map(|v| v.to_string())
                .unwrap_or_else(|_| raw.trim_start_matches('+').to_string())
        })
        .collect();
    distinct.len() > 1
}

fn degraded(output: &str, error: &ParseError) -> ParsedOutput {
    let mut meta = BTreeMap::new();
    meta.insert("error".to_string(), format!("Parsing failed: {}", error));
    meta.insert("raw_output".to_string(), output.to_string());

    ParsedOutput {
        label: Label::Uncertain,
        analysis: BTreeMap::new(),
        meta,
    }
}
