//! Data models for the article classifier.
//!
//! This module contains the verdict labels and the article record that
//! flows through loading, analysis, persistence and evaluation.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Verdict category assigned to an article.
///
/// Used both for ground truth (`true_label`) and for analyzer output
/// (`predicted_label`). Serializes to its lowercase value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    /// Item has not been graded yet.
    Ungraded,
    /// Content is not relevant to the target country.
    Irrelevant,
    /// Label could not be confidently assigned.
    Uncertain,
    /// The model declined to judge; a human should look at it.
    NeedHumanReview,
    /// Text too short to analyze.
    TooShort,
    /// Positive image.
    Positive,
    /// Negative image.
    Negative,
    /// Neutral image.
    Neutral,
    /// An error occurred during processing.
    Error,
}

/// Binary relevance class used by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    Relevant,
    Irrelevant,
}

impl fmt::Display for Relevance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relevance::Relevant => write!(f, "relevant"),
            Relevance::Irrelevant => write!(f, "irrelevant"),
        }
    }
}

impl Label {
    /// Every label, in declaration order.
    pub const ALL: [Label; 9] = [
        Label::Ungraded,
        Label::Irrelevant,
        Label::Uncertain,
        Label::NeedHumanReview,
        Label::TooShort,
        Label::Positive,
        Label::Negative,
        Label::Neutral,
        Label::Error,
    ];

    /// Returns the lowercase string value of the label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Ungraded => "ungraded",
            Label::Irrelevant => "irrelevant",
            Label::Uncertain => "uncertain",
            Label::NeedHumanReview => "need_human_review",
            Label::TooShort => "too_short",
            Label::Positive => "positive",
            Label::Negative => "negative",
            Label::Neutral => "neutral",
            Label::Error => "error",
        }
    }

    /// Whether the label is one of the three image verdicts.
    pub fn is_sentiment(&self) -> bool {
        matches!(self, Label::Positive | Label::Negative | Label::Neutral)
    }

    /// Collapse the label into binary relevance.
    ///
    /// Returns `None` for labels that carry no relevance judgement
    /// (uncertain, error, too short, human review, ungraded).
    pub fn relevance(&self) -> Option<Relevance> {
        if self.is_sentiment() {
            Some(Relevance::Relevant)
        } else if *self == Label::Irrelevant {
            Some(Relevance::Irrelevant)
        } else {
            None
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no known label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown label: {0}")]
pub struct UnknownLabel(pub String);

impl FromStr for Label {
    type Err = UnknownLabel;

    /// Accepts both member names (`NEED_HUMAN_REVIEW`) and values
    /// (`need_human_review`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Label::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == wanted)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

/// A text article to be analyzed and labeled.
///
/// Holds the raw content together with its classification state and the
/// trace written by each analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Stable identifier assigned at load time.
    pub id: String,
    /// Raw article text (may be empty).
    #[serde(default)]
    pub content: String,
    /// Whether the article has completed an analysis pass.
    #[serde(default)]
    pub treated: bool,
    /// Ground-truth label, if known.
    #[serde(default)]
    pub true_label: Option<Label>,
    /// Label assigned by the last analyzer.
    #[serde(default)]
    pub predicted_label: Option<Label>,
    /// Output of each analysis step, keyed by step name.
    #[serde(default, deserialize_with = "lenient_trace")]
    pub analysis: BTreeMap<String, String>,
    /// Side-channel information: errors, filenames, raw model output.
    #[serde(default, deserialize_with = "lenient_trace")]
    pub meta: BTreeMap<String, String>,
}

impl Article {
    /// Creates an untreated article with no labels.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            treated: false,
            true_label: None,
            predicted_label: None,
            analysis: BTreeMap::new(),
            meta: BTreeMap::new(),
        }
    }

    /// Sets the ground-truth label (builder style).
    pub fn with_true_label(mut self, label: Option<Label>) -> Self {
        self.true_label = label;
        self
    }

    /// Marks the article as processed. Never reverts.
    pub fn mark_as_treated(&mut self) {
        self.treated = true;
    }

    /// Sets the predicted label, replacing any earlier verdict.
    pub fn set_label(&mut self, label: Label) {
        self.predicted_label = Some(label);
    }

    /// Adds or overwrites an analysis step result.
    pub fn add_analysis(&mut self, step: impl Into<String>, result: impl Into<String>) {
        self.analysis.insert(step.into(), result.into());
    }

    /// Adds or overwrites a metadata entry.
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta.insert(key.into(), value.into());
    }

    /// Merges analysis and metadata maps into the article.
    ///
    /// Later writes win: same-named keys are overwritten.
    pub fn merge_trace(
        &mut self,
        analysis: BTreeMap<String, String>,
        meta: BTreeMap<String, String>,
    ) {
        self.analysis.extend(analysis);
        self.meta.extend(meta);
    }

    /// Returns the non-empty `meta.error` entry, if any.
    pub fn error(&self) -> Option<&str> {
        self.meta
            .get("error")
            .map(String::as_str)
            .filter(|e| !e.is_empty())
    }

    /// Short one-line preview of the article.
    #[allow(dead_code)] // Debugging helper
    pub fn short_str(&self, max_chars: usize) -> String {
        let preview = if self.content.is_empty() {
            "[No content]".to_string()
        } else {
            format!("{}...", truncate_chars(&self.content, max_chars))
        };
        let label = self
            .predicted_label
            .map(|l| l.to_string())
            .unwrap_or_else(|| "none".to_string());
        format!(
            "Article(id={}, label={}, treated={}, content={})",
            self.id, label, self.treated, preview
        )
    }

    /// Exports the article as a JSON record, optionally without content.
    pub fn to_record(&self, include_content: bool) -> Value {
        let mut record = serde_json::to_value(self).unwrap_or(Value::Null);
        if !include_content {
            if let Value::Object(ref mut map) = record {
                map.remove("content");
            }
        }
        record
    }

    /// Restores an article from a JSON record.
    pub fn from_record(record: Value) -> serde_json::Result<Self> {
        serde_json::from_value(record)
    }
}

/// Reads a trace map written by older tools: `null` is an empty map and
/// non-string values are kept as their JSON text.
fn lenient_trace<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(map
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

/// Returns the first `max_chars` characters of `text`.
///
/// Counts characters, not bytes, so it never splits a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_serializes_lowercase() {
        let json = serde_json::to_string(&Label::NeedHumanReview).unwrap();
        assert_eq!(json, "\"need_human_review\"");

        let back: Label = serde_json::from_str("\"too_short\"").unwrap();
        assert_eq!(back, Label::TooShort);
    }

    #[test]
    fn test_label_from_str() {
        assert_eq!("POSITIVE".parse::<Label>(), Ok(Label::Positive));
        assert_eq!("need_human_review".parse::<Label>(), Ok(Label::NeedHumanReview));
        assert_eq!(" Irrelevant ".parse::<Label>(), Ok(Label::Irrelevant));
        assert!("maybe".parse::<Label>().is_err());
    }

    #[test]
    fn test_label_display_matches_serde() {
        for label in Label::ALL {
            let json = serde_json::to_string(&label).unwrap();
            assert_eq!(json, format!("\"{}\"", label));
        }
    }

    #[test]
    fn test_label_relevance() {
        assert_eq!(Label::Positive.relevance(), Some(Relevance::Relevant));
        assert_eq!(Label::Neutral.relevance(), Some(Relevance::Relevant));
        assert_eq!(Label::Irrelevant.relevance(), Some(Relevance::Irrelevant));
        assert_eq!(Label::Uncertain.relevance(), None);
        assert_eq!(Label::Error.relevance(), None);
    }

    #[test]
    fn test_article_trace_overwrites() {
        let mut article = Article::new("a1", "text");
        article.add_analysis("score", "1");
        article.add_metadata("error", "");

        let mut analysis = BTreeMap::new();
        analysis.insert("score".to_string(), "2".to_string());
        let mut meta = BTreeMap::new();
        meta.insert("error".to_string(), "unclear".to_string());
        article.merge_trace(analysis, meta);

        assert_eq!(article.analysis.get("score").map(String::as_str), Some("2"));
        assert_eq!(article.error(), Some("unclear"));
    }

    #[test]
    fn test_article_error_ignores_empty() {
        let mut article = Article::new("a1", "text");
        assert_eq!(article.error(), None);
        article.add_metadata("error", "");
        assert_eq!(article.error(), None);
    }

    #[test]
    fn test_article_record_round_trip_without_content() {
        let mut article = Article::new("a1", "some content").with_true_label(Some(Label::Positive));
        article.set_label(Label::Negative);
        article.mark_as_treated();

        let record = article.to_record(false);
        assert!(record.get("content").is_none());
        assert_eq!(record["predicted_label"], "negative");
        assert_eq!(record["true_label"], "positive");

        let restored = Article::from_record(record).unwrap();
        assert_eq!(restored.id, "a1");
        assert_eq!(restored.content, "");
        assert!(restored.treated);
        assert_eq!(restored.predicted_label, Some(Label::Negative));
    }

    #[test]
    fn test_record_with_null_or_typed_trace() {
        let record = serde_json::json!({
            "id": "a1",
            "treated": true,
            "predicted_label": "positive",
            "analysis": null,
            "meta": {"filename": "a1.txt", "score": 2, "ambiguous": false, "error": null}
        });
        let article = Article::from_record(record).unwrap();

        assert!(article.analysis.is_empty());
        assert_eq!(article.meta["filename"], "a1.txt");
        assert_eq!(article.meta["score"], "2");
        assert_eq!(article.meta["ambiguous"], "false");
        assert_eq!(article.meta["error"], "");
        assert_eq!(article.predicted_label, Some(Label::Positive));
    }

    #[test]
    fn test_truncate_chars_respects_code_points() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_short_str() {
        let article = Article::new("a1", "");
        assert!(article.short_str(10).contains("[No content]"));

        let article = Article::new("a2", "abcdefghijkl");
        assert!(article.short_str(3).contains("content=abc..."));
    }
}
