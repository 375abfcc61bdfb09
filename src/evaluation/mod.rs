//! Evaluation of predicted labels against ground truth.
//!
//! Two views are offered: the full multiclass report over every observed
//! label, and binary relevance where sentiment labels collapse into
//! "relevant". Misclassified articles can be exported for manual review.

pub mod export;
pub mod metrics;

pub use export::export_errors;
pub use metrics::{ClassificationReport, ConfusionMatrix};

use crate::models::{Article, Label, Relevance};
use chrono::{DateTime, Utc};
use std::fmt;

/// `(true_label, predicted_label)` for every article that has both.
pub fn label_pairs(articles: &[Article]) -> Vec<(Label, Label)> {
    articles
        .iter()
        .filter_map(|a| Some((a.true_label?, a.predicted_label?)))
        .collect()
}

/// Binary relevance pairs, skipping labels that carry no relevance.
pub fn relevance_pairs(articles: &[Article]) -> Vec<(Relevance, Relevance)> {
    label_pairs(articles)
        .into_iter()
        .filter_map(|(t, p)| Some((t.relevance()?, p.relevance()?)))
        .collect()
}

/// A titled report with its confusion matrix.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub title: &'static str,
    pub report: ClassificationReport,
    pub matrix: ConfusionMatrix,
    pub generated_at: DateTime<Utc>,
}

impl Evaluation {
    fn from_pairs(title: &'static str, pairs: &[(String, String)], labels: &[String]) -> Self {
        Self {
            title,
            report: ClassificationReport::new(pairs, labels),
            matrix: ConfusionMatrix::new(pairs, labels),
            generated_at: Utc::now(),
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "=== {} ({}) ===",
            self.title,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(f, "{}", self.report)?;
        writeln!(f, "=== {} Confusion Matrix ===", self.title)?;
        write!(f, "{}", self.matrix)
    }
}

/// Multiclass report over the sorted union of observed labels.
///
/// `None` when no article has both labels.
pub fn evaluate_multiclass(articles: &[Article]) -> Option<Evaluation> {
    let pairs: Vec<(String, String)> = label_pairs(articles)
        .into_iter()
        .map(|(t, p)| (t.to_string(), p.to_string()))
        .collect();
    if pairs.is_empty() {
        return None;
    }

    let labels = metrics::observed_labels(&pairs);
    Some(Evaluation::from_pairs(
        "Multiclass Classification Report",
        &pairs,
        &labels,
    ))
}

/// Binary relevance report over `relevant` / `irrelevant`.
///
/// `None` when no pair is scorable.
pub fn evaluate_binary_relevance(articles: &[Article]) -> Option<Evaluation> {
    let pairs: Vec<(String, String)> = relevance_pairs(articles)
        .into_iter()
        .map(|(t, p)| (t.to_string(), p.to_string()))
        .collect();
    if pairs.is_empty() {
        return None;
    }

    let labels = [Relevance::Relevant, Relevance::Irrelevant].map(|r| r.to_string());
    Some(Evaluation::from_pairs(
        "Binary Relevance Report",
        &pairs,
        &labels,
    ))
}
