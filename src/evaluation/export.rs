//! Export of misclassified articles, one JSON file per predicted label.

use super::label_pairs;
use crate::models::{truncate_chars, Article};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

const EXCERPT_CHARS: usize = 800;

/// Compact view of a misclassified article.
#[derive(Debug, Serialize)]
struct ErrorItem<'a> {
    id: &'a str,
    true_label: &'static str,
    predicted_label: &'static str,
    content: String,
    analysis: &'a BTreeMap<String, String>,
    meta: &'a BTreeMap<String, String>,
}

fn excerpt(content: &str) -> String {
    if content.is_empty() {
        String::new()
    } else {
        format!("{}...", truncate_chars(content, EXCERPT_CHARS))
    }
}

/// Write `errors_pred_<label>.json` files into `output_dir`.
///
/// Only articles with both labels that disagree are exported. Returns the
/// files written.
pub fn export_errors(articles: &[Article], output_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut by_prediction: BTreeMap<&'static str, Vec<ErrorItem>> = BTreeMap::new();

    for article in articles {
        let (Some(truth), Some(predicted)) = (article.true_label, article.predicted_label) else {
            continue;
        };
        if truth == predicted {
            continue;
        }

        by_prediction
            .entry(predicted.as_str())
            .or_default()
            .push(ErrorItem {
                id: &article.id,
                true_label: truth.as_str(),
                predicted_label: predicted.as_str(),
                content: excerpt(&article.content),
                analysis: &article.analysis,
                meta: &article.meta,
            });
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let exported: usize = by_prediction.values().map(Vec::len).sum();
    let mut written = Vec::with_capacity(by_prediction.len());
    for (label, items) in by_prediction {
        let path = output_dir.join(format!("errors_pred_{}.json", label));
        let json = serde_json::to_string_pretty(&items)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }

    info!(
        "Exported {} misclassified of {} labeled articles to {}",
        exported,
        label_pairs(articles).len(),
        output_dir.display()
    );
    Ok(written)
}
