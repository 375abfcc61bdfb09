//! Relevance-only analyzer: reads a yes/no/missing-information verdict.

use super::prompts::relevance_prompt;
use super::{prepare_content, record_gateway_failure, Analyzer, AnalyzerSettings};
use crate::llm::{GenerateOptions, LlmGateway};
use crate::models::{Article, Label};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Asks whether the article bears on the country's image at all.
pub struct RelevanceAnalyzer {
    gateway: Arc<dyn LlmGateway>,
    options: GenerateOptions,
    max_chars: usize,
    country: String,
}

impl RelevanceAnalyzer {
    pub fn new(gateway: Arc<dyn LlmGateway>, settings: &AnalyzerSettings) -> Self {
        Self {
            gateway,
            options: settings.options.clone(),
            max_chars: settings.max_chars,
            country: settings.country.clone(),
        }
    }
}

/// Map the model output to a label by inspecting its last non-empty line.
///
/// Returns `None` when the line carries no recognizable verdict.
pub fn relevance_label(output: &str) -> Option<Label> {
    let last_line = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()?
        .to_lowercase();

    if last_line.contains("yes") {
        Some(Label::Positive)
    } else if last_line.contains("no") {
        Some(Label::Irrelevant)
    } else if last_line.contains("missing information") {
        Some(Label::Uncertain)
    } else {
        None
    }
}

#[async_trait]
impl Analyzer for RelevanceAnalyzer {
    fn name(&self) -> &str {
        "relevance"
    }

    async fn analyze(&self, mut article: Article) -> Article {
        let content = prepare_content(&article.content, self.max_chars);
        let prompt = relevance_prompt(&self.country, &content);

        let output = match self.gateway.generate(&prompt, &self.options).await {
            Ok(output) => output,
            Err(e) => {
                record_gateway_failure(&mut article, self.name(), &e);
                return article;
            }
        };

        let label = relevance_label(&output).unwrap_or_else(|| {
            article.add_metadata("error", "Unrecognized relevance response format");
            Label::Error
        });

        article.add_analysis("relevance_answer", output);
        article.set_label(label);
        article.mark_as_treated();

        debug!("relevance: article {} -> {}", article.id, label);
        article
    }
}
