//! Analysis strategies.
//!
//! Every strategy implements [`Analyzer`]: it takes an article, runs one
//! complete analysis pass and hands the article back with its label and
//! trace filled in. Strategies never return errors; failures are recorded
//! on the article itself so a batch can run unattended.

pub mod composite;
pub mod decision_tree;
pub mod parser;
pub mod prompts;
pub mod relevance;
pub mod single_shot;

use crate::llm::{GatewayError, GenerateOptions, LlmGateway};
use crate::models::{truncate_chars, Article, Label};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub use composite::CompositeAnalyzer;
pub use decision_tree::{DecisionTree, TreeBuildError, TreeSpec};
pub use relevance::RelevanceAnalyzer;
pub use single_shot::{Persona, SingleShotAnalyzer};

/// A strategy that classifies one article.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Analyze the article and return it with `predicted_label` set and
    /// `treated` true.
    async fn analyze(&self, article: Article) -> Article;
}

/// Selectable analysis strategy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    /// Yes/no decision tree of LLM questions
    Questionnary,
    /// Neutral geopolitical analyst persona
    Expert,
    /// Open-minded layperson persona
    Naive,
    /// Relevance only, no sentiment
    Relevance,
    /// Several analyzers aggregated into one verdict
    Composite,
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 5] = [
        AnalyzerKind::Questionnary,
        AnalyzerKind::Expert,
        AnalyzerKind::Naive,
        AnalyzerKind::Relevance,
        AnalyzerKind::Composite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzerKind::Questionnary => "questionnary",
            AnalyzerKind::Expert => "expert",
            AnalyzerKind::Naive => "naive",
            AnalyzerKind::Relevance => "relevance",
            AnalyzerKind::Composite => "composite",
        }
    }

    /// One-line explanation shown by `--analyzer-help`.
    pub fn description(&self) -> &'static str {
        match self {
            AnalyzerKind::Questionnary => {
                "Decision tree-based analyzer using yes/no LLM answers at each node."
            }
            AnalyzerKind::Expert => {
                "Simulates a neutral media analyst specialized in the target country's geopolitics."
            }
            AnalyzerKind::Naive => {
                "Simulates a thoughtful, open-minded person with no strong opinion about the target country."
            }
            AnalyzerKind::Relevance => {
                "Focuses solely on relevance estimation, ignoring sentiment or position."
            }
            AnalyzerKind::Composite => {
                "Combines multiple analyzers (e.g., expert + naive) to aggregate decisions."
            }
        }
    }
}

/// Everything needed to construct an analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    /// Character budget for single-shot and relevance prompts.
    pub max_chars: usize,
    /// Country whose image is judged.
    pub country: String,
    /// Generation bounds for every LLM call.
    pub options: GenerateOptions,
    /// Decision-tree specification file (questionnary only).
    pub tree_path: Option<PathBuf>,
    /// Members of the composite analyzer.
    pub composite: Vec<AnalyzerKind>,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            max_chars: 2000,
            country: "India".to_string(),
            options: GenerateOptions::default(),
            tree_path: None,
            composite: vec![AnalyzerKind::Expert, AnalyzerKind::Naive],
        }
    }
}

/// Build the analyzer selected at pipeline setup.
pub fn build_analyzer(
    kind: AnalyzerKind,
    settings: &AnalyzerSettings,
    gateway: Arc<dyn LlmGateway>,
) -> Result<Box<dyn Analyzer>> {
    let analyzer: Box<dyn Analyzer> = match kind {
        AnalyzerKind::Questionnary => {
            let path = settings
                .tree_path
                .as_ref()
                .context("The questionnary analyzer requires a decision tree file (--tree-path)")?;
            let spec = TreeSpec::load(path)?;
            let tree = DecisionTree::build(&spec, gateway, settings.options.clone())
                .with_context(|| format!("Invalid decision tree in {}", path.display()))?;
            info!("Loaded decision tree with {} nodes", tree.len());
            Box::new(tree)
        }
        AnalyzerKind::Expert => Box::new(SingleShotAnalyzer::new(Persona::Expert, gateway, settings)),
        AnalyzerKind::Naive => Box::new(SingleShotAnalyzer::new(Persona::Naive, gateway, settings)),
        AnalyzerKind::Relevance => Box::new(RelevanceAnalyzer::new(gateway, settings)),
        AnalyzerKind::Composite => {
            if settings.composite.is_empty() {
                bail!("The composite analyzer needs at least one member");
            }
            let mut members = Vec::with_capacity(settings.composite.len());
            for member in &settings.composite {
                if *member == AnalyzerKind::Composite {
                    bail!("A composite analyzer cannot contain another composite analyzer");
                }
                members.push(build_analyzer(*member, settings, gateway.clone())?);
            }
            Box::new(CompositeAnalyzer::new(members))
        }
    };

    Ok(analyzer)
}

/// Truncate content to the character budget and strip surrounding whitespace.
pub(crate) fn prepare_content(content: &str, max_chars: usize) -> String {
    truncate_chars(content, max_chars).trim().to_string()
}

/// Terminal outcome for a failed LLM call: no retry at this layer.
pub(crate) fn record_gateway_failure(article: &mut Article, analyzer: &str, error: &GatewayError) {
    warn!("{}: LLM call failed for article {}: {}", analyzer, article.id, error);
    article.add_metadata("error", format!("LLM call failed: {}", error));
    article.set_label(Label::Error);
    article.mark_as_treated();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedGateway;

    #[test]
    fn test_prepare_content_truncates_then_strips() {
        assert_eq!(prepare_content("  hello world  ", 7), "hello");
        assert_eq!(prepare_content("abc", 2000), "abc");
        assert_eq!(prepare_content("", 10), "");
    }

    #[test]
    fn test_kind_descriptions_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for kind in AnalyzerKind::ALL {
            assert!(seen.insert(kind.description()));
        }
    }

    #[test]
    fn test_build_single_shot_kinds() {
        let gateway: Arc<dyn LlmGateway> = Arc::new(ScriptedGateway::default());
        let settings = AnalyzerSettings::default();

        let expert = build_analyzer(AnalyzerKind::Expert, &settings, gateway.clone()).unwrap();
        assert_eq!(expert.name(), "expert");
        let relevance = build_analyzer(AnalyzerKind::Relevance, &settings, gateway).unwrap();
        assert_eq!(relevance.name(), "relevance");
    }

    #[test]
    fn test_questionnary_requires_tree_path() {
        let gateway: Arc<dyn LlmGateway> = Arc::new(ScriptedGateway::default());
        let settings = AnalyzerSettings::default();
        assert!(build_analyzer(AnalyzerKind::Questionnary, &settings, gateway).is_err());
    }

    #[test]
    fn test_composite_rejects_nesting() {
        let gateway: Arc<dyn LlmGateway> = Arc::new(ScriptedGateway::default());
        let settings = AnalyzerSettings {
            composite: vec![AnalyzerKind::Expert, AnalyzerKind::Composite],
            ..Default::default()
        };
        assert!(build_analyzer(AnalyzerKind::Composite, &settings, gateway).is_err());
    }

    #[test]
    fn test_build_questionnary_from_demo_tree() {
        let gateway: Arc<dyn LlmGateway> = Arc::new(ScriptedGateway::default());
        let settings = AnalyzerSettings {
            tree_path: Some(PathBuf::from(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/demos/question_tree.json"
            ))),
            ..Default::default()
        };
        let tree = build_analyzer(AnalyzerKind::Questionnary, &settings, gateway).unwrap();
        assert_eq!(tree.name(), "questionnary");
    }
}
