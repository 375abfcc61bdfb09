//! One-prompt analyzers built around the four-step answer format.

use super::parser::parse_output;
use super::prompts::{expert_prompt, naive_prompt};
use super::{prepare_content, record_gateway_failure, Analyzer, AnalyzerSettings};
use crate::llm::{GenerateOptions, LlmGateway};
use crate::models::Article;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Framing used when asking the model for a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    /// Neutral geopolitical analyst.
    Expert,
    /// Open-minded layperson.
    Naive,
}

impl Persona {
    pub fn name(&self) -> &'static str {
        match self {
            Persona::Expert => "expert",
            Persona::Naive => "naive",
        }
    }

    fn prompt(&self, country: &str, article_text: &str) -> String {
        match self {
            Persona::Expert => expert_prompt(country, article_text),
            Persona::Naive => naive_prompt(country, article_text),
        }
    }
}

/// Prompt, call the model once, parse the four steps, infer the label.
///
/// The personas differ only in prompt wording; parsing and inference are
/// shared.
pub struct SingleShotAnalyzer {
    persona: Persona,
    gateway: Arc<dyn LlmGateway>,
    options: GenerateOptions,
    max_chars: usize,
    country: String,
}

impl SingleShotAnalyzer {
    pub fn new(persona: Persona, gateway: Arc<dyn LlmGateway>, settings: &AnalyzerSettings) -> Self {
        Self {
            persona,
            gateway,
            options: settings.options.clone(),
            max_chars: settings.max_chars,
            country: settings.country.clone(),
        }
    }

    /// Build the prompt for an article's content.
    pub fn build_prompt(&self, content: &str) -> String {
        let text = prepare_content(content, self.max_chars);
        self.persona.prompt(&self.country, &text)
    }
}

#[async_trait]
impl Analyzer for SingleShotAnalyzer {
    fn name(&self) -> &str {
        self.persona.name()
    }

    async fn analyze(&self, mut article: Article) -> Article {
        let prompt = self.build_prompt(&article.content);

        let raw_output = match self.gateway.generate(&prompt, &self.options).await {
            Ok(output) => output,
            Err(e) => {
                record_gateway_failure(&mut article, self.name(), &e);
                return article;
            }
        };

        let parsed = parse_output(&raw_output);
        article.merge_trace(parsed.analysis, parsed.meta);
        article.set_label(parsed.label);
        article.mark_as_treated();

        debug!("{}: article {} -> {}", self.name(), article.id, parsed.label);
        article
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedGateway;
    use crate::models::Label;

    const WELL_FORMED: &str = "Step 1: A trade deal was signed.\n\
Step 2: Yes - it concerns national policy.\n\
Step 3: A capable negotiator.\n\
Step 4: Score = +1 - mildly positive";

    fn analyzer(persona: Persona, gateway: Arc<ScriptedGateway>) -> SingleShotAnalyzer {
        SingleShotAnalyzer::new(persona, gateway, &AnalyzerSettings::default())
    }

    #[tokio::test]
    async fn test_well_formed_response_sets_label_and_trace() {
        let gateway = Arc::new(ScriptedGateway::new([WELL_FORMED]));
        let article = analyzer(Persona::Expert, gateway.clone())
            .analyze(Article::new("a1", "Some article"))
            .await;

        assert_eq!(article.predicted_label, Some(Label::Positive));
        assert!(article.treated);
        assert_eq!(article.analysis["summary"], "A trade deal was signed.");
        assert_eq!(article.analysis["image"], "A capable negotiator.");
        assert_eq!(article.analysis["score"], "1");
        assert_eq!(article.meta["politics"], "true");
        assert_eq!(article.meta["raw_output"], WELL_FORMED);
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_gateway_failure_is_terminal_error() {
        let gateway = Arc::new(ScriptedGateway::failing());
        let article = analyzer(Persona::Naive, gateway.clone())
            .analyze(Article::new("a1", "Some article"))
            .await;

        assert_eq!(article.predicted_label, Some(Label::Error));
        assert!(article.treated);
        assert!(article.error().unwrap().starts_with("LLM call failed"));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_content_is_truncated_and_stripped() {
        let gateway = Arc::new(ScriptedGateway::new([WELL_FORMED]));
        let settings = AnalyzerSettings {
            max_chars: 13,
            ..Default::default()
        };
        let analyzer = SingleShotAnalyzer::new(Persona::Expert, gateway.clone(), &settings);
        analyzer
            .analyze(Article::new("a1", "   short text that keeps going"))
            .await;

        let prompt = &gateway.prompts()[0];
        assert!(prompt.contains("Article:\nshort text\n\n"));
        assert!(!prompt.contains("keeps going"));
    }

    #[tokio::test]
    async fn test_reanalysis_repeats_round_trip() {
        let gateway = Arc::new(ScriptedGateway::new([WELL_FORMED, "garbage"]));
        let analyzer = analyzer(Persona::Expert, gateway.clone());

        let article = analyzer.analyze(Article::new("a1", "text")).await;
        assert_eq!(article.predicted_label, Some(Label::Positive));

        let article = analyzer.analyze(article).await;
        assert_eq!(article.predicted_label, Some(Label::Uncertain));
        assert_eq!(article.analysis["summary"], "");
        assert_eq!(gateway.calls(), 2);
    }

    #[test]
    fn test_personas_share_parser_but_not_prompt() {
        let gateway = Arc::new(ScriptedGateway::default());
        let expert = analyzer(Persona::Expert, gateway.clone()).build_prompt("x");
        let naive = analyzer(Persona::Naive, gateway).build_prompt("x");
        assert_ne!(expert, naive);
    }
}
