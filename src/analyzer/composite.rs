//! Aggregation of several analyzers into one verdict.

use super::Analyzer;
use crate::models::{Article, Label};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

/// What one wrapped analyzer concluded.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberVerdict {
    pub label: Label,
    pub score: Option<i64>,
    pub error: Option<String>,
}

impl MemberVerdict {
    /// Read the verdict a member left on the article.
    fn from_article(article: &Article) -> Self {
        Self {
            label: article.predicted_label.unwrap_or(Label::Error),
            score: article
                .analysis
                .get("score")
                .and_then(|s| s.trim().parse().ok()),
            error: article.error().map(str::to_string),
        }
    }
}

/// Final label and, when scores decided it, their mean.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub label: Label,
    pub average_score: Option<f64>,
}

/// Combine member verdicts. First matching rule wins:
///
/// 1. any `UNCERTAIN` -> `UNCERTAIN`
/// 2. any `IRRELEVANT` -> `IRRELEVANT`
/// 3. any `ERROR` -> first non-error label, or `ERROR` if all failed
/// 4. mean of available scores: `<= -1` negative, `>= 1` positive, else neutral
/// 5. no scores -> `UNCERTAIN`
pub fn aggregate(verdicts: &[MemberVerdict]) -> Aggregate {
    let has = |label: Label| verdicts.iter().any(|v| v.label == label);
    let decided = |label: Label| Aggregate {
        label,
        average_score: None,
    };

    if has(Label::Uncertain) {
        return decided(Label::Uncertain);
    }
    if has(Label::Irrelevant) {
        return decided(Label::Irrelevant);
    }
    if has(Label::Error) {
        let label = verdicts
            .iter()
            .map(|v| v.label)
            .find(|label| *label != Label::Error)
            .unwrap_or(Label::Error);
        return decided(label);
    }

    let scores: Vec<i64> = verdicts.iter().filter_map(|v| v.score).collect();
    if scores.is_empty() {
        return decided(Label::Uncertain);
    }

    let mean = scores.iter().sum::<i64>() as f64 / scores.len() as f64;
    // Symmetric band: anything strictly between -1 and 1 is neutral.
    let label = if mean <= -1.0 {
        Label::Negative
    } else if mean >= 1.0 {
        Label::Positive
    } else {
        Label::Neutral
    };

    Aggregate {
        label,
        average_score: Some(mean),
    }
}

/// Runs its members one after another over the same article.
///
/// Later members see the trace written by earlier ones. Each member's
/// `score` and `error` entries are cleared before it runs so a verdict is
/// never read from a previous member.
pub struct CompositeAnalyzer {
    members: Vec<Box<dyn Analyzer>>,
}

impl CompositeAnalyzer {
    pub fn new(members: Vec<Box<dyn Analyzer>>) -> Self {
        Self { members }
    }
}

fn by_position<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> String {
    let map: Map<String, Value> = values
        .into_iter()
        .enumerate()
        .map(|(i, v)| (format!("model_{}", i), v.into()))
        .collect();
    Value::Object(map).to_string()
}

#[async_trait]
impl Analyzer for CompositeAnalyzer {
    fn name(&self) -> &str {
        "composite"
    }

    async fn analyze(&self, mut article: Article) -> Article {
        let mut verdicts = Vec::with_capacity(self.members.len());

        for member in &self.members {
            article.analysis.remove("score");
            article.meta.remove("error");
            article = member.analyze(article).await;
            let verdict = MemberVerdict::from_article(&article);
            debug!(
                "composite: {} said {} for article {}",
                member.name(),
                verdict.label,
                article.id
            );
            verdicts.push(verdict);
        }

        article.add_metadata(
            "predictions",
            by_position(verdicts.iter().map(|v| v.label.as_str())),
        );
        article.add_analysis(
            "scores",
            by_position(verdicts.iter().map(|v| match v.score {
                Some(score) => json!(score),
                None => Value::Null,
            })),
        );

        let errors: Vec<Value> = verdicts
            .iter()
            .map(|v| v.error.clone().map_or(Value::Null, Value::String))
            .collect();
        if errors.iter().any(|e| !e.is_null()) {
            article.add_metadata("errors", by_position(errors));
        }

        let outcome = aggregate(&verdicts);
        if let Some(mean) = outcome.average_score {
            article.add_analysis("average_score", mean.to_string());
        }
        article.set_label(outcome.label);
        article.mark_as_treated();

        article
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalyzerSettings, Persona, SingleShotAnalyzer};
    use crate::llm::testing::ScriptedGateway;
    use std::sync::Arc;

    fn verdict(label: Label, score: Option<i64>) -> MemberVerdict {
        MemberVerdict {
            label,
            score,
            error: None,
        }
    }

    #[test]
    fn test_uncertain_wins_over_everything() {
        let out = aggregate(&[
            verdict(Label::Uncertain, None),
            verdict(Label::Positive, Some(2)),
        ]);
        assert_eq!(out.label, Label::Uncertain);
        assert_eq!(out.average_score, None);

        let out = aggregate(&[
            verdict(Label::Irrelevant, None),
            verdict(Label::Uncertain, None),
        ]);
        assert_eq!(out.label, Label::Uncertain);
    }

    #[test]
    fn test_irrelevant_wins_over_scores() {
        let out = aggregate(&[
            verdict(Label::Irrelevant, None),
            verdict(Label::Positive, Some(1)),
        ]);
        assert_eq!(out.label, Label::Irrelevant);
    }

    #[test]
    fn test_error_falls_back_to_first_other_label() {
        let out = aggregate(&[verdict(Label::Error, None), verdict(Label::Positive, Some(1))]);
        assert_eq!(out.label, Label::Positive);

        let out = aggregate(&[verdict(Label::Error, None), verdict(Label::Error, None)]);
        assert_eq!(out.label, Label::Error);
    }

    #[test]
    fn test_opposite_scores_average_to_neutral() {
        let out = aggregate(&[
            verdict(Label::Positive, Some(2)),
            verdict(Label::Negative, Some(-2)),
        ]);
        assert_eq!(out.label, Label::Neutral);
        assert_eq!(out.average_score, Some(0.0));
    }

    #[test]
    fn test_mean_bands() {
        let label = |scores: &[i64]| {
            let verdicts: Vec<_> = scores
                .iter()
                .map(|s| verdict(Label::Neutral, Some(*s)))
                .collect();
            aggregate(&verdicts).label
        };
        assert_eq!(label(&[-1, -2]), Label::Negative);
        assert_eq!(label(&[-1]), Label::Negative);
        assert_eq!(label(&[0, -1]), Label::Neutral);
        assert_eq!(label(&[0, 1]), Label::Neutral);
        assert_eq!(label(&[1, 1]), Label::Positive);
        assert_eq!(label(&[2, 1]), Label::Positive);
    }

    #[test]
    fn test_no_scores_is_uncertain() {
        let out = aggregate(&[
            verdict(Label::NeedHumanReview, None),
            verdict(Label::Neutral, None),
        ]);
        assert_eq!(out.label, Label::Uncertain);
    }

    const POSITIVE_2: &str = "Step 1: S.\nStep 2: Yes - politics.\nStep 3: Good.\nStep 4: Score = +2 - strong";
    const NEGATIVE_2: &str = "Step 1: S.\nStep 2: Yes - politics.\nStep 3: Bad.\nStep 4: Score = -2 - strong";

    fn expert_and_naive(gateway: Arc<ScriptedGateway>) -> CompositeAnalyzer {
        let settings = AnalyzerSettings::default();
        CompositeAnalyzer::new(vec![
            Box::new(SingleShotAnalyzer::new(Persona::Expert, gateway.clone(), &settings)),
            Box::new(SingleShotAnalyzer::new(Persona::Naive, gateway, &settings)),
        ])
    }

    #[tokio::test]
    async fn test_analyze_records_predictions_and_scores() {
        let gateway = Arc::new(ScriptedGateway::new([POSITIVE_2, NEGATIVE_2]));
        let composite = expert_and_naive(gateway.clone());

        let article = composite.analyze(Article::new("a1", "text")).await;

        assert_eq!(article.predicted_label, Some(Label::Neutral));
        assert!(article.treated);
        assert_eq!(
            article.meta["predictions"],
            r#"{"model_0":"positive","model_1":"negative"}"#
        );
        assert_eq!(article.analysis["scores"], r#"{"model_0":2,"model_1":-2}"#);
        assert_eq!(article.analysis["average_score"], "0");
        assert!(!article.meta.contains_key("errors"));
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_member_does_not_reuse_previous_score() {
        let gateway = Arc::new(ScriptedGateway::new([POSITIVE_2]));
        gateway.push_failure();
        let composite = expert_and_naive(gateway.clone());

        let article = composite.analyze(Article::new("a1", "text")).await;

        assert_eq!(article.predicted_label, Some(Label::Positive));
        assert_eq!(article.analysis["scores"], r#"{"model_0":2,"model_1":null}"#);
        let errors: Value = serde_json::from_str(&article.meta["errors"]).unwrap();
        assert!(errors["model_0"].is_null());
        assert!(errors["model_1"]
            .as_str()
            .unwrap()
            .starts_with("LLM call failed"));
        assert!(!article.analysis.contains_key("average_score"));
    }
}
