//! Sequential processing loop.
//!
//! One article is analyzed and persisted before the next is loaded. An
//! interrupt flag is checked between articles; a call already in flight is
//! allowed to finish.

use crate::analyzer::Analyzer;
use crate::loader::ArticleSource;
use crate::models::Article;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub interrupted: bool,
}

/// Connects an article source to an analyzer.
pub struct ArticleProcessor<S> {
    source: S,
    analyzer: Box<dyn Analyzer>,
    results: Vec<Article>,
    interrupted: Arc<AtomicBool>,
}

impl<S: ArticleSource> ArticleProcessor<S> {
    pub fn new(source: S, analyzer: Box<dyn Analyzer>) -> Self {
        Self {
            source,
            analyzer,
            results: Vec::new(),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned interrupt flag (set by a signal handler).
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    /// Analyze articles until the source is exhausted, `limit` is reached
    /// or the interrupt flag is raised.
    pub async fn run(&mut self, limit: Option<usize>) -> Result<RunSummary> {
        let progress = match limit {
            Some(limit) => ProgressBar::new(limit as u64),
            None => ProgressBar::new_spinner(),
        };
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {pos} articles {wide_msg}",
        ) {
            progress.set_style(style);
        }

        let mut processed = 0;
        let mut interrupted = false;

        while limit.map_or(true, |limit| processed < limit) {
            if self.interrupted.load(Ordering::SeqCst) {
                interrupted = true;
                break;
            }

            let Some(article) = self.source.next_article()? else {
                break;
            };

            progress.suspend(|| {
                info!(
                    "Processing article: {} - {}",
                    article.id,
                    article
                        .meta
                        .get("filename")
                        .map(String::as_str)
                        .unwrap_or("Unknown")
                )
            });
            progress.set_message(article.id.clone());

            let analyzed = self.analyzer.analyze(article).await;
            self.source.mark_as_treated(&analyzed)?;
            self.results.push(analyzed);

            processed += 1;
            progress.inc(1);
        }

        progress.finish_and_clear();
        if interrupted {
            warn!("Interrupted after {} articles", processed);
        }
        info!("Processed {} articles", processed);

        Ok(RunSummary {
            processed,
            interrupted,
        })
    }

    /// Articles analyzed by this processor, in order.
    pub fn results(&self) -> &[Article] {
        &self.results
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    #[allow(dead_code)]
    pub fn into_results(self) -> Vec<Article> {
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Label;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct MemorySource {
        queue: VecDeque<Article>,
        marked: Vec<String>,
    }

    impl MemorySource {
        fn with(ids: &[&str]) -> Self {
            Self {
                queue: ids.iter().map(|id| Article::new(*id, "body")).collect(),
                marked: Vec::new(),
            }
        }
    }

    impl ArticleSource for MemorySource {
        fn next_article(&mut self) -> Result<Option<Article>> {
            Ok(self.queue.pop_front())
        }

        fn mark_as_treated(&mut self, article: &Article) -> Result<()> {
            self.marked.push(article.id.clone());
            Ok(())
        }
    }

    /// Labels everything neutral; optionally raises a flag after each call.
    struct Stamp {
        raise: Option<Arc<AtomicBool>>,
    }

    #[async_trait]
    impl Analyzer for Stamp {
        fn name(&self) -> &str {
            "stamp"
        }

        async fn analyze(&self, mut article: Article) -> Article {
            article.set_label(Label::Neutral);
            article.mark_as_treated();
            if let Some(flag) = &self.raise {
                flag.store(true, Ordering::SeqCst);
            }
            article
        }
    }

    #[tokio::test]
    async fn test_processes_everything_without_limit() {
        let mut processor =
            ArticleProcessor::new(MemorySource::with(&["a", "b", "c"]), Box::new(Stamp { raise: None }));

        let summary = processor.run(None).await.unwrap();

        assert_eq!(summary.processed, 3);
        assert!(!summary.interrupted);
        assert_eq!(processor.source().marked, vec!["a", "b", "c"]);
        assert!(processor
            .results()
            .iter()
            .all(|a| a.treated && a.predicted_label == Some(Label::Neutral)));
    }

    #[tokio::test]
    async fn test_stops_at_limit() {
        let mut processor =
            ArticleProcessor::new(MemorySource::with(&["a", "b", "c"]), Box::new(Stamp { raise: None }));

        let summary = processor.run(Some(2)).await.unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(processor.into_results().len(), 2);
    }

    #[tokio::test]
    async fn test_interrupt_stops_between_articles() {
        let flag = Arc::new(AtomicBool::new(false));
        let analyzer = Stamp {
            raise: Some(flag.clone()),
        };
        let mut processor = ArticleProcessor::new(MemorySource::with(&["a", "b"]), Box::new(analyzer))
            .with_interrupt_flag(flag);

        let summary = processor.run(None).await.unwrap();

        assert_eq!(summary.processed, 1);
        assert!(summary.interrupted);
        assert_eq!(processor.source().marked, vec!["a"]);
    }
}
