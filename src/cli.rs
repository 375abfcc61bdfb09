//! Command-line interface argument parsing.
//!
//! Every setting that also lives in the configuration file is optional
//! here, so that only values the user actually gave override the file.

use crate::analyzer::AnalyzerKind;
use clap::Parser;
use std::path::PathBuf;

/// NewsJudge - LLM-judged classification of news articles
///
/// Reads a directory of text articles, asks a local model (through Ollama)
/// what image of a country each one conveys, stores the verdicts and
/// evaluates them against an index of true labels.
///
/// Examples:
///   newsjudge --analyzer expert --data-dir ./data --limit 20
///   newsjudge --tree-path demos/question_tree.json --evaluate
///   newsjudge --analyzer composite --export-errors error_datasets
///   newsjudge --analyzer-help
///   newsjudge --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory containing article .txt files and index.csv
    #[arg(long, value_name = "DIR", env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// JSON file recording treated articles
    #[arg(long, value_name = "FILE", env = "TREATED_FILE")]
    pub treated_file: Option<PathBuf>,

    /// Maximum number of articles to process
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<usize>,

    /// Evaluate every treated article against index.csv labels
    #[arg(long)]
    pub evaluate: bool,

    /// Delete the treated file and start from scratch
    #[arg(long)]
    pub fresh_start: bool,

    /// Ollama model to use
    #[arg(short, long, env = "NEWSJUDGE_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Decision tree JSON file (questionnary analyzer)
    #[arg(long, value_name = "FILE", env = "QUESTION_TREE_PATH")]
    pub tree_path: Option<PathBuf>,

    /// Which analyzer to use for classification
    #[arg(short, long, value_enum)]
    pub analyzer: Option<AnalyzerKind>,

    /// Explain the available analyzers (or one of them) and exit
    #[arg(long, value_name = "NAME", num_args = 0..=1, default_missing_value = "all")]
    pub analyzer_help: Option<String>,

    /// Character budget of article text sent in single-shot prompts
    #[arg(long, value_name = "CHARS", env = "MAX_CHARS")]
    pub max_chars: Option<usize>,

    /// Country whose image is judged
    #[arg(long)]
    pub country: Option<String>,

    /// Temperature for LLM responses (0.0 - 2.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Keep article content in the treated file
    #[arg(long)]
    pub keep_content: bool,

    /// Export misclassified articles as JSON into this directory
    #[arg(long, value_name = "DIR")]
    pub export_errors: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .newsjudge.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, value_name = "LEVEL", env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .newsjudge.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    ///
    /// Value ranges are checked on the merged configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref level) = self.log_level {
            if parse_level(level).is_none() {
                return Err(format!("Unknown log level: {}", level));
            }
        }

        Ok(())
    }

    /// Returns the log level from verbosity flags, falling back to `configured`.
    pub fn log_level(&self, configured: &str) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            parse_level(configured).unwrap_or(tracing::Level::INFO)
        }
    }
}

fn parse_level(level: &str) -> Option<tracing::Level> {
    level.trim().parse().ok()
}

/// Text printed by `--analyzer-help`. `Err` for an unknown analyzer name.
pub fn analyzer_help(name: &str) -> Result<String, String> {
    if name.eq_ignore_ascii_case("all") {
        let mut text = String::from("Available analyzers:\n");
        for kind in AnalyzerKind::ALL {
            text.push_str(&format!("- {}: {}\n", kind.as_str(), kind.description()));
        }
        return Ok(text);
    }

    AnalyzerKind::ALL
        .iter()
        .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
        .map(|kind| format!("Analyzer: {}\n{}\n", kind.as_str(), kind.description()))
        .ok_or_else(|| {
            format!(
                "Unknown analyzer '{}'. Use --analyzer-help to list all available analyzers.",
                name
            )
        })
}
