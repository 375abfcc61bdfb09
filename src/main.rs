//! NewsJudge - LLM-judged classification of news articles
//!
//! Loads text articles, classifies each one with an LLM-backed analyzer
//! according to the image of a country it conveys, persists the verdicts
//! and evaluates them against ground-truth labels.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime or configuration error

mod analyzer;
mod cli;
mod config;
mod evaluation;
mod llm;
mod loader;
mod models;
mod processor;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, CONFIG_FILE};
use llm::{LlmGateway, OllamaGateway};
use loader::FileLoader;
use models::Article;
use processor::ArticleProcessor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Some(ref name) = args.analyzer_help {
        match cli::analyzer_help(name) {
            Ok(text) => {
                print!("{}", text);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    if args.init_config {
        return handle_init_config();
    }

    let (mut config, config_warning) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, &config);

    info!("NewsJudge v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    if let Some(e) = config_warning {
        warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_FILE, e);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&args, &config).await {
        error!("Run failed: {:#}", e);
        eprintln!("\nError: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: write a default .newsjudge.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("{} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("Created {} with default settings.", CONFIG_FILE);
    println!("Edit it to choose the model, analyzer, country and data locations.");
    Ok(())
}

/// Initialize logging from verbosity flags and the configured level.
fn init_logging(args: &Args, config: &Config) {
    let level = args.log_level(&config.general.log_level);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration from file or use defaults.
///
/// A broken auto-detected file is not fatal; its error is handed back so it
/// can be logged once logging is up.
fn load_config(args: &Args) -> Result<(Config, Option<anyhow::Error>)> {
    if let Some(ref config_path) = args.config {
        return Ok((Config::load(config_path)?, None));
    }

    match Config::load_default() {
        Ok(Some(config)) => Ok((config, None)),
        Ok(None) => Ok((Config::default(), None)),
        Err(e) => Ok((Config::default(), Some(e))),
    }
}

/// Process untreated articles, then evaluate.
async fn run(args: &Args, config: &Config) -> Result<()> {
    let mut loader = FileLoader::new(config.loader_config())?;
    if args.fresh_start {
        info!("Fresh start enabled, deleting treated items");
        loader.delete_treated_items()?;
    }

    let ollama =
        OllamaGateway::new(config.ollama_config()).context("Failed to create Ollama client")?;
    debug!("Generating with {}", ollama.model_name());
    let gateway: Arc<dyn LlmGateway> = Arc::new(ollama);
    let kind = config.analyzer.kind;
    let analyzer = analyzer::build_analyzer(kind, &config.analyzer_settings(), gateway)?;

    println!("Classifying articles");
    println!("   Analyzer: {}", kind.as_str());
    println!("   Model: {}", config.model.name);
    println!("   Ollama: {}", config.model.ollama_url);
    println!("   Country: {}", config.analyzer.country);
    println!("   Data: {}", config.data.data_dir.display());

    let interrupted = Arc::new(AtomicBool::new(false));
    spawn_interrupt_listener(interrupted.clone());

    let mut processor = ArticleProcessor::new(loader, analyzer).with_interrupt_flag(interrupted);
    let summary = processor.run(args.limit).await?;

    if summary.interrupted {
        warn!("Keyboard interrupt received, proceeding to evaluation");
    }
    println!("\nProcessed {} articles.", summary.processed);

    // --evaluate covers earlier runs too
    let articles: &[Article] = if args.evaluate {
        processor.source().treated_items()
    } else {
        processor.results()
    };

    if args.evaluate || !articles.is_empty() {
        print_evaluation(articles);
    }

    if let Some(ref dir) = args.export_errors {
        let written = evaluation::export_errors(articles, dir)?;
        println!("Exported {} error datasets to {}", written.len(), dir.display());
    }

    Ok(())
}

/// Raise `flag` on the first Ctrl-C; exit immediately on the second.
fn spawn_interrupt_listener(flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("\nInterrupt received, finishing the current article (Ctrl-C again to abort)...");
        flag.store(true, Ordering::SeqCst);

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

fn print_evaluation(articles: &[Article]) {
    match evaluation::evaluate_multiclass(articles) {
        Some(report) => println!("\n{}", report),
        None => warn!("No items with both true and predicted labels, skipping multiclass evaluation"),
    }
    match evaluation::evaluate_binary_relevance(articles) {
        Some(report) => println!("\n{}", report),
        None => warn!("No items suitable for binary relevance evaluation"),
    }
}
