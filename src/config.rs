//! Configuration file handling.
//!
//! Settings come from `.newsjudge.toml`; command-line flags and their
//! environment variables override individual keys when given.

use crate::analyzer::{AnalyzerKind, AnalyzerSettings};
use crate::llm::{GenerateOptions, OllamaConfig};
use crate::loader::LoaderConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".newsjudge.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    #[serde(default)]
    pub data: DataConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// One of trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Ollama model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Upper bound on generated tokens per call.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Stop sequences passed with every call.
    #[serde(default = "default_stop")]
    pub stop: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            max_output_tokens: default_max_output_tokens(),
            stop: default_stop(),
        }
    }
}

fn default_model() -> String {
    "mistral:7b-instruct".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout() -> u64 {
    600
}

fn default_max_output_tokens() -> u32 {
    GenerateOptions::default().max_output_tokens
}

fn default_stop() -> Vec<String> {
    GenerateOptions::default().stop_sequences
}

/// Analyzer selection and prompt settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_kind")]
    pub kind: AnalyzerKind,

    /// Character budget for single-shot prompts.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Country whose image is judged.
    #[serde(default = "default_country")]
    pub country: String,

    /// Decision tree JSON file for the questionnary analyzer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_path: Option<PathBuf>,

    /// Members of the composite analyzer, in order.
    #[serde(default = "default_composite")]
    pub composite: Vec<AnalyzerKind>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            max_chars: default_max_chars(),
            country: default_country(),
            tree_path: None,
            composite: default_composite(),
        }
    }
}

fn default_kind() -> AnalyzerKind {
    AnalyzerKind::Questionnary
}

fn default_max_chars() -> usize {
    2000
}

fn default_country() -> String {
    "India".to_string()
}

fn default_composite() -> Vec<AnalyzerKind> {
    vec![AnalyzerKind::Expert, AnalyzerKind::Naive]
}

/// Input and persistence locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory of `.txt` articles and `index.csv`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// JSON file of treated articles.
    #[serde(default = "default_treated_file")]
    pub treated_file: PathBuf,

    /// Keep article content in the treated file.
    #[serde(default)]
    pub keep_content: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            treated_file: default_treated_file(),
            keep_content: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("../data")
}

fn default_treated_file() -> PathBuf {
    PathBuf::from("treated_items.json")
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values the user actually supplied (flag or environment
    /// variable) replace file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref level) = args.log_level {
            self.general.log_level = level.clone();
        }

        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        if let Some(kind) = args.analyzer {
            self.analyzer.kind = kind;
        }
        if let Some(max_chars) = args.max_chars {
            self.analyzer.max_chars = max_chars;
        }
        if let Some(ref country) = args.country {
            self.analyzer.country = country.clone();
        }
        if let Some(ref tree_path) = args.tree_path {
            self.analyzer.tree_path = Some(tree_path.clone());
        }

        if let Some(ref data_dir) = args.data_dir {
            self.data.data_dir = data_dir.clone();
        }
        if let Some(ref treated_file) = args.treated_file {
            self.data.treated_file = treated_file.clone();
        }

        // Flags only ever switch on
        if args.keep_content {
            self.data.keep_content = true;
        }
    }

    /// Check values that deserialization alone cannot.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err("Temperature must be between 0.0 and 2.0".to_string());
        }
        if self.analyzer.max_chars == 0 {
            return Err("Max chars must be at least 1".to_string());
        }
        if self.model.timeout_seconds == 0 {
            return Err("Timeout must be at least 1 second".to_string());
        }
        if !self.model.ollama_url.starts_with("http://")
            && !self.model.ollama_url.starts_with("https://")
        {
            return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
        }
        if self.analyzer.kind == AnalyzerKind::Questionnary && self.analyzer.tree_path.is_none() {
            return Err(
                "The questionnary analyzer needs a decision tree: pass --tree-path, set QUESTION_TREE_PATH or analyzer.tree_path"
                    .to_string(),
            );
        }
        Ok(())
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            max_output_tokens: self.model.max_output_tokens,
            stop_sequences: self.model.stop.clone(),
        }
    }

    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            ollama_url: self.model.ollama_url.clone(),
            model_name: self.model.name.clone(),
            temperature: self.model.temperature,
            timeout_seconds: self.model.timeout_seconds,
        }
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            max_chars: self.analyzer.max_chars,
            country: self.analyzer.country.clone(),
            options: self.generate_options(),
            tree_path: self.analyzer.tree_path.clone(),
            composite: self.analyzer.composite.clone(),
        }
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            data_dir: self.data.data_dir.clone(),
            treated_file: self.data.treated_file.clone(),
            keep_content: self.data.keep_content,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
