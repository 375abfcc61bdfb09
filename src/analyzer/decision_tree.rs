//! Yes/no decision tree of LLM questions.
//!
//! Each internal node asks the model one yes/no question about the article
//! and routes to its `if_yes` or `if_no` child; leaves assign a fixed label.
//! Nodes live in an arena and refer to their children by [`NodeId`], so the
//! tree can be declared with forward references and checked once at build
//! time.
//!
//! # Specification format
//!
//! ```json
//! {
//!   "min_size": 200,
//!   "leaves": { "irrelevant": "IRRELEVANT", "positive": "POSITIVE" },
//!   "nodes": {
//!     "about_country": {
//!       "prompt": "[INST] Is this article about India? Answer yes or no.\n{article} [/INST]",
//!       "question_name": "about_country",
//!       "if_yes": "positive",
//!       "if_no": "irrelevant"
//!     }
//!   },
//!   "root": "about_country"
//! }
//! ```

use super::{record_gateway_failure, Analyzer};
use crate::llm::{GenerateOptions, LlmGateway};
use crate::models::{truncate_chars, Article, Label};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Substitution point for the article text in node prompts.
pub const ARTICLE_PLACEHOLDER: &str = "{article}";

/// Characters of content kept in `meta.small_content` at a leaf.
const SMALL_CONTENT_CHARS: usize = 200;

/// Declarative tree description, as read from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSpec {
    /// Minimum stripped content length, applied at every question.
    #[serde(default)]
    pub min_size: usize,
    /// Leaf id -> label name.
    pub leaves: BTreeMap<String, String>,
    /// Question id -> question definition.
    pub nodes: BTreeMap<String, NodeSpec>,
    /// Entry point, a question or a leaf id.
    pub root: String,
}

/// One question in a [`TreeSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub prompt: String,
    pub question_name: String,
    pub if_yes: String,
    pub if_no: String,
}

impl TreeSpec {
    /// Read a tree specification from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read decision tree: {}", path.display()))?;
        let spec = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse decision tree: {}", path.display()))?;
        Ok(spec)
    }
}

/// Structural problems found while building a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeBuildError {
    #[error("id '{0}' is declared as both a leaf and a node")]
    DuplicateId(String),

    #[error("leaf '{leaf}' names unknown label '{label}'")]
    UnknownLabel { leaf: String, label: String },

    #[error("node '{node}' has {branch} branch pointing to undeclared id '{target}'")]
    DanglingReference {
        node: String,
        branch: &'static str,
        target: String,
    },

    #[error("root '{0}' is not a declared node or leaf")]
    MissingRoot(String),

    #[error("prompt of node '{0}' has no {{article}} placeholder")]
    MissingPlaceholder(String),

    #[error("node '{0}' is part of a cycle")]
    Cycle(String),
}

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Question {
    id: String,
    prompt: String,
    question_name: String,
    if_yes: NodeId,
    if_no: NodeId,
}

#[derive(Debug, Clone)]
enum TreeNode {
    Question(Question),
    Leaf { id: String, label: Label },
}

/// A built decision tree, ready to analyze articles.
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
    root: NodeId,
    min_size: usize,
    gateway: Arc<dyn LlmGateway>,
    options: GenerateOptions,
}

impl DecisionTree {
    /// Build a tree from its specification.
    ///
    /// Leaves are materialized first, then every question gets an id, then
    /// a linking pass resolves `if_yes`/`if_no`. Any structural problem
    /// aborts the build; a partial tree is never returned.
    pub fn build(
        spec: &TreeSpec,
        gateway: Arc<dyn LlmGateway>,
        options: GenerateOptions,
    ) -> Result<Self, TreeBuildError> {
        let mut nodes = Vec::with_capacity(spec.leaves.len() + spec.nodes.len());
        let mut index: HashMap<&str, NodeId> = HashMap::new();

        for (leaf_id, label_name) in &spec.leaves {
            let label = label_name
                .parse::<Label>()
                .map_err(|_| TreeBuildError::UnknownLabel {
                    leaf: leaf_id.clone(),
                    label: label_name.clone(),
                })?;
            index.insert(leaf_id, NodeId(nodes.len()));
            nodes.push(TreeNode::Leaf {
                id: leaf_id.clone(),
                label,
            });
        }

        let first_question = nodes.len();
        for (offset, node_id) in spec.nodes.keys().enumerate() {
            if index.contains_key(node_id.as_str()) {
                return Err(TreeBuildError::DuplicateId(node_id.clone()));
            }
            index.insert(node_id, NodeId(first_question + offset));
        }

        let resolve = |node: &str, branch: &'static str, target: &str| {
            index
                .get(target)
                .copied()
                .ok_or_else(|| TreeBuildError::DanglingReference {
                    node: node.to_string(),
                    branch,
                    target: target.to_string(),
                })
        };

        for (node_id, node) in &spec.nodes {
            if !node.prompt.contains(ARTICLE_PLACEHOLDER) {
                return Err(TreeBuildError::MissingPlaceholder(node_id.clone()));
            }
            nodes.push(TreeNode::Question(Question {
                id: node_id.clone(),
                prompt: node.prompt.clone(),
                question_name: node.question_name.clone(),
                if_yes: resolve(node_id, "if_yes", &node.if_yes)?,
                if_no: resolve(node_id, "if_no", &node.if_no)?,
            }));
        }

        let root = index
            .get(spec.root.as_str())
            .copied()
            .ok_or_else(|| TreeBuildError::MissingRoot(spec.root.clone()))?;

        let tree = Self {
            nodes,
            root,
            min_size: spec.min_size,
            gateway,
            options,
        };
        tree.check_acyclic()?;

        Ok(tree)
    }

    /// Number of nodes (questions and leaves) in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Maximum number of questions asked on any root-to-leaf path.
    #[allow(dead_code)] // Bound on LLM calls per article
    pub fn depth(&self) -> usize {
        self.depth_from(self.root)
    }

    fn depth_from(&self, id: NodeId) -> usize {
        match &self.nodes[id.0] {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Question(q) => 1 + self.depth_from(q.if_yes).max(self.depth_from(q.if_no)),
        }
    }

    fn check_acyclic(&self) -> Result<(), TreeBuildError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(tree: &DecisionTree, id: NodeId, marks: &mut [Mark]) -> Result<(), TreeBuildError> {
            match marks[id.0] {
                Mark::Done => return Ok(()),
                Mark::InProgress => {
                    return Err(TreeBuildError::Cycle(tree.node_name(id).to_string()));
                }
                Mark::Unvisited => {}
            }
            if let TreeNode::Question(q) = &tree.nodes[id.0] {
                marks[id.0] = Mark::InProgress;
                visit(tree, q.if_yes, marks)?;
                visit(tree, q.if_no, marks)?;
            }
            marks[id.0] = Mark::Done;
            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        visit(self, self.root, &mut marks)
    }

    fn node_name(&self, id: NodeId) -> &str {
        match &self.nodes[id.0] {
            TreeNode::Question(q) => &q.id,
            TreeNode::Leaf { id, .. } => id,
        }
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, level: usize) -> fmt::Result {
        let indent = "  ".repeat(level);
        match &self.nodes[id.0] {
            TreeNode::Leaf { label, .. } => writeln!(f, "{}LEAF: {}", indent, label),
            TreeNode::Question(q) => {
                writeln!(f, "{}? {}", indent, q.question_name)?;
                writeln!(f, "{}  if_yes:", indent)?;
                self.fmt_node(f, q.if_yes, level + 2)?;
                writeln!(f, "{}  if_no:", indent)?;
                self.fmt_node(f, q.if_no, level + 2)
            }
        }
    }
}

impl fmt::Display for DecisionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f, self.root, 0)
    }
}

#[async_trait]
impl Analyzer for DecisionTree {
    fn name(&self) -> &str {
        "questionnary"
    }

    async fn analyze(&self, mut article: Article) -> Article {
        let mut current = self.root;

        loop {
            let question = match &self.nodes[current.0] {
                TreeNode::Leaf { label, .. } => {
                    let preview = truncate_chars(&article.content, SMALL_CONTENT_CHARS).to_string();
                    article.set_label(*label);
                    article.add_metadata("small_content", preview);
                    article.add_analysis("leaf_answer", label.as_str());
                    article.mark_as_treated();
                    debug!("questionnary: article {} -> {}", article.id, label);
                    return article;
                }
                TreeNode::Question(q) => q,
            };

            let prompt = {
                let content = article.content.trim();
                let length = content.chars().count();
                if length < self.min_size {
                    article.add_metadata(
                        "error",
                        format!("Content too short: {} characters", length),
                    );
                    article.set_label(Label::TooShort);
                    article.mark_as_treated();
                    return article;
                }
                question.prompt.replace(ARTICLE_PLACEHOLDER, content)
            };

            let output = match self.gateway.generate(&prompt, &self.options).await {
                Ok(output) => output,
                Err(e) => {
                    record_gateway_failure(&mut article, self.name(), &e);
                    return article;
                }
            };

            let answer = output.to_lowercase();
            article.add_analysis(question.question_name.clone(), output.clone());

            current = if answer.contains("yes") {
                question.if_yes
            } else if answer.contains("no") {
                question.if_no
            } else {
                article.add_metadata(
                    "error",
                    format!(
                        "Invalid response from question '{}': {}",
                        question.question_name, output
                    ),
                );
                article.set_label(Label::Error);
                article.mark_as_treated();
                return article;
            };
        }
    }
}
