//! Article loading and treated-item persistence.
//!
//! A [`FileLoader`] reads one article per `.txt` file in a data directory,
//! takes ground-truth labels from an optional `index.csv`, and keeps a JSON
//! file of every article already treated so an interrupted run can resume.

use crate::models::{Article, Label};
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Name of the label index inside the data directory.
pub const INDEX_FILE: &str = "index.csv";

const ARTICLE_EXTENSION: &str = "txt";

/// A source of untreated articles.
pub trait ArticleSource {
    /// Next article not yet treated, or `None` when exhausted.
    fn next_article(&mut self) -> Result<Option<Article>>;

    /// Record an analyzed article so it is not served again.
    fn mark_as_treated(&mut self, article: &Article) -> Result<()>;
}

/// Loader settings.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub data_dir: PathBuf,
    pub treated_file: PathBuf,
    /// Keep article content in memory and in the treated file.
    pub keep_content: bool,
}

/// Articles from a directory of text files.
pub struct FileLoader {
    config: LoaderConfig,
    index: HashMap<String, Label>,
    treated: Vec<Article>,
    treated_ids: HashSet<String>,
    pending: Option<VecDeque<PathBuf>>,
}

impl FileLoader {
    /// Create a loader, reading the label index and any treated items.
    pub fn new(config: LoaderConfig) -> Result<Self> {
        let index_path = config.data_dir.join(INDEX_FILE);
        let index = if index_path.is_file() {
            let content = fs::read_to_string(&index_path)
                .with_context(|| format!("Failed to read {}", index_path.display()))?;
            let index = parse_index(&content)
                .with_context(|| format!("Invalid label index {}", index_path.display()))?;
            info!("Loaded index with {} labeled items", index.len());
            index
        } else {
            warn!("{} not found in {}", INDEX_FILE, config.data_dir.display());
            HashMap::new()
        };

        let mut loader = Self {
            config,
            index,
            treated: Vec::new(),
            treated_ids: HashSet::new(),
            pending: None,
        };
        loader.load_treated()?;

        Ok(loader)
    }

    /// Articles treated so far, including those from earlier runs.
    pub fn treated_items(&self) -> &[Article] {
        &self.treated
    }

    /// Delete the treated file and forget every treated article.
    pub fn delete_treated_items(&mut self) -> Result<()> {
        let path = &self.config.treated_file;
        if path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
            info!("Deleted treated items file: {}", path.display());
        } else {
            warn!("Treated items file {} does not exist", path.display());
        }

        self.treated.clear();
        self.treated_ids.clear();
        self.pending = None;

        Ok(())
    }

    fn load_treated(&mut self) -> Result<()> {
        let path = self.config.treated_file.clone();
        if !path.exists() {
            warn!("Treated file {} not found, starting empty", path.display());
            return Ok(());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let records = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(records)) => records,
            Ok(_) => {
                error!("Expected a JSON array in {}, starting empty", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Failed to decode {}: {}, starting empty", path.display(), e);
                return Ok(());
            }
        };

        for record in records {
            match Article::from_record(record) {
                Ok(mut article) => {
                    if !self.config.keep_content {
                        article.content.clear();
                    }
                    if self.treated_ids.insert(article.id.clone()) {
                        self.treated.push(article);
                    }
                }
                Err(e) => warn!("Skipping malformed treated record: {}", e),
            }
        }

        info!(
            "Loaded {} treated items from {}",
            self.treated.len(),
            path.display()
        );
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let path = &self.config.treated_file;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let records: Vec<Value> = self
            .treated
            .iter()
            .map(|a| a.to_record(self.config.keep_content))
            .collect();
        let json = serde_json::to_string_pretty(&records)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    fn scan_data_dir(&self) -> Result<VecDeque<PathBuf>> {
        let mut files = VecDeque::new();

        for entry in WalkDir::new(&self.config.data_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.with_context(|| {
                format!("Failed to list {}", self.config.data_dir.display())
            })?;
            let path = entry.path();
            let is_article = entry.file_type().is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(ARTICLE_EXTENSION);
            if is_article {
                files.push_back(path.to_path_buf());
            }
        }

        debug!(
            "Found {} article files in {}",
            files.len(),
            self.config.data_dir.display()
        );
        Ok(files)
    }

    fn read_article(&self, path: &Path) -> Result<Article> {
        let id = article_id(path);
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read article {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let true_label = self.index.get(&id).copied();
        let mut article = Article::new(id, content).with_true_label(true_label);
        article.add_metadata("filename", filename);

        Ok(article)
    }
}

impl ArticleSource for FileLoader {
    fn next_article(&mut self) -> Result<Option<Article>> {
        if self.pending.is_none() {
            self.pending = Some(self.scan_data_dir()?);
        }

        while let Some(path) = self.pending.as_mut().and_then(VecDeque::pop_front) {
            if self.treated_ids.contains(&article_id(&path)) {
                continue;
            }
            return self.read_article(&path).map(Some);
        }

        Ok(None)
    }

    fn mark_as_treated(&mut self, article: &Article) -> Result<()> {
        if !self.treated_ids.insert(article.id.clone()) {
            info!("Article {} already marked as treated", article.id);
            return Ok(());
        }

        let mut stored = article.clone();
        if !self.config.keep_content {
            stored.content.clear();
        }
        self.treated.push(stored);
        self.persist()?;

        debug!("Marked {} items as treated", self.treated.len());
        Ok(())
    }
}

fn article_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn filename_stem(filename: &str) -> String {
    filename
        .strip_suffix(".txt")
        .unwrap_or(filename)
        .to_string()
}

/// Parse `index.csv` into id -> label.
///
/// The header must name `filename` and `label` columns. A leading byte order
/// mark is ignored. Rows with a blank or unknown label are skipped.
pub fn parse_index(content: &str) -> Result<HashMap<String, Label>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut records = csv_records(content).into_iter();
    let header = records.next().context("index is empty")?;

    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .with_context(|| format!("index has no '{}' column", name))
    };
    let filename_col = column("filename")?;
    let label_col = column("label")?;

    let mut index = HashMap::new();
    for fields in records {
        let (Some(filename), Some(label)) = (fields.get(filename_col), fields.get(label_col))
        else {
            debug!("Skipping short index row: {:?}", fields);
            continue;
        };

        let label = label.trim();
        if label.is_empty() {
            continue;
        }
        match label.parse::<Label>() {
            Ok(label) => {
                index.insert(filename_stem(filename.trim()), label);
            }
            Err(e) => debug!("Skipping index row for {}: {}", filename, e),
        }
    }

    Ok(index)
}

/// Split CSV text into records of fields.
///
/// Double-quoted fields may contain commas, doubled quotes and line breaks.
/// Blank lines are dropped.
fn csv_records(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = content.chars().peekable();

    let mut end_record = |fields: &mut Vec<String>, field: &mut String| {
        fields.push(std::mem::take(field));
        let record = std::mem::take(fields);
        if !(record.len() == 1 && record[0].trim().is_empty()) {
            records.push(record);
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            '\r' if !quoted && chars.peek() == Some(&'\n') => {}
            '\n' if !quoted => end_record(&mut fields, &mut field),
            _ => field.push(c),
        }
    }
    end_record(&mut fields, &mut field);

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(files: &[(&str, &str)], index: Option<&str>) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        if let Some(index) = index {
            fs::write(dir.path().join(INDEX_FILE), index).unwrap();
        }
        dir
    }

    fn open_loader(dir: &TempDir, keep_content: bool) -> FileLoader {
        FileLoader::new(LoaderConfig {
            data_dir: dir.path().to_path_buf(),
            treated_file: dir.path().join("out").join("treated.json"),
            keep_content,
        })
        .unwrap()
    }

    #[test]
    fn test_loads_txt_files_in_order_with_labels() {
        let dir = setup(
            &[("b.txt", "second"), ("a.txt", "first"), ("notes.md", "skip")],
            Some("filename,label\na.txt,POSITIVE\nb.txt,\n"),
        );
        let mut loader = open_loader(&dir, false);

        let first = loader.next_article().unwrap().unwrap();
        assert_eq!(first.id, "a");
        assert_eq!(first.content, "first");
        assert_eq!(first.true_label, Some(Label::Positive));
        assert_eq!(first.meta["filename"], "a.txt");

        let second = loader.next_article().unwrap().unwrap();
        assert_eq!(second.id, "b");
        assert_eq!(second.true_label, None);

        assert!(loader.next_article().unwrap().is_none());
    }

    #[test]
    fn test_missing_index_means_no_labels() {
        let dir = setup(&[("a.txt", "x")], None);
        let mut loader = open_loader(&dir, false);
        assert_eq!(loader.next_article().unwrap().unwrap().true_label, None);
    }

    #[test]
    fn test_treated_items_persist_and_are_skipped() {
        let dir = setup(&[("a.txt", "first"), ("b.txt", "second")], None);

        {
            let mut loader = open_loader(&dir, false);
            let mut article = loader.next_article().unwrap().unwrap();
            article.set_label(Label::Neutral);
            article.mark_as_treated();
            loader.mark_as_treated(&article).unwrap();
        }

        let saved = fs::read_to_string(dir.path().join("out/treated.json")).unwrap();
        let records: Value = serde_json::from_str(&saved).unwrap();
        assert_eq!(records[0]["id"], "a");
        assert_eq!(records[0]["predicted_label"], "neutral");
        assert!(records[0].get("content").is_none());

        let mut loader = open_loader(&dir, false);
        assert_eq!(loader.treated_items().len(), 1);
        assert_eq!(loader.next_article().unwrap().unwrap().id, "b");
        assert!(loader.next_article().unwrap().is_none());
    }

    #[test]
    fn test_keep_content_stores_content() {
        let dir = setup(&[("a.txt", "body")], None);
        let mut loader = open_loader(&dir, true);
        let article = loader.next_article().unwrap().unwrap();
        loader.mark_as_treated(&article).unwrap();

        let saved = fs::read_to_string(dir.path().join("out/treated.json")).unwrap();
        assert!(saved.contains("\"content\": \"body\""));
        assert_eq!(loader.treated_items()[0].content, "body");
    }

    #[test]
    fn test_marking_twice_is_noop() {
        let dir = setup(&[("a.txt", "body")], None);
        let mut loader = open_loader(&dir, false);
        let article = loader.next_article().unwrap().unwrap();
        loader.mark_as_treated(&article).unwrap();
        loader.mark_as_treated(&article).unwrap();
        assert_eq!(loader.treated_items().len(), 1);
    }

    #[test]
    fn test_corrupt_treated_file_starts_empty() {
        let dir = setup(&[("a.txt", "body")], None);
        fs::create_dir_all(dir.path().join("out")).unwrap();
        fs::write(dir.path().join("out/treated.json"), "{\"not\": \"a list\"}").unwrap();
        assert!(open_loader(&dir, false).treated_items().is_empty());

        fs::write(dir.path().join("out/treated.json"), "[{").unwrap();
        assert!(open_loader(&dir, false).treated_items().is_empty());
    }

    #[test]
    fn test_delete_treated_items() {
        let dir = setup(&[("a.txt", "body")], None);
        let mut loader = open_loader(&dir, false);
        let article = loader.next_article().unwrap().unwrap();
        loader.mark_as_treated(&article).unwrap();

        loader.delete_treated_items().unwrap();

        assert!(!dir.path().join("out/treated.json").exists());
        assert!(loader.treated_items().is_empty());
        assert_eq!(loader.next_article().unwrap().unwrap().id, "a");
    }

    #[test]
    fn test_parse_index() {
        let index = parse_index(
            "label,filename\nneutral,x.txt\n\"need_human_review\",\"y, z.txt\"\nbogus,w.txt\n",
        )
        .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index["x"], Label::Neutral);
        assert_eq!(index["y, z"], Label::NeedHumanReview);

        assert!(parse_index("name,label\na.txt,positive").is_err());
        assert!(parse_index("").is_err());
    }

    #[test]
    fn test_parse_index_ignores_byte_order_mark() {
        let index = parse_index("\u{feff}filename,label\r\na.txt,positive\r\n").unwrap();
        assert_eq!(index["a"], Label::Positive);
    }

    #[test]
    fn test_parse_index_quoted_line_breaks() {
        let index =
            parse_index("filename,note,label\na.txt,\"two\nlines\",negative\n\nb.txt,,neutral\n").unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index["a"], Label::Negative);
        assert_eq!(index["b"], Label::Neutral);
    }

    #[test]
    fn test_index_with_byte_order_mark_loads() {
        let dir = setup(
            &[("a.txt", "alpha")],
            Some("\u{feff}filename,label\na.txt,positive\n"),
        );
        let mut loader = open_loader(&dir, false);

        let article = loader.next_article().unwrap().unwrap();
        assert_eq!(article.true_label, Some(Label::Positive));
    }
}
