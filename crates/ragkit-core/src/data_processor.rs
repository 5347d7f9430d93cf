//! Loads a directory tree of plain-text documents for ingestion.

use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::Document;

const EXTENSIONS: &[&str] = &["txt", "md"];

#[derive(Debug, Clone, Default)]
pub struct DataProcessor {
    limit: Option<usize>,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    /// Stop after the first `limit` files (in path order).
    pub fn with_limit(limit: usize) -> Self { Self { limit: Some(limit) } }

    /// Read every `.txt`/`.md` file under `data_dir` into a [`Document`].
    ///
    /// The document id is the file stem; metadata carries `source_path` and
    /// `category`, the parent directory relative to `data_dir` (`misc` at the root).
    pub fn load_directory(&self, data_dir: &Path) -> Result<Vec<Document>> {
        if !data_dir.is_dir() {
            return Err(Error::NotFound(format!("data directory {}", data_dir.display())));
        }
        let mut files = self.list_files(data_dir);
        if files.is_empty() {
            warn!(dir = %data_dir.display(), "no text files found");
            return Ok(vec![]);
        }
        if let Some(limit) = self.limit {
            if files.len() > limit {
                files.truncate(limit);
                info!(limit, "limited to first files");
            }
        }

        let mut docs = Vec::with_capacity(files.len());
        for (file_index, file_path) in files.iter().enumerate() {
            debug!(file = %file_path.display(), n = file_index + 1, total = files.len(), "reading");
            let Some(doc_id) = extract_doc_id(file_path) else {
                warn!(file = %file_path.display(), "skipping file without a usable name");
                continue;
            };
            let text = read_file_content(file_path)?;
            let category = facet_from_path(file_path, data_dir);
            docs.push(
                Document::new(doc_id, text)
                    .with_meta("source_path", json!(file_path.to_string_lossy()))
                    .with_meta("category", json!(category)),
            );
        }
        info!(files = files.len(), documents = docs.len(), "loaded documents");
        Ok(docs)
    }

    fn list_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|s| s.to_str()).is_some_and(|ext| EXTENSIONS.contains(&ext)))
            .collect();
        files.sort();
        files
    }
}

fn read_file_content(file_path: &Path) -> Result<String> {
    let bytes = fs::read(file_path)
        .map_err(|e| Error::Operation(format!("failed to read {}: {e}", file_path.display())))?;
    Ok(match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

fn extract_doc_id(file_path: &Path) -> Option<String> {
    file_path.file_stem().map(|s| s.to_string_lossy().to_string()).filter(|s| !s.is_empty())
}

fn facet_from_path(file_path: &Path, data_dir: &Path) -> String {
    let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path);
    match relative.parent().and_then(|p| p.to_str()) {
        Some(facet) if !facet.is_empty() => facet.to_string(),
        _ => "misc".to_string(),
    }
}
