//! Recursive character splitter.
//!
//! Text is normalised first (whitespace runs collapsed, blank-line runs
//! reduced to a single paragraph break), then split on the coarsest
//! separator that produces useful pieces. Pieces are merged greedily into
//! windows of at most `chunk_size` characters, with trailing pieces worth up
//! to `overlap` characters carried into the next window. When no separator
//! applies, the text is sliced with a fixed stride of `chunk_size - overlap`.
//!
//! Sizes are counted in `char`s, never bytes, so multi-byte text is never cut
//! inside a code point.

use serde_json::json;
use std::collections::VecDeque;
use tracing::debug;

use crate::config::ChunkerConfig;
use crate::error::Result;
use crate::types::{meta_keys, Chunk, Document};

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        split_validated(text, self.config.chunk_size, self.config.overlap, &self.config.separators)
    }

    /// Split a document into chunks carrying the document metadata plus the
    /// bookkeeping keys of [`meta_keys`].
    pub fn chunk_document(&self, doc: &Document) -> Vec<Chunk> {
        let pieces = self.split(&doc.text);
        let chunk_count = pieces.len();
        let document_hash = blake3::hash(doc.text.as_bytes()).to_hex().to_string();
        let timestamp = chrono::Utc::now().to_rfc3339();

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| {
                let id = Chunk::make_id(&doc.id, chunk_index);
                let mut metadata = doc.metadata.clone();
                metadata.insert(meta_keys::DOC_ID.to_string(), json!(doc.id));
                metadata.insert(meta_keys::CHUNK_ID.to_string(), json!(id));
                metadata.insert(meta_keys::CHUNK_INDEX.to_string(), json!(chunk_index));
                metadata.insert(meta_keys::CHUNK_COUNT.to_string(), json!(chunk_count));
                metadata.insert(meta_keys::DOCUMENT_HASH.to_string(), json!(document_hash));
                metadata.insert(meta_keys::TIMESTAMP.to_string(), json!(timestamp));
                Chunk { id, text, doc_id: doc.id.clone(), chunk_index, chunk_count, metadata, embedding: None }
            })
            .collect();

        debug!(doc_id = %doc.id, chunks = chunk_count, "chunked document");
        chunks
    }
}

/// Split `text` into ordered chunks of at most `chunk_size` characters.
///
/// Fails with [`crate::Error::Config`] when `overlap >= chunk_size`.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize, separators: &[String]) -> Result<Vec<String>> {
    ChunkerConfig { chunk_size, overlap, separators: separators.to_vec() }.validate()?;
    Ok(split_validated(text, chunk_size, overlap, separators))
}

/// Trim every line, collapse internal whitespace to one space and reduce
/// each run of blank lines to a single `"\n\n"` paragraph break.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut paragraph_break = false;
    for line in text.lines() {
        let mut words = line.split_whitespace().peekable();
        if words.peek().is_none() {
            paragraph_break = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if paragraph_break { "\n\n" } else { "\n" });
        }
        paragraph_break = false;
        for (i, word) in words.enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}

fn split_validated(text: &str, chunk_size: usize, overlap: usize, separators: &[String]) -> Vec<String> {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return Vec::new();
    }
    if char_len(&normalized) <= chunk_size {
        return vec![normalized];
    }
    split_recursive(&normalized, separators, chunk_size, overlap)
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn split_recursive(text: &str, separators: &[String], size: usize, overlap: usize) -> Vec<String> {
    if char_len(text) <= size {
        return vec![text.to_string()];
    }
    let Some((sep, finer)) = separators.split_first() else {
        return split_by_stride(text, size, overlap);
    };
    if sep.is_empty() {
        return split_by_stride(text, size, overlap);
    }

    let pieces: Vec<&str> = text.split(sep.as_str()).collect();
    let worthwhile = pieces.len() > 1 && pieces.iter().any(|p| char_len(p) * 2 >= size);
    if !worthwhile {
        return split_recursive(text, finer, size, overlap);
    }
    merge_pieces(&pieces, sep, finer, size, overlap)
}

fn merge_pieces(pieces: &[&str], sep: &str, finer: &[String], size: usize, overlap: usize) -> Vec<String> {
    let sep_len = char_len(sep);
    let mut out = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    // Length of the window joined with `sep`.
    let mut window_len = 0usize;

    for &piece in pieces {
        let piece_len = char_len(piece);

        if piece_len > size {
            if !window.is_empty() {
                out.push(join(&window, sep));
                window.clear();
                window_len = 0;
            }
            out.extend(split_recursive(piece, finer, size, overlap));
            continue;
        }

        if !window.is_empty() && window_len + sep_len + piece_len > size {
            out.push(join(&window, sep));
            while let Some(front) = window.front() {
                if window_len <= overlap && window_len + sep_len + piece_len <= size {
                    break;
                }
                let front_len = char_len(front);
                window.pop_front();
                window_len -= if window.is_empty() { front_len } else { front_len + sep_len };
            }
        }

        window_len += if window.is_empty() { piece_len } else { sep_len + piece_len };
        window.push_back(piece);
    }

    if !window.is_empty() {
        out.push(join(&window, sep));
    }
    out
}

fn split_by_stride(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let n = bounds.len() - 1;
    let stride = size - overlap;
    let mut out = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(n);
        out.push(text[bounds[start]..bounds[end]].to_string());
        if end == n {
            break;
        }
        start += stride;
    }
    out
}

fn join(window: &VecDeque<&str>, sep: &str) -> String {
    window.iter().copied().collect::<Vec<_>>().join(sep)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
