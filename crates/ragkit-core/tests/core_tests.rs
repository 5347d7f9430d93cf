use std::fs;
use std::io::Write;
use tempfile::TempDir;

use ragkit_core::data_processor::DataProcessor;
use ragkit_core::{Chunker, ChunkerConfig, Document, Error};

#[test]
fn load_directory_single_small_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    let file_path = dir.join("a.txt");
    let mut f = fs::File::create(&file_path).unwrap();
    writeln!(f, "Short text").unwrap();

    let docs = DataProcessor::new().load_directory(dir).expect("load");

    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, "a");
    assert_eq!(docs[0].text.trim(), "Short text");
    assert_eq!(docs[0].metadata["category"], "misc");
}

#[test]
fn load_directory_limited_two_files_limit_one() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("a.txt"), "alpha bravo").unwrap();
    fs::write(dir.join("b.txt"), "charlie delta").unwrap();

    let docs = DataProcessor::with_limit(1).load_directory(dir).expect("load limited");

    assert_eq!(docs.len(), 1, "limited to one source document");
    assert_eq!(docs[0].id, "a");
}

#[test]
fn load_directory_reads_markdown_and_category_facets() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("herbs")).unwrap();
    fs::write(dir.join("herbs/mint.md"), "# Mint\n\nGrows fast.").unwrap();
    fs::write(dir.join("notes.csv"), "ignored").unwrap();

    let docs = DataProcessor::new().load_directory(dir).unwrap();

    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, "mint");
    assert_eq!(docs[0].metadata["category"], "herbs");
}

#[test]
fn load_directory_missing_dir_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let err = DataProcessor::new().load_directory(&tmp.path().join("nope")).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn chunk_document_sets_ids_and_bookkeeping_metadata() {
    let chunker = Chunker::new(ChunkerConfig::new(100, 10)).unwrap();
    let text = "x".repeat(250);
    let doc = Document::new("doc1", text.clone()).with_meta("lang", "en");

    let chunks = chunker.chunk_document(&doc);

    assert_eq!(chunks.len(), 3);
    let expected_hash = blake3::hash(text.as_bytes()).to_hex().to_string();
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.id, format!("doc1_chunk_{i}"));
        assert_eq!(c.doc_id, "doc1");
        assert_eq!(c.chunk_index, i);
        assert_eq!(c.chunk_count, 3);
        assert_eq!(c.metadata["doc_id"], "doc1");
        assert_eq!(c.metadata["chunk_id"], c.id.as_str());
        assert_eq!(c.metadata["chunk_index"], i);
        assert_eq!(c.metadata["chunk_count"], 3);
        assert_eq!(c.metadata["document_hash"], expected_hash.as_str());
        assert!(c.metadata["timestamp"].is_string());
        assert_eq!(c.metadata["lang"], "en");
        assert!(c.embedding.is_none());
    }
}

#[test]
fn chunk_ids_are_stable_across_reingestion() {
    let chunker = Chunker::new(ChunkerConfig::new(50, 5)).unwrap();
    let doc = Document::new("d", "word ".repeat(60));
    let a: Vec<_> = chunker.chunk_document(&doc).into_iter().map(|c| (c.id, c.text)).collect();
    let b: Vec<_> = chunker.chunk_document(&doc).into_iter().map(|c| (c.id, c.text)).collect();
    assert_eq!(a, b);
}
