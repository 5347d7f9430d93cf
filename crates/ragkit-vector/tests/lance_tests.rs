use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::{DataType, Field, Schema};
use ragkit_core::{Chunker, ChunkerConfig, Document, Error, Filter, FilterMode, QueryInput, VectorIndex};
use ragkit_embed::HashEmbedder;
use ragkit_vector::schema::rows_from_batch;
use ragkit_vector::table::lance_err;
use ragkit_vector::LanceVectorIndex;
use tempfile::TempDir;

const DIM: usize = 256;

async fn open(tmp: &TempDir) -> LanceVectorIndex {
    let uri = tmp.path().to_string_lossy().to_string();
    LanceVectorIndex::open(&uri, "chunks", DIM, Some(Arc::new(HashEmbedder::new(DIM)))).await.expect("open")
}

fn docs() -> Vec<ragkit_core::Chunk> {
    let chunker = Chunker::new(ChunkerConfig::new(200, 20)).unwrap();
    let mut chunks = chunker.chunk_document(
        &Document::new("garden", "Tomato blight spreads in wet weather. Remove affected leaves early.")
            .with_meta("category", "plants"),
    );
    chunks.extend(chunker.chunk_document(
        &Document::new("workshop", "Sharpen chisels on a fine whetstone and strop the burr.").with_meta("category", "tools"),
    ));
    chunks
}

#[tokio::test]
async fn lance_round_trip_search_filter_and_delete() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    assert_eq!(index.filter_mode(), FilterMode::PostFilter);

    let chunks = docs();
    let ids = index.add(&chunks, None).await.unwrap();
    assert_eq!(ids.len(), 2);
    assert_eq!(index.count().await.unwrap(), 2);

    let hits = index.query(QueryInput::Text("tomato blight".into()), 2, None).await.unwrap();
    assert_eq!(hits[0].id, "garden_chunk_0");
    assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
    assert!(hits[0].score >= hits[1].score);
    assert_eq!(hits[0].metadata["category"], "plants");

    // Native column and post-filtered metadata field.
    let by_doc = Filter::new().eq("doc_id", "workshop");
    let hits = index.query(QueryInput::Text("tomato".into()), 5, Some(&by_doc)).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "workshop_chunk_0");
    let by_category = Filter::new().eq("category", "plants");
    assert_eq!(index.ids_matching(&by_category).await.unwrap(), vec!["garden_chunk_0"]);

    let fetched = index.get(&["workshop_chunk_0".to_string()]).await.unwrap();
    assert_eq!(fetched[0].embedding.as_ref().map(Vec::len), Some(DIM));

    assert_eq!(index.delete(&["garden_chunk_0".to_string(), "nope".to_string()]).await.unwrap(), 1);
    assert_eq!(index.delete(&["garden_chunk_0".to_string()]).await.unwrap(), 0);
    assert_eq!(index.count().await.unwrap(), 1);
}

#[tokio::test]
async fn lance_upserts_on_id() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    let chunks = docs();
    index.add(&chunks, None).await.unwrap();
    index.add(&chunks, None).await.unwrap();
    assert_eq!(index.count().await.unwrap(), 2);
}

#[tokio::test]
async fn reopening_with_another_dimension_fails() {
    let tmp = TempDir::new().unwrap();
    let _ = open(&tmp).await;
    let uri = tmp.path().to_string_lossy().to_string();
    let err = LanceVectorIndex::open(&uri, "chunks", DIM * 2, None).await.err().expect("dimension check");
    assert!(matches!(err, Error::DimensionMismatch { expected, actual } if expected == DIM * 2 && actual == DIM));
}

#[test]
fn caller_and_data_errors_are_not_retried() {
    let err = lance_err(lancedb::Error::InvalidInput { message: "bad predicate".to_string() });
    assert!(matches!(&err, Error::InvalidQuery(m) if m == "bad predicate"));
    assert!(!err.is_retriable());

    let err = lance_err(lancedb::Error::Schema { message: "vector column is fixed_size_list<256>".to_string() });
    assert!(matches!(err, Error::Operation(_)));
    assert!(!err.is_retriable());

    let err = lance_err(lancedb::Error::InvalidTableName { name: "a/b".to_string(), reason: "slash".to_string() });
    assert!(matches!(err, Error::InvalidQuery(_)));
}

#[test]
fn storage_errors_stay_retriable() {
    let err = lance_err(lancedb::Error::Runtime { message: "io worker stopped".to_string() });
    assert!(matches!(err, Error::BackendUnavailable { .. }));
    assert!(err.is_retriable());
}

#[test]
fn undecodable_batches_are_operation_errors() {
    let schema = Arc::new(Schema::new(vec![Field::new("unrelated", DataType::Utf8, true)]));
    let batch = RecordBatch::new_empty(schema);
    let err = rows_from_batch(&batch).err().expect("missing columns");
    assert!(matches!(err, Error::Operation(_)));
    assert!(!err.is_retriable());
}
