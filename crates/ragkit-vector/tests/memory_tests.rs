use std::sync::Arc;

use ragkit_core::filter::Bounds;
use ragkit_core::{Chunk, Error, Filter, FilterMode, Meta, QueryInput, VectorIndex};
use ragkit_embed::HashEmbedder;
use ragkit_vector::InMemoryVectorIndex;
use serde_json::json;

fn chunk(id: &str, doc: &str, idx: usize, text: &str, year: i64) -> Chunk {
    let mut metadata = Meta::new();
    metadata.insert("doc_id".into(), json!(doc));
    metadata.insert("chunk_index".into(), json!(idx));
    metadata.insert("year".into(), json!(year));
    Chunk {
        id: id.to_string(),
        text: text.to_string(),
        doc_id: doc.to_string(),
        chunk_index: idx,
        chunk_count: 2,
        metadata,
        embedding: None,
    }
}

fn unit(dim: usize, axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[axis] = 1.0;
    v
}

#[tokio::test]
async fn vector_query_ranks_by_similarity_in_unit_range() {
    let index = InMemoryVectorIndex::new(3);
    let chunks = vec![chunk("a", "d1", 0, "a", 2001), chunk("b", "d1", 1, "b", 2002), chunk("c", "d2", 0, "c", 2003)];
    let vectors = vec![unit(3, 0), unit(3, 1), vec![-1.0, 0.0, 0.0]];
    let ids = index.add(&chunks, Some(vectors.as_slice())).await.unwrap();
    assert_eq!(ids, vec!["a", "b", "c"]);

    let hits = index.query(QueryInput::Vector(unit(3, 0)), 3, None).await.unwrap();
    let order: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert!((hits[1].score - 0.5).abs() < 1e-6);
    assert!(hits[2].score.abs() < 1e-6);
    assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
}

#[tokio::test]
async fn equal_scores_tie_break_on_id() {
    let index = InMemoryVectorIndex::new(2);
    let chunks = vec![chunk("z", "d", 0, "z", 1), chunk("m", "d", 1, "m", 1)];
    index.add(&chunks, Some([unit(2, 0), unit(2, 0)].as_slice())).await.unwrap();
    let hits = index.query(QueryInput::Vector(unit(2, 0)), 2, None).await.unwrap();
    assert_eq!(hits[0].id, "m");
    assert_eq!(hits[1].id, "z");
}

#[tokio::test]
async fn dimension_mismatch_on_add_and_query() {
    let index = InMemoryVectorIndex::new(3);
    let err = index.add(&[chunk("a", "d", 0, "a", 1)], Some([vec![1.0, 0.0]].as_slice())).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));

    let err = index.query(QueryInput::Vector(vec![1.0]), 1, None).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));
}

#[tokio::test]
async fn filters_are_applied_natively() {
    let index = InMemoryVectorIndex::new(2);
    assert_eq!(index.filter_mode(), FilterMode::Native);
    let chunks = vec![chunk("a", "d1", 0, "a", 1999), chunk("b", "d1", 1, "b", 2005), chunk("c", "d2", 0, "c", 2010)];
    index.add(&chunks, Some([unit(2, 0), unit(2, 0), unit(2, 0)].as_slice())).await.unwrap();

    let eq = Filter::new().eq("doc_id", "d1");
    let hits = index.query(QueryInput::Vector(unit(2, 0)), 10, Some(&eq)).await.unwrap();
    assert_eq!(hits.len(), 2);

    let range = Filter::new().range("year", Bounds { gte: Some(2000.0), lt: Some(2010.0), ..Bounds::default() });
    let hits = index.query(QueryInput::Vector(unit(2, 0)), 10, Some(&range)).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "b");

    assert_eq!(index.ids_matching(&eq).await.unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn writes_are_visible_and_delete_is_idempotent() {
    let index = InMemoryVectorIndex::new(2);
    index.add(&[chunk("a", "d", 0, "a", 1)], Some([unit(2, 0)].as_slice())).await.unwrap();
    assert_eq!(index.count().await.unwrap(), 1);
    assert_eq!(index.get(&["a".to_string(), "missing".to_string()]).await.unwrap().len(), 1);

    assert_eq!(index.delete(&["a".to_string()]).await.unwrap(), 1);
    assert_eq!(index.delete(&["a".to_string(), "never".to_string()]).await.unwrap(), 0);
    assert_eq!(index.count().await.unwrap(), 0);
    assert!(index.query(QueryInput::Vector(unit(2, 0)), 5, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn re_adding_an_id_replaces_it() {
    let index = InMemoryVectorIndex::new(2);
    index.add(&[chunk("a", "d", 0, "old", 1)], Some([unit(2, 0)].as_slice())).await.unwrap();
    index.add(&[chunk("a", "d", 0, "new", 1)], Some([unit(2, 1)].as_slice())).await.unwrap();
    assert_eq!(index.count().await.unwrap(), 1);
    let got = index.get(&["a".to_string()]).await.unwrap();
    assert_eq!(got[0].text, "new");
    assert_eq!(got[0].embedding.as_deref(), Some([0.0f32, 1.0].as_slice()));
}

#[tokio::test]
async fn text_queries_and_missing_embeddings_use_the_provider() {
    let index = InMemoryVectorIndex::with_embedder(Arc::new(HashEmbedder::new(64)));
    let chunks = vec![
        chunk("a", "d", 0, "tomato blight in wet summers", 1),
        chunk("b", "d", 1, "sharpening chisels on a whetstone", 1),
    ];
    index.add(&chunks, None).await.unwrap();

    let hits = index.query(QueryInput::Text("tomato blight".into()), 1, None).await.unwrap();
    assert_eq!(hits[0].id, "a");
}

#[tokio::test]
async fn text_query_without_provider_is_config_error() {
    let index = InMemoryVectorIndex::new(4);
    let err = index.query(QueryInput::Text("anything".into()), 1, None).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
