use std::sync::Arc;

use ragkit_core::config::{ChunkerConfig, FusionSettings, FusionWeightProfile};
use ragkit_core::{Document, ErrorKind};
use ragkit_embed::HashEmbedder;
use ragkit_hybrid::{execute, render, ResponseFormat, RetrievalOrchestrator, SearchRequest, StaticGraphRetriever};
use ragkit_vector::InMemoryVectorIndex;
use serde_json::{json, Value};

async fn orchestrator() -> RetrievalOrchestrator {
    let embedder = Arc::new(HashEmbedder::new(256));
    let graph = StaticGraphRetriever::from_json_str(
        r#"[{"id": "frost_fact", "text": "First frost arrives in October.", "terms": ["frost"], "domains": ["garden"]}]"#,
    )
    .unwrap();
    let orch = RetrievalOrchestrator::builder()
        .embedder(embedder.clone())
        .index(Arc::new(InMemoryVectorIndex::with_embedder(embedder)))
        .graph(Arc::new(graph))
        .fusion(FusionSettings {
            default: FusionWeightProfile::new("default", 1.0, 0.0),
            profiles: vec![FusionWeightProfile::new("garden", 0.6, 0.4)],
        })
        .chunking(ChunkerConfig::new(200, 20))
        .build()
        .unwrap();
    let docs = vec![
        Document::new("tomatoes", "Cover tomatoes before frost.").with_meta("year", 2021),
        Document::new("garlic", "Plant garlic cloves in autumn.").with_meta("year", 2019),
    ];
    orch.ingest_batch(&docs).await.unwrap();
    orch
}

#[tokio::test]
async fn execute_applies_defaults_and_json_filter() {
    let orch = orchestrator().await;

    let resp = execute(&orch, SearchRequest::new("frost")).await.unwrap();
    assert_eq!(resp.count, 2);
    assert_eq!(resp.results.len(), 2);
    assert_eq!(resp.query, "frost");

    let mut req = SearchRequest::new("frost");
    req.filter = Some(json!({ "year": { "gte": 2020 } }));
    let resp = execute(&orch, req).await.unwrap();
    assert_eq!(resp.count, 1);
    assert_eq!(resp.results[0].id, "tomatoes_chunk_0");
    assert!(resp.results[0].similarity_score.is_some());
}

#[tokio::test]
async fn graph_only_results_have_no_similarity_score() {
    let orch = orchestrator().await;
    let mut req = SearchRequest::new("when is the first frost");
    req.domain = Some("garden".to_string());
    let resp = execute(&orch, req).await.unwrap();

    let fact = resp.results.iter().find(|r| r.id == "frost_fact").unwrap();
    assert!(fact.similarity_score.is_none());
    assert!(fact.final_score.is_some());
    assert_eq!(resp.domain.as_deref(), Some("garden"));

    let body: Value = serde_json::from_str(&render(&resp, ResponseFormat::Json).unwrap()).unwrap();
    let fact = body["results"].as_array().unwrap().iter().find(|r| r["id"] == "frost_fact").unwrap();
    assert!(fact.get("similarity_score").is_none());
    assert_eq!(fact["source"], "graph");
    assert_eq!(body["metadata"]["degraded"], false);
}

#[tokio::test]
async fn errors_come_back_as_structured_bodies() {
    let orch = orchestrator().await;

    let mut req = SearchRequest::new("frost");
    req.filter = Some(json!({ "year": [2020, 2021] }));
    assert_eq!(execute(&orch, req).await.unwrap_err().kind, ErrorKind::UnsupportedFilter);

    let mut req = SearchRequest::new("frost");
    req.k = Some(0);
    assert_eq!(execute(&orch, req).await.unwrap_err().kind, ErrorKind::InvalidQuery);

    let err = execute(&orch, SearchRequest::new("")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidQuery);
    assert!(!err.message.is_empty());
}

#[tokio::test]
async fn text_rendering_lists_results() {
    let orch = orchestrator().await;
    let resp = execute(&orch, SearchRequest::new("garlic")).await.unwrap();
    let text = render(&resp, ResponseFormat::Text).unwrap();
    assert!(text.starts_with("query: garlic\n"));
    assert!(text.contains("1. ["));
    assert!(text.contains("garlic_chunk_0"));
    assert!(text.contains("Plant garlic cloves in autumn."));
}

#[test]
fn requests_deserialize_with_defaults() {
    let req: SearchRequest = serde_json::from_value(json!({ "query": "q", "format": "text" })).unwrap();
    assert_eq!(req.format, ResponseFormat::Text);
    assert!(req.k.is_none());
    let req: SearchRequest = serde_json::from_value(json!({ "query": "q" })).unwrap();
    assert_eq!(req.format, ResponseFormat::Json);
}
