use std::path::PathBuf;

use ragkit_core::config::EmbeddingSettings;
use ragkit_core::{EmbeddingProvider, RelevanceScorer};
use ragkit_embed::{load_embedder, CrossEncoderScorer, HashEmbedder};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
fn fake_embedder_shapes_and_determinism() {
    let settings = EmbeddingSettings { use_fake: true, ..EmbeddingSettings::default() };
    let embedder = load_embedder(&settings).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 1024, "embedding dim is 1024");
    assert_eq!(embedder.model_id(), "hash:d1024");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[test]
fn hash_embedder_ignores_case_and_punctuation() {
    let e = HashEmbedder::new(64);
    let a = e.embed("Compost, heat!").unwrap();
    let b = e.embed("compost heat").unwrap();
    assert!((cosine(&a, &b) - 1.0).abs() < 1e-5);
}

#[test]
fn hash_embedder_shared_tokens_are_closer() {
    let e = HashEmbedder::new(256);
    let q = e.embed("tomato blight treatment").unwrap();
    let near = e.embed("treatment for tomato blight in humid summers").unwrap();
    let far = e.embed("sharpening a chisel on a whetstone").unwrap();
    assert!(cosine(&q, &near) > cosine(&q, &far));
}

#[test]
fn missing_model_dir_is_config_error() {
    let settings = EmbeddingSettings {
        use_fake: false,
        model_dir: "/definitely/not/a/model/dir".to_string(),
        ..EmbeddingSettings::default()
    };
    assert!(matches!(load_embedder(&settings), Err(ragkit_core::Error::Config(_))));
}

fn model_dir(var: &str) -> Option<PathBuf> {
    std::env::var(var).ok().map(PathBuf::from).filter(|p| p.is_dir())
}

#[test]
#[ignore = "requires APP_MODEL_DIR with bge-m3 weights"]
fn bge_embeddings_are_normalized() {
    let Some(dir) = model_dir("APP_MODEL_DIR") else { return };
    let settings = EmbeddingSettings {
        model_dir: dir.to_string_lossy().to_string(),
        prefer_metal: false,
        ..EmbeddingSettings::default()
    };
    let embedder = load_embedder(&settings).unwrap();
    let embs = embedder.embed_batch(&["rain barrels".to_string(), "water catchment".to_string()]).unwrap();
    assert_eq!(embs.len(), 2);
    for v in &embs {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }
}

#[test]
#[ignore = "requires APP_RERANKER_DIR with bge-reranker weights"]
fn cross_encoder_prefers_relevant_passage() {
    let Some(dir) = model_dir("APP_RERANKER_DIR") else { return };
    let scorer = CrossEncoderScorer::load(&dir, 256, false).unwrap();
    let scores = scorer
        .score_batch("how do I store potatoes", &["Keep potatoes cool and dark.", "Chickens need grit."])
        .unwrap();
    assert_eq!(scores.len(), 2);
    assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    assert!(scores[0] > scores[1]);
}
