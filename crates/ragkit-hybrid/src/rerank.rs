//! Rerankers built from pairwise relevance scorers.
//!
//! [`ScorerReranker`] wraps one scorer; [`EnsembleReranker`] combines several
//! with weights that are renormalised to sum to one when it is constructed.
//! Both score in batches whose output order equals input order, keep the
//! pre-rerank score in `original_score`, and never call a scorer for an
//! empty candidate list.

use std::collections::HashSet;
use std::sync::Arc;

use ragkit_core::config::{expand_path, RerankerSettings, ScorerKind};
use ragkit_core::{EmbeddingProvider, Error, RelevanceScorer, Reranker, Result, RetrievalCandidate};
use ragkit_embed::CrossEncoderScorer;
use ragkit_vector::similarity::{cosine, from_cosine};
use tracing::{debug, info};

const DEFAULT_BATCH: usize = 16;
const DEFAULT_CROSS_ENCODER_LEN: usize = 512;

/// Fraction of distinct query terms found in the passage (case-insensitive).
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordOverlapScorer;

impl RelevanceScorer for KeywordOverlapScorer {
    fn name(&self) -> &str { "keyword" }

    fn score_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(vec![0.0; passages.len()]);
        }
        Ok(passages
            .iter()
            .map(|p| {
                let lower = p.to_lowercase();
                terms.iter().filter(|t| lower.contains(t.as_str())).count() as f32 / terms.len() as f32
            })
            .collect())
    }
}

pub(crate) fn query_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Bi-encoder cosine between query and passage, mapped to `[0, 1]`.
pub struct EmbeddingSimilarityScorer {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingSimilarityScorer {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }
}

impl RelevanceScorer for EmbeddingSimilarityScorer {
    fn name(&self) -> &str { "embedding" }

    fn score_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let q = self.embedder.embed(query)?;
        let texts: Vec<String> = passages.iter().map(|p| (*p).to_string()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        Ok(vectors.iter().map(|v| from_cosine(cosine(&q, v))).collect())
    }
}

pub struct ScorerReranker {
    scorer: Arc<dyn RelevanceScorer>,
    batch_size: usize,
}

impl ScorerReranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>, batch_size: usize) -> Self {
        Self { scorer, batch_size: batch_size.max(1) }
    }
}

impl Reranker for ScorerReranker {
    fn name(&self) -> &str { self.scorer.name() }

    fn rerank(&self, query: &str, candidates: Vec<RetrievalCandidate>, top_n: Option<usize>) -> Result<Vec<RetrievalCandidate>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }
        let scores = score_all(self.scorer.as_ref(), query, &candidates, self.batch_size)?;
        Ok(apply_scores(candidates, &scores, top_n))
    }
}

pub struct EnsembleReranker {
    members: Vec<(Arc<dyn RelevanceScorer>, f32)>,
    normalize: bool,
    batch_size: usize,
    name: String,
}

impl EnsembleReranker {
    /// Fails with [`Error::Config`] for an empty member list or weights that
    /// are negative or sum to zero.
    pub fn new(members: Vec<(Arc<dyn RelevanceScorer>, f32)>, normalize: bool, batch_size: usize) -> Result<Self> {
        if members.is_empty() {
            return Err(Error::Config("ensemble reranker needs at least one scorer".to_string()));
        }
        if members.iter().any(|(_, w)| !w.is_finite() || *w < 0.0) {
            return Err(Error::Config("ensemble weights must be non-negative numbers".to_string()));
        }
        let sum: f32 = members.iter().map(|(_, w)| w).sum();
        if sum <= 0.0 {
            return Err(Error::Config("ensemble weights must not all be zero".to_string()));
        }
        let members: Vec<(Arc<dyn RelevanceScorer>, f32)> = if (sum - 1.0).abs() > 1e-6 {
            let before: Vec<f32> = members.iter().map(|(_, w)| *w).collect();
            let members: Vec<_> = members.into_iter().map(|(s, w)| (s, w / sum)).collect();
            let after: Vec<f32> = members.iter().map(|(_, w)| *w).collect();
            info!(?before, ?after, "renormalized ensemble weights");
            members
        } else {
            members
        };
        let name = format!("ensemble[{}]", members.iter().map(|(s, _)| s.name()).collect::<Vec<_>>().join(","));
        Ok(Self { members, normalize, batch_size: batch_size.max(1), name })
    }

    pub fn weights(&self) -> Vec<f32> {
        self.members.iter().map(|(_, w)| *w).collect()
    }
}

impl Reranker for EnsembleReranker {
    fn name(&self) -> &str { &self.name }

    fn rerank(&self, query: &str, candidates: Vec<RetrievalCandidate>, top_n: Option<usize>) -> Result<Vec<RetrievalCandidate>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }
        let mut combined = vec![0f32; candidates.len()];
        for (scorer, weight) in &self.members {
            let mut scores = score_all(scorer.as_ref(), query, &candidates, self.batch_size)?;
            if self.normalize {
                min_max_normalize(&mut scores);
            }
            for (total, s) in combined.iter_mut().zip(&scores) {
                *total += weight * s;
            }
        }
        Ok(apply_scores(candidates, &combined, top_n))
    }
}

fn score_all(scorer: &dyn RelevanceScorer, query: &str, candidates: &[RetrievalCandidate], batch_size: usize) -> Result<Vec<f32>> {
    let mut scores = Vec::with_capacity(candidates.len());
    for batch in candidates.chunks(batch_size) {
        let passages: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let out = scorer.score_batch(query, &passages).map_err(|e| match e {
            Error::RerankFailure { .. } => e,
            other => Error::rerank(scorer.name(), other),
        })?;
        if out.len() != passages.len() {
            return Err(Error::rerank(scorer.name(), format!("{} scores for {} passages", out.len(), passages.len())));
        }
        if out.iter().any(|s| !s.is_finite()) {
            return Err(Error::rerank(scorer.name(), "non-finite score"));
        }
        scores.extend(out);
    }
    debug!(scorer = scorer.name(), n = scores.len(), "scored candidates");
    Ok(scores)
}

/// Rescale to `[0, 1]`. All-equal scores are left unchanged.
pub fn min_max_normalize(scores: &mut [f32]) {
    let (min, max) = scores.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let range = max - min;
    if !range.is_finite() || range <= 1e-9 {
        return;
    }
    for s in scores.iter_mut() {
        *s = (*s - min) / range;
    }
}

fn apply_scores(mut candidates: Vec<RetrievalCandidate>, scores: &[f32], top_n: Option<usize>) -> Vec<RetrievalCandidate> {
    for (c, &s) in candidates.iter_mut().zip(scores) {
        c.original_score = Some(c.final_score);
        c.rerank_score = Some(s);
        c.final_score = s;
    }
    // Stable: equal rerank scores keep their fused order.
    candidates.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
    if let Some(n) = top_n {
        candidates.truncate(n);
    }
    candidates
}

/// Build the configured reranker, or `None` when reranking is disabled.
pub fn build_reranker(
    settings: &RerankerSettings,
    embedder: Arc<dyn EmbeddingProvider>,
    prefer_metal: bool,
) -> Result<Option<Arc<dyn Reranker>>> {
    if !settings.enabled || settings.members.is_empty() {
        return Ok(None);
    }
    let mut members: Vec<(Arc<dyn RelevanceScorer>, f32)> = Vec::with_capacity(settings.members.len());
    for spec in &settings.members {
        let scorer: Arc<dyn RelevanceScorer> = match spec.kind {
            ScorerKind::Keyword => Arc::new(KeywordOverlapScorer),
            ScorerKind::Embedding => Arc::new(EmbeddingSimilarityScorer::new(Arc::clone(&embedder))),
            ScorerKind::CrossEncoder => {
                let dir = spec
                    .model_dir
                    .as_deref()
                    .ok_or_else(|| Error::Config("cross_encoder scorer needs model_dir".to_string()))?;
                let max_len = spec.max_len.unwrap_or(DEFAULT_CROSS_ENCODER_LEN);
                Arc::new(CrossEncoderScorer::load(&expand_path(dir), max_len, prefer_metal)?)
            }
        };
        members.push((scorer, spec.weight));
    }
    let batch_size = if settings.batch_size == 0 { DEFAULT_BATCH } else { settings.batch_size };
    let reranker: Arc<dyn Reranker> = match members.len() {
        1 => {
            let (scorer, _) = members.remove(0);
            Arc::new(ScorerReranker::new(scorer, batch_size))
        }
        _ => Arc::new(EnsembleReranker::new(members, settings.normalize, batch_size)?),
    };
    info!(reranker = reranker.name(), "reranker ready");
    Ok(Some(reranker))
}
