//! Merges vector hits and graph hits into one deduplicated, scored list.

use std::cmp::Ordering;
use std::collections::HashMap;

use ragkit_core::config::{FusionSettings, FusionWeightProfile};
use ragkit_core::{GraphHit, Result, RetrievalCandidate, SearchHit, SourceKind};

/// Score a graph hit contributes when the backend gives no relevance of its own.
pub const GRAPH_PRESENCE_SCORE: f32 = 1.0;

pub struct FusionEngine {
    default: FusionWeightProfile,
    profiles: HashMap<String, FusionWeightProfile>,
}

impl FusionEngine {
    pub fn new(settings: &FusionSettings) -> Result<Self> {
        settings.validate()?;
        let profiles = settings.profiles.iter().map(|p| (p.domain.clone(), p.clone())).collect();
        Ok(Self { default: settings.default.clone(), profiles })
    }

    /// The profile registered for `domain`, or the default one.
    pub fn profile_for(&self, domain: Option<&str>) -> &FusionWeightProfile {
        domain.and_then(|d| self.profiles.get(d)).unwrap_or(&self.default)
    }

    /// Weighted merge of both paths, keyed by id.
    ///
    /// A repeated vector hit keeps its first (best ranked) occurrence; repeated
    /// graph hits keep the highest graph score. Graph metadata only fills keys
    /// the vector hit does not already carry.
    pub fn merge(&self, semantic: &[SearchHit], graph: &[GraphHit], profile: &FusionWeightProfile) -> Vec<RetrievalCandidate> {
        let (w_sem, w_graph) = profile.normalized_weights();
        let mut by_id = collect_semantic(semantic);

        for hit in graph {
            let score = graph_score(hit);
            match by_id.get_mut(&hit.id) {
                Some(c) => {
                    c.graph_score = c.graph_score.max(score);
                    if c.semantic_rank.is_some() {
                        c.source = SourceKind::Hybrid;
                    }
                    for (k, v) in &hit.metadata {
                        c.metadata.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                    if c.text.is_empty() {
                        if let Some(text) = &hit.text {
                            c.text = text.clone();
                        }
                    }
                }
                None => {
                    by_id.insert(
                        hit.id.clone(),
                        RetrievalCandidate {
                            id: hit.id.clone(),
                            text: hit.text.clone().unwrap_or_default(),
                            metadata: hit.metadata.clone(),
                            similarity_score: 0.0,
                            graph_score: score,
                            rerank_score: None,
                            original_score: None,
                            final_score: 0.0,
                            semantic_rank: None,
                            source: SourceKind::Graph,
                        },
                    );
                }
            }
        }

        let mut out: Vec<RetrievalCandidate> = by_id.into_values().collect();
        for c in &mut out {
            c.final_score = c.similarity_score * w_sem + c.graph_score * w_graph;
        }
        finish(out, profile)
    }

    /// Candidates from the vector path alone, scored by raw similarity. Used
    /// when the graph path is disabled for the domain or did not complete.
    pub fn vector_only(&self, semantic: &[SearchHit], profile: &FusionWeightProfile) -> Vec<RetrievalCandidate> {
        finish(collect_semantic(semantic).into_values().collect(), profile)
    }
}

fn collect_semantic(semantic: &[SearchHit]) -> HashMap<String, RetrievalCandidate> {
    let mut by_id = HashMap::with_capacity(semantic.len());
    for (rank, hit) in semantic.iter().enumerate() {
        by_id.entry(hit.id.clone()).or_insert_with(|| RetrievalCandidate::from_hit(hit, rank));
    }
    by_id
}

fn graph_score(hit: &GraphHit) -> f32 {
    hit.relevance.filter(|r| r.is_finite()).map_or(GRAPH_PRESENCE_SCORE, |r| r.clamp(0.0, 1.0))
}

fn finish(mut out: Vec<RetrievalCandidate>, profile: &FusionWeightProfile) -> Vec<RetrievalCandidate> {
    if let Some(boost) = &profile.confidence_boost {
        for c in &mut out {
            let confident = c.metadata.get(&boost.field).and_then(|v| v.as_f64()).is_some_and(|v| v >= boost.threshold);
            if confident {
                c.final_score += boost.boost;
            }
        }
    }
    out.sort_by(rank_order);
    out
}

/// `final_score` descending, then vector rank (unranked last), then id.
pub fn rank_order(a: &RetrievalCandidate, b: &RetrievalCandidate) -> Ordering {
    b.final_score
        .total_cmp(&a.final_score)
        .then_with(|| match (a.semantic_rank, b.semantic_rank) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.id.cmp(&b.id))
}
