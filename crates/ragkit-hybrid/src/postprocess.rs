use std::collections::HashSet;

use ragkit_core::RetrievalCandidate;

/// Drop candidates whose fused score is below `min_score`.
pub fn apply_min_score(candidates: &mut Vec<RetrievalCandidate>, min_score: f32) {
    if min_score > 0.0 {
        candidates.retain(|c| c.final_score >= min_score);
    }
}

/// Drop near-duplicates: a candidate is skipped when its token-set Jaccard
/// similarity to an already kept candidate exceeds `threshold`. Lists of three
/// or fewer are returned unchanged.
pub fn diversify(candidates: Vec<RetrievalCandidate>, threshold: f32) -> Vec<RetrievalCandidate> {
    if candidates.len() <= 3 {
        return candidates;
    }
    let mut kept: Vec<(RetrievalCandidate, HashSet<String>)> = Vec::with_capacity(candidates.len());
    for c in candidates {
        let tokens = token_set(&c.text);
        if kept.iter().any(|(_, seen)| jaccard(seen, &tokens) > threshold) {
            continue;
        }
        kept.push((c, tokens));
    }
    kept.into_iter().map(|(c, _)| c).collect()
}

fn token_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}
