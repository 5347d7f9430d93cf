//! Wire-level request and response shapes for the upstream API layer.

use std::fmt::Write as _;

use ragkit_core::{ErrorBody, Filter, Meta, RetrievalCandidate, RetrievalQuery, SourceKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::orchestrator::{RetrievalOrchestrator, RetrievalOutcome, SearchMetadata};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
    /// Flat JSON object of metadata conditions; see [`Filter::from_json`].
    #[serde(default)]
    pub filter: Option<Value>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub rerank: Option<bool>,
    #[serde(default)]
    pub rerank_top_n: Option<usize>,
    #[serde(default)]
    pub format: ResponseFormat,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub id: String,
    pub text: String,
    pub metadata: Meta,
    /// Absent for candidates only the graph path produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f32>,
    pub source: SourceKind,
}

impl From<RetrievalCandidate> for ResultItem {
    fn from(c: RetrievalCandidate) -> Self {
        Self {
            similarity_score: c.semantic_rank.map(|_| c.similarity_score),
            rerank_score: c.rerank_score,
            final_score: Some(c.final_score),
            id: c.id,
            text: c.text,
            metadata: c.metadata,
            source: c.source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<ResultItem>,
    pub count: usize,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub metadata: SearchMetadata,
}

impl From<RetrievalOutcome> for SearchResponse {
    fn from(outcome: RetrievalOutcome) -> Self {
        let results: Vec<ResultItem> = outcome.candidates.into_iter().map(ResultItem::from).collect();
        Self { count: results.len(), results, query: outcome.query, domain: outcome.domain, metadata: outcome.metadata }
    }
}

/// Run a wire request end to end. Every failure comes back as an [`ErrorBody`].
pub async fn execute(orchestrator: &RetrievalOrchestrator, request: SearchRequest) -> Result<SearchResponse, ErrorBody> {
    let filter = match &request.filter {
        Some(v) => Filter::from_json(v)?,
        None => Filter::default(),
    };
    let query = RetrievalQuery {
        text: request.query,
        k: request.k.unwrap_or(orchestrator.settings().default_k),
        filter,
        domain: request.domain,
        rerank: request.rerank,
        rerank_top_n: request.rerank_top_n,
    };
    let outcome = orchestrator.search(query).await?;
    Ok(outcome.into())
}

/// Human-readable rendering: one numbered block per result.
pub fn render_text(response: &SearchResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "query: {}", response.query);
    if let Some(d) = &response.domain {
        let _ = writeln!(out, "domain: {d}");
    }
    let m = &response.metadata;
    let _ = writeln!(
        out,
        "{} of {} results in {} ms{}{}",
        response.count,
        m.total_results,
        m.search_time_ms,
        if m.reranked { ", reranked" } else { "" },
        if m.degraded { ", degraded" } else { "" },
    );
    for e in &m.stage_errors {
        let _ = writeln!(out, "  ! {:?}: {}", e.stage, e.message);
    }
    for (i, r) in response.results.iter().enumerate() {
        let score = r.final_score.unwrap_or_default();
        let _ = writeln!(out, "\n{}. [{:.4}] {} ({:?})", i + 1, score, r.id, r.source);
        if let Some(s) = r.similarity_score {
            let _ = write!(out, "   similarity={s:.4}");
            if let Some(rr) = r.rerank_score {
                let _ = write!(out, " rerank={rr:.4}");
            }
            out.push('\n');
        } else if let Some(rr) = r.rerank_score {
            let _ = writeln!(out, "   rerank={rr:.4}");
        }
        for line in r.text.lines() {
            let _ = writeln!(out, "   {line}");
        }
    }
    out
}

/// Serialize in the requested format.
pub fn render(response: &SearchResponse, format: ResponseFormat) -> Result<String, ErrorBody> {
    match format {
        ResponseFormat::Json => serde_json::to_string_pretty(response).map_err(|e| ErrorBody {
            kind: ragkit_core::ErrorKind::Operation,
            message: format!("failed to serialize response: {e}"),
        }),
        ResponseFormat::Text => Ok(render_text(response)),
    }
}
