//! Reference adapter for the graph retrieval contract: a fixed set of facts
//! matched against the query by term occurrence.

use std::path::Path;

use async_trait::async_trait;
use ragkit_core::{Error, GraphHit, GraphQuery, GraphRetriever, Meta, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphFact {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    /// Case-insensitive phrases; the fact matches when any occurs in the query.
    #[serde(default)]
    pub terms: Vec<String>,
    /// Domains the fact belongs to. Empty means every domain.
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub relevance: Option<f32>,
    #[serde(default)]
    pub metadata: Meta,
}

pub struct StaticGraphRetriever {
    facts: Vec<GraphFact>,
}

impl StaticGraphRetriever {
    pub fn new(facts: Vec<GraphFact>) -> Self {
        Self { facts }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let facts: Vec<GraphFact> =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid graph facts: {e}")))?;
        Ok(Self::new(facts))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read graph facts {}: {e}", path.display())))?;
        let retriever = Self::from_json_str(&raw)?;
        info!(facts = retriever.facts.len(), path = %path.display(), "graph facts loaded");
        Ok(retriever)
    }

    fn matches(fact: &GraphFact, query_lower: &str, q: &GraphQuery) -> bool {
        let in_domain = match &q.domain {
            Some(d) => fact.domains.is_empty() || fact.domains.iter().any(|fd| fd == d),
            None => true,
        };
        in_domain
            && fact.terms.iter().any(|t| !t.trim().is_empty() && query_lower.contains(&t.to_lowercase()))
            && q.filter.matches(&fact.metadata)
    }
}

#[async_trait]
impl GraphRetriever for StaticGraphRetriever {
    fn name(&self) -> &str { "static" }

    async fn query(&self, query: &GraphQuery) -> Result<Vec<GraphHit>> {
        let lower = query.text.to_lowercase();
        Ok(self
            .facts
            .iter()
            .filter(|f| Self::matches(f, &lower, query))
            .take(query.limit)
            .map(|f| GraphHit { id: f.id.clone(), text: f.text.clone(), metadata: f.metadata.clone(), relevance: f.relevance })
            .collect())
    }
}
