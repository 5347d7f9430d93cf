pub mod fusion;
pub mod graph;
pub mod orchestrator;
pub mod pool;
pub mod postprocess;
pub mod rerank;
pub mod response;

pub use fusion::FusionEngine;
pub use graph::{GraphFact, StaticGraphRetriever};
pub use orchestrator::{OrchestratorBuilder, RetrievalOrchestrator, RetrievalOutcome, SearchMetadata, Stage, StageError};
pub use rerank::{build_reranker, EmbeddingSimilarityScorer, EnsembleReranker, KeywordOverlapScorer, ScorerReranker};
pub use response::{execute, render, render_text, ResponseFormat, ResultItem, SearchRequest, SearchResponse};
