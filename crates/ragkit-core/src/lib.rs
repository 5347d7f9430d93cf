#![deny(unused_imports)]

pub mod chunking;
pub mod config;
pub mod data_processor;
pub mod error;
pub mod filter;
pub mod retry;
pub mod traits;
pub mod types;

pub use chunking::{normalize_text, split_text, Chunker};
pub use config::{ChunkerConfig, Config, Settings};
pub use error::{Error, ErrorBody, ErrorKind, Result};
pub use filter::{Bounds, Condition, Filter};
pub use retry::RetryPolicy;
pub use traits::{EmbeddingProvider, FilterMode, GraphRetriever, RelevanceScorer, Reranker, VectorIndex};
pub use types::{
    Chunk, ChunkId, Document, GraphHit, GraphQuery, Meta, QueryInput, RetrievalCandidate, RetrievalQuery, SearchHit,
    SourceKind,
};
