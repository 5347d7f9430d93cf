//! LanceDB-backed index.
//!
//! Conditions on `doc_id`, `document_hash`, `chunk_index` and `chunk_count`
//! are pushed down as SQL. Any other metadata condition is applied to the
//! returned page after over-fetching `k * overfetch` rows, so a selective
//! post-filtered query may return fewer than `k` hits.

use std::sync::Arc;

use async_trait::async_trait;
use arrow_array::{RecordBatch, RecordBatchIterator};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use ragkit_core::{
    Chunk, ChunkId, EmbeddingProvider, Error, Filter, FilterMode, QueryInput, Result, SearchHit, SourceKind,
    VectorIndex,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::schema::{self, build_arrow_schema, chunks_to_record_batch, rows_from_batch, Row};
use crate::similarity::from_cosine_distance;
use crate::table::{ensure_table, id_list_predicate, lance_err, open_db, split_filter};
use crate::{check_dim, embed_query, resolve_embeddings};

const DEFAULT_OVERFETCH: usize = 4;

pub struct LanceVectorIndex {
    _db: Connection,
    table: Table,
    dim: usize,
    overfetch: usize,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    write_lock: Mutex<()>,
}

impl LanceVectorIndex {
    pub async fn open(uri: &str, table_name: &str, dim: usize, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Result<Self> {
        let db = open_db(uri).await?;
        let table = ensure_table(&db, table_name, build_arrow_schema(dim)).await?;
        let existing = table.schema().await.map_err(lance_err)?;
        if let Some(actual) = schema::vector_dim(&existing) {
            if actual != dim {
                return Err(Error::DimensionMismatch { expected: dim, actual });
            }
        }
        Ok(Self { _db: db, table, dim, overfetch: DEFAULT_OVERFETCH, embedder, write_lock: Mutex::new(()) })
    }

    pub fn with_overfetch(mut self, overfetch: usize) -> Self {
        self.overfetch = overfetch.max(1);
        self
    }

    async fn collect_rows(stream: impl futures::Stream<Item = lancedb::Result<RecordBatch>>) -> Result<Vec<Row>> {
        let batches: Vec<RecordBatch> = stream.try_collect().await.map_err(lance_err)?;
        let mut rows = Vec::new();
        for batch in &batches {
            rows.extend(rows_from_batch(batch)?);
        }
        Ok(rows)
    }

    async fn scan(&self, predicate: Option<String>) -> Result<Vec<Row>> {
        let mut query = self.table.query();
        if let Some(p) = predicate {
            query = query.only_if(p);
        }
        let stream = query.execute().await.map_err(lance_err)?;
        Self::collect_rows(stream).await
    }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    fn backend(&self) -> &'static str { "lance" }

    fn dim(&self) -> usize { self.dim }

    fn filter_mode(&self) -> FilterMode { FilterMode::PostFilter }

    async fn add(&self, chunks: &[Chunk], embeddings: Option<&[Vec<f32>]>) -> Result<Vec<ChunkId>> {
        if chunks.is_empty() {
            return Ok(vec![]);
        }
        let vectors = resolve_embeddings(chunks, embeddings, self.embedder.as_ref(), self.dim).await?;
        let batch = chunks_to_record_batch(chunks, &vectors, self.dim)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));

        let _guard = self.write_lock.lock().await;
        // Upsert keyed on id so re-ingesting a chunk replaces it.
        let mut mi = self.table.merge_insert(&[schema::ID]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await.map_err(lance_err)?;
        debug!(added = chunks.len(), "lance index add");
        Ok(chunks.iter().map(|c| c.id.clone()).collect())
    }

    async fn query(&self, input: QueryInput, k: usize, filter: Option<&Filter>) -> Result<Vec<SearchHit>> {
        let vector = match input {
            QueryInput::Vector(v) => {
                check_dim(self.dim, &v)?;
                v
            }
            QueryInput::Text(text) => embed_query(self.embedder.as_ref(), text, self.dim).await?,
        };
        if k == 0 {
            return Ok(vec![]);
        }

        let split = split_filter(filter);
        let fetch = if split.residual.is_empty() { k } else { k.saturating_mul(self.overfetch) };
        let mut query = self
            .table
            .vector_search(vector)
            .map_err(lance_err)?
            .distance_type(DistanceType::Cosine)
            .limit(fetch);
        if let Some(sql) = split.sql {
            query = query.only_if(sql);
        }
        let stream = query.execute().await.map_err(lance_err)?;
        let rows = Self::collect_rows(stream).await?;

        let mut hits: Vec<SearchHit> = rows
            .into_iter()
            .filter(|r| split.residual.matches(&r.chunk.metadata))
            .map(|r| SearchHit {
                score: from_cosine_distance(r.distance.unwrap_or(2.0)),
                id: r.chunk.id,
                text: r.chunk.text,
                metadata: r.chunk.metadata,
                source: SourceKind::Vector,
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete(&self, ids: &[ChunkId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let predicate = id_list_predicate(ids);
        let _guard = self.write_lock.lock().await;
        let present = self.table.count_rows(Some(predicate.clone())).await.map_err(lance_err)?;
        if present > 0 {
            self.table.delete(&predicate).await.map_err(lance_err)?;
        }
        Ok(present)
    }

    async fn get(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let rows = self.scan(Some(id_list_predicate(ids))).await?;
        let mut by_id: std::collections::HashMap<String, Chunk> =
            rows.into_iter().map(|r| (r.chunk.id.clone(), r.chunk)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn count(&self) -> Result<usize> {
        self.table.count_rows(None).await.map_err(lance_err)
    }

    async fn ids_matching(&self, filter: &Filter) -> Result<Vec<ChunkId>> {
        let split = split_filter(Some(filter));
        let rows = self.scan(split.sql).await?;
        let mut ids: Vec<ChunkId> =
            rows.into_iter().filter(|r| split.residual.matches(&r.chunk.metadata)).map(|r| r.chunk.id).collect();
        ids.sort();
        Ok(ids)
    }
}
