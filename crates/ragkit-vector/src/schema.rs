//! Arrow layout of the `chunks` table and conversions to and from [`Chunk`].

use std::sync::Arc;

use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use ragkit_core::{Chunk, Error, Meta, Result};

pub const ID: &str = "id";
pub const DOC_ID: &str = "doc_id";
pub const TEXT: &str = "text";
pub const CHUNK_INDEX: &str = "chunk_index";
pub const CHUNK_COUNT: &str = "chunk_count";
pub const DOCUMENT_HASH: &str = "document_hash";
/// Full chunk metadata serialised as a JSON object.
pub const METADATA: &str = "metadata";
pub const VECTOR: &str = "vector";
/// Added by LanceDB to vector search results.
pub const DISTANCE: &str = "_distance";

pub fn build_arrow_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(ID, DataType::Utf8, false),
        Field::new(DOC_ID, DataType::Utf8, false),
        Field::new(TEXT, DataType::Utf8, false),
        Field::new(CHUNK_INDEX, DataType::Int32, false),
        Field::new(CHUNK_COUNT, DataType::Int32, false),
        Field::new(DOCUMENT_HASH, DataType::Utf8, true),
        Field::new(METADATA, DataType::Utf8, false),
        Field::new(VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32), true),
    ]))
}

/// Vector width declared by an existing table schema, if it has a vector column.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
    match schema.field_with_name(VECTOR).ok()?.data_type() {
        DataType::FixedSizeList(_, n) => Some(*n as usize),
        _ => None,
    }
}

pub fn chunks_to_record_batch(chunks: &[Chunk], vectors: &[Vec<f32>], dim: usize) -> Result<RecordBatch> {
    let mut ids = Vec::with_capacity(chunks.len());
    let mut doc_ids = Vec::with_capacity(chunks.len());
    let mut texts = Vec::with_capacity(chunks.len());
    let mut chunk_indices = Vec::with_capacity(chunks.len());
    let mut chunk_counts = Vec::with_capacity(chunks.len());
    let mut hashes = Vec::with_capacity(chunks.len());
    let mut metadata = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        ids.push(chunk.id.clone());
        doc_ids.push(chunk.doc_id.clone());
        texts.push(chunk.text.clone());
        chunk_indices.push(chunk.chunk_index as i32);
        chunk_counts.push(chunk.chunk_count as i32);
        hashes.push(
            chunk.metadata.get(ragkit_core::types::meta_keys::DOCUMENT_HASH).and_then(|v| v.as_str()).map(str::to_string),
        );
        metadata.push(serde_json::to_string(&chunk.metadata).map_err(|e| Error::Operation(e.to_string()))?);
    }
    let vectors = vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));

    RecordBatch::try_new(
        build_arrow_schema(dim),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(doc_ids)),
            Arc::new(StringArray::from(texts)),
            Arc::new(Int32Array::from(chunk_indices)),
            Arc::new(Int32Array::from(chunk_counts)),
            Arc::new(StringArray::from(hashes)),
            Arc::new(StringArray::from(metadata)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim as i32)),
        ],
    )
    .map_err(|e| Error::Operation(format!("record batch: {e}")))
}

/// One decoded row. `distance` is set for vector search results and
/// `chunk.embedding` only when the vector column was selected.
pub struct Row {
    pub chunk: Chunk,
    pub distance: Option<f32>,
}

pub fn rows_from_batch(batch: &RecordBatch) -> Result<Vec<Row>> {
    let ids = string_col(batch, ID)?;
    let doc_ids = string_col(batch, DOC_ID)?;
    let texts = string_col(batch, TEXT)?;
    let chunk_indices = int_col(batch, CHUNK_INDEX)?;
    let chunk_counts = int_col(batch, CHUNK_COUNT)?;
    let metadata = string_col(batch, METADATA)?;
    let distances = batch.column_by_name(DISTANCE).and_then(|c| c.as_any().downcast_ref::<Float32Array>());
    let vectors = batch.column_by_name(VECTOR).and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>());

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let meta: Meta = serde_json::from_str(metadata.value(i))
            .map_err(|e| Error::Operation(format!("corrupt metadata for {}: {e}", ids.value(i))))?;
        let embedding = vectors.filter(|v| v.is_valid(i)).and_then(|v| {
            v.value(i).as_any().downcast_ref::<Float32Array>().map(|values| values.values().to_vec())
        });
        rows.push(Row {
            chunk: Chunk {
                id: ids.value(i).to_string(),
                text: texts.value(i).to_string(),
                doc_id: doc_ids.value(i).to_string(),
                chunk_index: chunk_indices.value(i).max(0) as usize,
                chunk_count: chunk_counts.value(i).max(0) as usize,
                metadata: meta,
                embedding,
            },
            distance: distances.filter(|d| d.is_valid(i)).map(|d| d.value(i)),
        });
    }
    Ok(rows)
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Operation(format!("column '{name}' missing or not utf8")))
}

fn int_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| Error::Operation(format!("column '{name}' missing or not int32")))
}
