//! LanceDB connection helpers and SQL predicate construction.

use std::sync::Arc;

use arrow_array::RecordBatchIterator;
use lancedb::{connect, Connection, Table};
use ragkit_core::{Condition, Error, Filter, Result};
use serde_json::Value;

use crate::schema;

/// Classify a LanceDB failure. Only storage and IO trouble is reported as
/// [`Error::BackendUnavailable`], so retries never replay a bad predicate or
/// a schema conflict.
pub fn lance_err(e: lancedb::Error) -> Error {
    use lancedb::Error as L;
    match e {
        L::InvalidInput { message } => Error::InvalidQuery(message),
        L::InvalidTableName { .. } => Error::InvalidQuery(e.to_string()),
        L::ObjectStore { .. } | L::CreateDir { .. } | L::Runtime { .. } | L::Timeout { .. } => Error::backend("lance", e),
        L::Lance { source } => dataset_err(source),
        other => Error::Operation(format!("lance: {other}")),
    }
}

fn dataset_err(e: lance::Error) -> Error {
    use lance::Error as D;
    match e {
        D::InvalidInput { .. } => Error::InvalidQuery(e.to_string()),
        D::IO { .. }
        | D::CommitConflict { .. }
        | D::RetryableCommitConflict { .. }
        | D::TooMuchWriteContention { .. } => Error::backend("lance", e),
        other => Error::Operation(format!("lance: {other}")),
    }
}

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(lance_err)
}

/// Open `name`, creating it empty with `schema` when missing.
pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<Table> {
    let names = conn.table_names().execute().await.map_err(lance_err)?;
    if !names.iter().any(|n| n == name) {
        let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
        conn.create_table(name, Box::new(iter)).execute().await.map_err(lance_err)?;
    }
    conn.open_table(name).execute().await.map_err(lance_err)
}

pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub fn id_list_predicate(ids: &[String]) -> String {
    let quoted: Vec<String> = ids.iter().map(|id| quote(id)).collect();
    format!("{} IN ({})", schema::ID, quoted.join(", "))
}

/// A filter split into the SQL LanceDB can evaluate and the conditions that
/// must be checked against the decoded metadata afterwards.
#[derive(Debug, Default)]
pub struct SplitFilter {
    pub sql: Option<String>,
    pub residual: Filter,
}

pub fn split_filter(filter: Option<&Filter>) -> SplitFilter {
    let Some(filter) = filter else { return SplitFilter::default() };
    let mut clauses = Vec::new();
    let mut residual = Filter::default();
    for cond in &filter.conditions {
        match native_clause(cond) {
            Some(sql) => clauses.push(sql),
            None => residual.conditions.push(cond.clone()),
        }
    }
    SplitFilter { sql: (!clauses.is_empty()).then(|| clauses.join(" AND ")), residual }
}

fn native_clause(cond: &Condition) -> Option<String> {
    match cond {
        Condition::Eq { field, value } => match (field.as_str(), value) {
            (schema::DOC_ID | schema::DOCUMENT_HASH, Value::String(s)) => Some(format!("{field} = {}", quote(s))),
            (schema::CHUNK_INDEX | schema::CHUNK_COUNT, Value::Number(n)) => {
                n.as_i64().map(|n| format!("{field} = {n}"))
            }
            _ => None,
        },
        Condition::Range { field, bounds } if field == schema::CHUNK_INDEX || field == schema::CHUNK_COUNT => {
            let mut parts = Vec::new();
            for (op, bound) in [(">", bounds.gt), (">=", bounds.gte), ("<", bounds.lt), ("<=", bounds.lte)] {
                if let Some(b) = bound {
                    parts.push(format!("{field} {op} {b}"));
                }
            }
            (!parts.is_empty()).then(|| parts.join(" AND "))
        }
        Condition::Range { .. } => None,
    }
}
