//! SQLite-backed embedding index with exact cosine ranking.
//!
//! Vectors are stored as little-endian `f32` blobs next to a JSON payload.
//! Each project records the one dimension and model its vectors were made
//! with; a batch from a different model or dimension starts the index over.

use std::collections::BTreeSet;
use std::path::PathBuf;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::errors::{TreeRootsError, TreeRootsResult};
use crate::models::{EmbeddingPayload, EmbeddingRecord, SearchHit, UpsertOutcome};
use crate::store::schema;
use crate::store::EmbeddingIndex;

pub(crate) fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(vector));
    for &value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

pub(crate) fn decode_vector(blob: &[u8], dimension: usize) -> TreeRootsResult<Vec<f32>> {
    if blob.len() != dimension * std::mem::size_of::<f32>() {
        return Err(TreeRootsError::Query(format!(
            "stored vector has {} bytes, expected {}",
            blob.len(),
            dimension * std::mem::size_of::<f32>()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Cosine similarity in `f64`. `None` for empty, mismatched, zero, or non-finite vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if !denom.is_finite() || denom <= f64::EPSILON {
        return None;
    }
    let score = dot / denom;
    score.is_finite().then_some(score)
}

/// Drop non-finite scores, sort by score descending then id ascending, and keep `top_k`.
pub fn rank_hits(mut hits: Vec<SearchHit>, top_k: usize) -> Vec<SearchHit> {
    hits.retain(|hit| hit.score.is_finite());
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    hits.truncate(top_k);
    hits
}

#[derive(Debug, Clone)]
pub struct SqliteEmbeddingIndex {
    db_path: PathBuf,
    project: String,
}

impl SqliteEmbeddingIndex {
    pub fn open(db_path: impl Into<PathBuf>, project: impl Into<String>) -> TreeRootsResult<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let index = Self {
            db_path,
            project: project.into(),
        };
        let conn = index.connect()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        schema::init_schema(&conn, schema::VECTOR_SCHEMA_STATEMENTS)?;
        Ok(index)
    }

    fn connect(&self) -> TreeRootsResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        Ok(conn)
    }

    fn meta(&self, conn: &Connection) -> TreeRootsResult<Option<(usize, String)>> {
        let meta = conn
            .query_row(
                "SELECT dimension, model_id FROM index_meta WHERE project = ?1;",
                params![self.project],
                |row| Ok((row.get::<_, i64>(0)? as usize, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(meta)
    }
}

impl EmbeddingIndex for SqliteEmbeddingIndex {
    fn upsert(&self, model_id: &str, records: &[EmbeddingRecord]) -> TreeRootsResult<UpsertOutcome> {
        let Some(first) = records.first() else {
            return Ok(UpsertOutcome::default());
        };
        let dimension = first.vector.len();
        if dimension == 0 {
            return Err(TreeRootsError::InvalidInput(format!(
                "embedding for {} is empty",
                first.id
            )));
        }
        if let Some(odd) = records.iter().find(|r| r.vector.len() != dimension) {
            return Err(TreeRootsError::DimensionMismatch {
                expected: dimension,
                actual: odd.vector.len(),
            });
        }

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut recreated = false;
        match self.meta(&tx)? {
            Some((dim, model)) if dim == dimension && model == model_id => {}
            Some((dim, model)) => {
                warn!(
                    project = %self.project,
                    old_dimension = dim,
                    old_model = %model,
                    new_dimension = dimension,
                    new_model = model_id,
                    "embedding model changed, recreating vector index"
                );
                tx.execute(
                    "DELETE FROM embeddings WHERE project = ?1;",
                    params![self.project],
                )?;
                recreated = true;
            }
            None => {
                tx.execute(
                    "DELETE FROM embeddings WHERE project = ?1;",
                    params![self.project],
                )?;
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO index_meta (project, dimension, model_id) \
             VALUES (?1, ?2, ?3);",
            params![self.project, dimension as i64, model_id],
        )?;

        {
            let mut insert = tx.prepare(
                "INSERT OR REPLACE INTO embeddings \
                     (project, id, file_path, dimension, vector, payload) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            )?;
            for record in records {
                insert.execute(params![
                    self.project,
                    record.id,
                    record.payload.file_path,
                    dimension as i64,
                    encode_vector(&record.vector),
                    serde_json::to_string(&record.payload)?,
                ])?;
            }
        }
        tx.commit()?;

        debug!(written = records.len(), dimension, "embeddings upserted");
        Ok(UpsertOutcome {
            written: records.len(),
            recreated,
        })
    }

    fn search(&self, query: &[f32], top_k: usize) -> TreeRootsResult<Vec<SearchHit>> {
        let conn = self.connect()?;
        let Some((dimension, _)) = self.meta(&conn)? else {
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(TreeRootsError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut stmt =
            conn.prepare("SELECT id, vector, payload FROM embeddings WHERE project = ?1;")?;
        let rows = stmt
            .query_map(params![self.project], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut hits = Vec::with_capacity(rows.len());
        for (id, blob, payload) in rows {
            let vector = decode_vector(&blob, dimension)?;
            let Some(score) = cosine_similarity(query, &vector) else {
                continue;
            };
            let payload: EmbeddingPayload = serde_json::from_str(&payload)?;
            hits.push(SearchHit { id, score, payload });
        }
        Ok(rank_hits(hits, top_k))
    }

    fn delete_ids(&self, ids: &[String]) -> TreeRootsResult<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM embeddings WHERE project = ?1 AND id = ?2;")?;
            for id in ids {
                removed += stmt.execute(params![self.project, id])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn delete_file(&self, path: &str) -> TreeRootsResult<usize> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM embeddings WHERE project = ?1 AND file_path = ?2;",
            params![self.project, path],
        )?;
        Ok(removed)
    }

    fn ids(&self) -> TreeRootsResult<BTreeSet<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id FROM embeddings WHERE project = ?1;")?;
        let ids = stmt
            .query_map(params![self.project], |row| row.get(0))?
            .collect::<Result<BTreeSet<String>, _>>()?;
        Ok(ids)
    }

    fn len(&self) -> TreeRootsResult<usize> {
        let conn = self.connect()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE project = ?1;",
            params![self.project],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    fn dimension(&self) -> TreeRootsResult<Option<(usize, String)>> {
        let conn = self.connect()?;
        self.meta(&conn)
    }

    fn clear(&self) -> TreeRootsResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM embeddings WHERE project = ?1;",
            params![self.project],
        )?;
        conn.execute(
            "DELETE FROM index_meta WHERE project = ?1;",
            params![self.project],
        )?;
        Ok(())
    }
}
