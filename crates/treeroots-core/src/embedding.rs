//! Embedding model collaborators.
//!
//! [`HashingEmbedder`] is deterministic and offline: identifier tokens are
//! feature-hashed into a fixed number of buckets. [`HttpEmbedder`] calls an
//! OpenAI-compatible `/embeddings` endpoint.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::config::EmbeddingEndpoint;
use crate::errors::{TreeRootsError, TreeRootsResult};

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*|[0-9]+").unwrap());

pub trait Embedder: Send + Sync {
    /// Stable identity of the model. Vectors from different identities are
    /// never mixed in one index.
    fn model_id(&self) -> &str;

    /// Embed every text, returning vectors in input order.
    fn embed_batch(&self, texts: &[String]) -> TreeRootsResult<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> TreeRootsResult<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        vectors.pop().ok_or_else(|| TreeRootsError::EmbeddingGenerationFailed {
            retryable: false,
            message: "embedding response was empty".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Hashing embedder
// ---------------------------------------------------------------------------

/// Split an identifier on `_` and lower-to-upper camel-case boundaries.
fn identifier_parts(token: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in token.chars() {
        if c == '_' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Lowercased features of `text`: whole identifiers plus their parts.
pub fn features(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for m in TOKEN_RE.find_iter(text) {
        let whole = m.as_str().to_lowercase();
        let parts = identifier_parts(m.as_str());
        if parts.len() > 1 {
            out.extend(parts);
        }
        out.push(whole);
    }
    out
}

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("hashing-crc32-{dimension}"),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for feature in features(text) {
            let hash = crc32fast::hash(feature.as_bytes());
            let bucket = hash as usize % self.dimension;
            let sign = if hash & 0x8000_0000 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed_batch(&self, texts: &[String]) -> TreeRootsResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ---------------------------------------------------------------------------
// HTTP embedder
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

fn fatal(message: String) -> TreeRootsError {
    TreeRootsError::EmbeddingGenerationFailed {
        retryable: false,
        message,
    }
}

/// Rate limiting and server-side failures may clear up on their own.
fn status_is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn embeddings_url(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/embeddings") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/embeddings")
    }
}

pub struct HttpEmbedder {
    url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpEmbedder {
    pub fn new(endpoint: &EmbeddingEndpoint) -> TreeRootsResult<Self> {
        let client = Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .map_err(|e| fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: embeddings_url(&endpoint.url),
            model: endpoint.model.clone(),
            api_key: endpoint.api_key.clone(),
            client,
        })
    }
}

impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed_batch(&self, texts: &[String]) -> TreeRootsResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut request = self.client.post(&self.url).json(&serde_json::json!({
            "model": self.model,
            "input": texts,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        // Timeouts and connection failures are transient.
        let response = request
            .send()
            .map_err(|e| TreeRootsError::EmbeddingGenerationFailed {
                retryable: true,
                message: format!("request to {} failed: {e}", self.url),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TreeRootsError::EmbeddingGenerationFailed {
                retryable: status_is_retryable(status),
                message: format!("embedding endpoint returned {status}: {}", body.trim()),
            });
        }

        // A body cut short or stalled past the timeout is transient; a body
        // that arrives whole but does not decode is not.
        let body = response
            .bytes()
            .map_err(|e| TreeRootsError::EmbeddingGenerationFailed {
                retryable: true,
                message: format!("reading response from {} failed: {e}", self.url),
            })?;
        let parsed: EmbeddingResponse = serde_json::from_slice(&body)
            .map_err(|e| fatal(format!("malformed embedding response: {e}")))?;
        if parsed.data.len() != texts.len() {
            return Err(fatal(format!(
                "embedding count mismatch: got {}, expected {}",
                parsed.data.len(),
                texts.len()
            )));
        }

        let mut items = parsed.data;
        if items.iter().all(|item| item.index.is_some()) {
            items.sort_by_key(|item| item.index);
        }
        let vectors: Vec<Vec<f32>> = items.into_iter().map(|item| item.embedding).collect();
        let dimension = vectors[0].len();
        if dimension == 0 || vectors.iter().any(|v| v.len() != dimension) {
            return Err(fatal(
                "embedding response has empty or inconsistent vectors".to_string(),
            ));
        }
        debug!(count = vectors.len(), dimension, "embeddings generated");
        Ok(vectors)
    }
}
