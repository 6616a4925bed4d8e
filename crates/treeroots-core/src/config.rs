//! Runtime configuration, read from `TREEROOTS_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory (relative to the project root) holding both stores by default.
pub const DEFAULT_DATA_DIR: &str = ".tree_roots";
pub const DEFAULT_MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;
pub const DEFAULT_EMBED_BATCH: usize = 32;
pub const DEFAULT_EMBEDDING_DIM: usize = 256;
pub const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 30;

/// Remote embedding endpoint settings. Present only when a URL is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingEndpoint {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Overrides `<project_root>/.tree_roots` when set.
    pub data_dir: Option<PathBuf>,
    pub workers: usize,
    pub max_file_bytes: u64,
    pub exclude: Vec<String>,
    /// Skip key material and credential-looking files even when tracked.
    pub exclude_sensitive: bool,
    pub embed_batch: usize,
    pub embedding_dim: usize,
    pub embedding_endpoint: Option<EmbeddingEndpoint>,
    /// Include the blast-radius walk in query packets by default.
    pub blast_radius: bool,
    pub plan_template: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            workers: default_workers(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            exclude: Vec::new(),
            exclude_sensitive: true,
            embed_batch: DEFAULT_EMBED_BATCH,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            embedding_endpoint: None,
            blast_radius: false,
            plan_template: None,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn parse_flag(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    !matches!(v.as_str(), "" | "0" | "false" | "no" | "off")
}

fn parse_positive<T: std::str::FromStr + PartialOrd + Default>(value: &str) -> Option<T> {
    value
        .trim()
        .parse::<T>()
        .ok()
        .filter(|v| *v > T::default())
}

impl Config {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Unparseable values
    /// fall back to the default for that key.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(dir) = lookup("TREEROOTS_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            config.data_dir = Some(PathBuf::from(dir.trim()));
        }
        if let Some(n) = lookup("TREEROOTS_WORKERS").and_then(|v| parse_positive(&v)) {
            config.workers = n;
        }
        if let Some(n) = lookup("TREEROOTS_MAX_FILE_BYTES").and_then(|v| parse_positive(&v)) {
            config.max_file_bytes = n;
        }
        if let Some(globs) = lookup("TREEROOTS_EXCLUDE") {
            config.exclude = globs
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("TREEROOTS_EXCLUDE_SENSITIVE") {
            config.exclude_sensitive = parse_flag(&v);
        }
        if let Some(n) = lookup("TREEROOTS_EMBED_BATCH").and_then(|v| parse_positive(&v)) {
            config.embed_batch = n;
        }
        if let Some(n) = lookup("TREEROOTS_EMBEDDING_DIM").and_then(|v| parse_positive(&v)) {
            config.embedding_dim = n;
        }
        if let Some(v) = lookup("TREEROOTS_BLAST_RADIUS") {
            config.blast_radius = parse_flag(&v);
        }
        if let Some(path) = lookup("TREEROOTS_PLAN_TEMPLATE").filter(|v| !v.trim().is_empty()) {
            config.plan_template = Some(PathBuf::from(path.trim()));
        }

        if let Some(url) = lookup("TREEROOTS_EMBEDDING_URL").filter(|v| !v.trim().is_empty()) {
            let timeout_secs = lookup("TREEROOTS_EMBEDDING_TIMEOUT_SECS")
                .and_then(|v| parse_positive(&v))
                .unwrap_or(DEFAULT_EMBEDDING_TIMEOUT_SECS);
            config.embedding_endpoint = Some(EmbeddingEndpoint {
                url: url.trim().to_string(),
                model: lookup("TREEROOTS_EMBEDDING_MODEL")
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| "text-embedding-3-small".to_string()),
                api_key: lookup("TREEROOTS_EMBEDDING_API_KEY").filter(|v| !v.is_empty()),
                timeout: Duration::from_secs(timeout_secs),
            });
        }

        config
    }

    /// Directory holding `graph.sqlite` and `vectors.sqlite` for a project.
    pub fn data_dir_for(&self, project_root: &Path) -> PathBuf {
        match &self.data_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => project_root.join(dir),
            None => project_root.join(DEFAULT_DATA_DIR),
        }
    }
}
