//! Configuration for the docdex core.
//!
//! The core reads a single explicit [`Config`] record; it performs no ambient
//! environment reads. The CLI collaborator is responsible for mapping
//! environment variables (`DOCDEX_DATA_DIR`, `DOCDEX_EMBEDDING_*`) onto this
//! record before handing it to the core.
//!
//! ## Data directory resolution
//!
//! [`Config::resolve_data_dir`] applies the documented fallback chain:
//!
//! 1. explicit `data_dir` in the config (set directly or from env by the CLI)
//! 2. the OS application-data directory (`ProjectDirs`)
//! 3. a `docdex` directory under the system temp dir
//!
//! ## Example configuration file
//!
//! ```toml
//! concurrency = 3
//! recover_jobs = true
//!
//! [embedding]
//! provider = "openai"
//! base_url = "https://api.openai.com/v1"
//! model = "text-embedding-3-small"
//! dimension = 1536
//!
//! [chunks]
//! min_size = 500
//! preferred_size = 1500
//! max_size = 5000
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Character-count bounds for the splitters and the greedy optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSizes {
    /// Chunks below this size are merge candidates.
    #[serde(default = "default_min_size")]
    pub min_size: usize,
    /// Target size the greedy optimizer merges towards.
    #[serde(default = "default_preferred_size")]
    pub preferred_size: usize,
    /// Hard upper bound; oversized content is delegated to finer splitting.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

const fn default_min_size() -> usize {
    500
}
const fn default_preferred_size() -> usize {
    1500
}
const fn default_max_size() -> usize {
    5000
}

impl Default for ChunkSizes {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            preferred_size: default_preferred_size(),
            max_size: default_max_size(),
        }
    }
}

/// Embedding provider selection and connection settings.
///
/// The provider is configuration only; the core treats the embedder as a
/// capability with a single batch-encode method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EmbeddingConfig {
    /// Provider kind: `"openai"` for any OpenAI-compatible endpoint, or
    /// `"hashing"` for the deterministic offline provider.
    #[serde(default)]
    pub provider: String,
    /// API base URL for HTTP providers.
    #[serde(default)]
    pub base_url: Option<String>,
    /// API key for HTTP providers.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model identifier, e.g. `text-embedding-3-small`.
    #[serde(default)]
    pub model: Option<String>,
    /// Vector dimensionality recorded with indexed versions.
    #[serde(default)]
    pub dimension: Option<usize>,
}

/// Fetch behavior defaults applied when a job does not override them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FetchDefaults {
    /// Per-request timeout in milliseconds. `None` disables the timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl FetchDefaults {
    /// The timeout as a [`Duration`], when configured.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

const fn default_concurrency() -> usize {
    3
}

/// Top-level configuration record for the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Explicit data directory; resolved via the fallback chain when absent.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Number of jobs the pipeline manager runs in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Re-queue interrupted jobs on startup instead of marking them failed.
    #[serde(default)]
    pub recover_jobs: bool,
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Splitter size bounds.
    #[serde(default, rename = "chunks")]
    pub chunk_sizes: ChunkSizes,
    /// Fetcher defaults.
    #[serde(default)]
    pub fetch: FetchDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            concurrency: default_concurrency(),
            recover_jobs: false,
            embedding: EmbeddingConfig::default(),
            chunk_sizes: ChunkSizes::default(),
            fetch: FetchDefaults::default(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Persists the configuration as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {e}")))?;
        }
        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml)
            .map_err(|e| Error::Config(format!("Failed to write {}: {e}", path.display())))?;
        Ok(())
    }

    /// Validates option combinations that are fatal at startup.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        if self.chunk_sizes.min_size > self.chunk_sizes.preferred_size
            || self.chunk_sizes.preferred_size > self.chunk_sizes.max_size
        {
            return Err(Error::Config(
                "chunk sizes must satisfy min <= preferred <= max".into(),
            ));
        }
        match self.embedding.provider.as_str() {
            "" | "hashing" => {},
            "openai" => {
                if self.embedding.model.is_none() {
                    return Err(Error::Config(
                        "embedding.model is required for the openai provider".into(),
                    ));
                }
            },
            other => {
                return Err(Error::Config(format!("unknown embedding provider '{other}'")));
            },
        }
        Ok(())
    }

    /// Resolves the data directory using the documented fallback chain.
    ///
    /// The returned directory is created if it does not exist.
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        let dir = if let Some(explicit) = &self.data_dir {
            explicit.clone()
        } else if let Some(project) = directories::ProjectDirs::from("dev", "docdex", "docdex") {
            project.data_dir().to_path_buf()
        } else {
            std::env::temp_dir().join("docdex")
        };

        fs::create_dir_all(&dir)
            .map_err(|e| Error::Config(format!("Failed to create data directory: {e}")))?;
        Ok(dir)
    }

    /// Path of the SQLite database inside the data directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join("docdex.sqlite"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.concurrency, 3);
        assert!(!config.recover_jobs);
        assert_eq!(config.chunk_sizes.min_size, 500);
        assert_eq!(config.chunk_sizes.preferred_size, 1500);
        assert_eq!(config.chunk_sizes.max_size, 5000);
        assert!(config.fetch.timeout().is_none());
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.embedding.provider = "openai".to_string();
        config.embedding.model = Some("text-embedding-3-small".to_string());
        config.embedding.dimension = Some(1536);
        config.save(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = Config {
            concurrency: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_openai_without_model() {
        let config = Config {
            embedding: EmbeddingConfig {
                provider: "openai".to_string(),
                ..EmbeddingConfig::default()
            },
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_explicit_data_dir_wins() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: Some(dir.path().join("store")),
            ..Config::default()
        };
        let resolved = config.resolve_data_dir().unwrap();
        assert_eq!(resolved, dir.path().join("store"));
        assert!(resolved.exists());
    }

    #[test]
    fn test_invalid_chunk_sizes_rejected() {
        let config = Config {
            chunk_sizes: ChunkSizes {
                min_size: 2000,
                preferred_size: 1500,
                max_size: 5000,
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
