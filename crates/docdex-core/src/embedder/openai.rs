//! OpenAI-compatible embedding provider.
//!
//! Speaks the plain `/embeddings` HTTP contract shared by OpenAI, Azure
//! OpenAI gateways, and local inference servers. Transient failures (HTTP
//! 429 and 5xx, connection errors) retry with exponential backoff; other
//! 4xx responses fail immediately as [`Error::Embedding`].

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_ATTEMPTS: u32 = 4;
const RETRY_BASE: Duration = Duration::from_millis(1000);

/// Provider for OpenAI-compatible embedding endpoints.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiProvider {
    /// Creates a provider from configuration.
    ///
    /// `model` and `dimension` are required; `base_url` defaults to the
    /// OpenAI API.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Config("embedding.model is required".into()))?;
        let dimension = config
            .dimension
            .ok_or_else(|| Error::Config("embedding.dimension is required".into()))?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model,
            dimension,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut request = self.client.post(&url).json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) if (err.is_timeout() || err.is_connect()) && attempt < MAX_ATTEMPTS => {
                    let delay = RETRY_BASE * 2u32.saturating_pow(attempt - 1);
                    warn!("embedding request failed ({err}), retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    continue;
                },
                Err(err) => return Err(Error::Network(err)),
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                if attempt < MAX_ATTEMPTS {
                    let delay = RETRY_BASE * 2u32.saturating_pow(attempt - 1);
                    warn!("embedding endpoint returned {status}, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(Error::Embedding(format!(
                    "provider returned {status} after {MAX_ATTEMPTS} attempts"
                )));
            }
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(Error::Embedding(format!(
                    "provider returned {status}: {detail}"
                )));
            }

            let parsed: EmbeddingResponse = response
                .json()
                .await
                .map_err(|e| Error::Embedding(format!("malformed embedding response: {e}")))?;

            let mut data = parsed.data;
            data.sort_by_key(|d| d.index);
            debug!("embedded {} texts via {}", texts.len(), self.model);
            return Ok(data.into_iter().map(|d| d.embedding).collect());
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "openai".to_string(),
            base_url: Some(base_url),
            api_key: Some("test-key".to_string()),
            model: Some("text-embedding-3-small".to_string()),
            dimension: Some(3),
        }
    }

    #[tokio::test]
    async fn test_embed_parses_vectors_in_index_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"index": 1, "embedding": [0.4, 0.5, 0.6]},
                    {"index": 0, "embedding": [0.1, 0.2, 0.3]},
                ]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&config(server.uri())).unwrap();
        let vectors = provider
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors[0], vec![0.1, 0.2, 0.3]);
        assert_eq!(vectors[1], vec![0.4, 0.5, 0.6]);
    }

    #[tokio::test]
    async fn test_retry_on_429_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [1.0, 0.0, 0.0]}]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&config(server.uri())).unwrap();
        let vectors = provider.embed(&["text".to_string()]).await.unwrap();
        assert_eq!(vectors.len(), 1);
    }

    #[tokio::test]
    async fn test_client_error_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&config(server.uri())).unwrap();
        let result = provider.embed(&["text".to_string()]).await;
        assert!(matches!(result, Err(Error::Embedding(_))));
    }

    #[test]
    fn test_missing_model_rejected() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            dimension: Some(8),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(OpenAiProvider::new(&config), Err(Error::Config(_))));
    }
}
