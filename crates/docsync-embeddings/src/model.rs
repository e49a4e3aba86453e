use crate::EMBEDDING_DIM;
use crate::error::EmbedError;
use serde::{Deserialize, Serialize};
use tracing::warn;

const DEFAULT_MODEL: &str = "gemini-embedding-001";
const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_INPUT_CHARS: usize = 8000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub dimension: usize,
    pub timeout_secs: u64,
    /// Inputs longer than this are cut on a char boundary before sending.
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            dimension: EMBEDDING_DIM,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }
}

impl EmbeddingConfig {
    /// Defaults overridden by `DOCSYNC_EMBED_*` and `GEMINI_API_KEY`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(model) = std::env::var("DOCSYNC_EMBED_MODEL") {
            config.model = model;
        }
        if let Ok(endpoint) = std::env::var("DOCSYNC_EMBED_ENDPOINT") {
            config.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        if let Some(dimension) = std::env::var("DOCSYNC_EMBED_DIMENSION")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.dimension = dimension;
        }
        config.api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        config
    }
}

/// Trait for embedding models.
///
/// Implementations are shared between sync workers, so they must be usable
/// from several threads at once.
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
    fn dimension(&self) -> usize;
}

/// Stub embedding model for when no backend is configured
pub struct StubEmbeddingModel {
    dimension: usize,
}

impl StubEmbeddingModel {
    pub fn new() -> Self {
        Self::with_dimension(EMBEDDING_DIM)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for StubEmbeddingModel {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for StubEmbeddingModel {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        // Return zero vector as placeholder
        Ok(vec![0.0; self.dimension])
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedding model based on available features and credentials
pub fn create_embedding_model(
    config: Option<EmbeddingConfig>,
) -> Result<Box<dyn EmbeddingModel>, EmbedError> {
    let config = config.unwrap_or_else(EmbeddingConfig::from_env);

    #[cfg(feature = "remote")]
    {
        if config.api_key.is_some() {
            tracing::info!("Using remote embedding model {}", config.model);
            return Ok(Box::new(crate::remote::RemoteEmbeddingModel::new(config)?));
        }
    }

    warn!("No embedding backend configured, falling back to zero vectors");
    Ok(Box::new(StubEmbeddingModel::with_dimension(config.dimension)))
}
