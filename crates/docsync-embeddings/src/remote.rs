//! HTTP embedding backend speaking the Gemini `embedContent` API.

use crate::error::EmbedError;
use crate::model::{EmbeddingConfig, EmbeddingModel};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub struct RemoteEmbeddingModel {
    client: reqwest::blocking::Client,
    config: EmbeddingConfig,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Option<Values>,
}

#[derive(Deserialize)]
struct Values {
    values: Vec<f32>,
}

impl RemoteEmbeddingModel {
    pub fn new(config: EmbeddingConfig) -> Result<Self, EmbedError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| EmbedError::Config("missing API key".to_string()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Config(e.to_string()))?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:embedContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

impl EmbeddingModel for RemoteEmbeddingModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let text = truncate_input(text, self.config.max_input_chars);
        let body = EmbedRequest {
            model: format!("models/{}", self.config.model),
            content: Content {
                parts: [Part { text }],
            },
            output_dimensionality: self.config.dimension,
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| EmbedError::Request(e.to_string()))?;

        let status = response.status();
        let payload = response
            .text()
            .map_err(|e| EmbedError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(EmbedError::Request(format!("HTTP {}: {}", status, payload)));
        }

        let values = parse_response(&payload, self.config.dimension)?;
        debug!("Embedded {} chars into {} dims", text.len(), values.len());
        Ok(values)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

/// Cut `text` to at most `max_chars` characters.
fn truncate_input(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn parse_response(payload: &str, expected_dim: usize) -> Result<Vec<f32>, EmbedError> {
    let response: EmbedResponse =
        serde_json::from_str(payload).map_err(|e| EmbedError::Response(e.to_string()))?;

    let values = response
        .embedding
        .ok_or_else(|| EmbedError::Response("missing embedding field".to_string()))?
        .values;

    if values.len() != expected_dim {
        return Err(EmbedError::Dimension {
            expected: expected_dim,
            actual: values.len(),
        });
    }

    Ok(values)
}
