use thiserror::Error;

/// Failures raised by an embedding backend.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding backend misconfigured: {0}")]
    Config(String),

    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("unexpected embedding response: {0}")]
    Response(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_display() {
        let err = EmbedError::Dimension {
            expected: 768,
            actual: 3072,
        };
        assert_eq!(
            err.to_string(),
            "embedding dimension mismatch: expected 768, got 3072"
        );
    }

    #[test]
    fn test_request_display() {
        let err = EmbedError::Request("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }
}
