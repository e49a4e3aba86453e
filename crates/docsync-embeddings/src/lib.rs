pub mod error;
pub mod model;
#[cfg(feature = "remote")]
pub mod remote;

pub use error::EmbedError;
pub use model::{EmbeddingConfig, EmbeddingModel, StubEmbeddingModel, create_embedding_model};

#[cfg(feature = "remote")]
pub use remote::RemoteEmbeddingModel;

/// Default output dimension requested from the embedding backend
pub const EMBEDDING_DIM: usize = 768;
