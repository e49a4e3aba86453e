//! The downstream index the engine pushes documents into.

use crate::error::IndexError;
use crate::schema::SearchHit;
use crate::vectors::VectorIndex;
use docsync_embeddings::EmbeddingModel;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Key/value metadata stored alongside each document.
pub type Metadata = BTreeMap<String, String>;

/// A vector index keyed by document path.
///
/// `upsert` must replace whatever was stored for the path before, and
/// `delete` of an unknown path must succeed. `paths` lists every key the
/// index holds, so entries without a record can be found and removed.
pub trait IndexClient: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError>;

    fn upsert(
        &self,
        path: &str,
        text: &str,
        vector: &[f32],
        metadata: &Metadata,
    ) -> Result<(), IndexError>;

    fn delete(&self, path: &str) -> Result<(), IndexError>;

    fn paths(&self) -> Result<Vec<String>, IndexError>;
}

/// Embedding model plus the local sqlite-vec index.
pub struct LocalIndexClient {
    model: Box<dyn EmbeddingModel>,
    index: Arc<VectorIndex>,
}

impl LocalIndexClient {
    pub fn new(model: Box<dyn EmbeddingModel>, index: Arc<VectorIndex>) -> Self {
        Self { model, index }
    }

    /// Embed `query` and return the closest documents.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, IndexError> {
        let vector = self.embed(query)?;
        self.index.search(&vector, limit).map_err(IndexError::Store)
    }
}

impl IndexClient for LocalIndexClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        Ok(self.model.embed(text)?)
    }

    fn upsert(
        &self,
        path: &str,
        text: &str,
        vector: &[f32],
        metadata: &Metadata,
    ) -> Result<(), IndexError> {
        self.index
            .upsert(path, text, vector, metadata)
            .map_err(IndexError::Store)
    }

    fn delete(&self, path: &str) -> Result<(), IndexError> {
        self.index.delete(path).map(|_| ()).map_err(IndexError::Store)
    }

    fn paths(&self) -> Result<Vec<String>, IndexError> {
        self.index.paths().map_err(IndexError::Store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_embeddings::StubEmbeddingModel;

    fn client(dim: usize) -> LocalIndexClient {
        LocalIndexClient::new(
            Box::new(StubEmbeddingModel::with_dimension(dim)),
            Arc::new(VectorIndex::open_in_memory(dim).unwrap()),
        )
    }

    #[test]
    fn test_upsert_then_delete() {
        let client = client(4);
        let vector = client.embed("hello").unwrap();
        assert_eq!(vector.len(), 4);

        client
            .upsert("/a.txt", "hello", &vector, &Metadata::new())
            .unwrap();
        assert_eq!(client.paths().unwrap(), vec!["/a.txt"]);

        client.delete("/a.txt").unwrap();
        client.delete("/a.txt").unwrap();
        assert!(client.paths().unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_is_store_error() {
        let client = LocalIndexClient::new(
            Box::new(StubEmbeddingModel::with_dimension(2)),
            Arc::new(VectorIndex::open_in_memory(3).unwrap()),
        );
        let vector = client.embed("x").unwrap();
        let err = client
            .upsert("/a.txt", "x", &vector, &Metadata::new())
            .unwrap_err();
        assert!(matches!(err, IndexError::Store(_)));
    }

    #[test]
    fn test_search_returns_indexed_document() {
        let client = client(4);
        let vector = client.embed("doc").unwrap();
        client.upsert("/doc.md", "doc", &vector, &Metadata::new()).unwrap();

        let hits = client.search("anything", 3).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/doc.md");
    }
}
