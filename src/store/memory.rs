use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{DocumentStore, StoreError};

/// In-memory document store. Used by tests; no persistence guarantee.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: DashMap<(String, String), Value>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create(&self, partition: &str, id: &str, body: Value) -> Result<(), StoreError> {
        let key = (partition.to_string(), id.to_string());
        if self.documents.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }
        self.documents.insert(key, body);
        Ok(())
    }

    async fn read(&self, partition: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let key = (partition.to_string(), id.to_string());
        Ok(self.documents.get(&key).map(|doc| doc.clone()))
    }

    async fn replace(&self, partition: &str, id: &str, body: Value) -> Result<(), StoreError> {
        let key = (partition.to_string(), id.to_string());
        match self.documents.get_mut(&key) {
            Some(mut doc) => {
                *doc = body;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete(&self, partition: &str, id: &str) -> Result<(), StoreError> {
        let key = (partition.to_string(), id.to_string());
        match self.documents.remove(&key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn query_eq(
        &self,
        partition: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == partition)
            .filter(|entry| entry.value().get(field).and_then(Value::as_str) == Some(value))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list(&self, partition: &str) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == partition)
            .map(|entry| entry.value().clone())
            .collect())
    }
}
