//! Memory store collaborator: `store`/`recall` actions and run summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskflow_core::StepError;
use tokio::sync::RwLock;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub memory_type: String,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(memory_type: impl Into<String>, content: Value, task_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            memory_type: memory_type.into(),
            content,
            task_id,
            created_at: Utc::now(),
        }
    }

    fn matches(&self, query: &str) -> bool {
        if query.is_empty() || self.memory_type.eq_ignore_ascii_case(query) {
            return true;
        }
        let haystack = match &self.content {
            Value::String(s) => s.to_lowercase(),
            other => other.to_string().to_lowercase(),
        };
        haystack.contains(&query.to_lowercase())
    }
}

#[async_trait::async_trait]
pub trait MemoryStore: Send + Sync {
    async fn store(&self, record: MemoryRecord) -> Result<(), StepError>;

    /// Up to `limit` records matching `query`, newest first.
    async fn recall(&self, query: &str, limit: usize) -> Result<Vec<MemoryRecord>, StepError>;
}

/// Process-local store. Matches on memory type or a case-insensitive
/// substring of the content.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<MemoryRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// All records, oldest first.
    pub async fn records(&self) -> Vec<MemoryRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait::async_trait]
impl MemoryStore for InMemoryStore {
    async fn store(&self, record: MemoryRecord) -> Result<(), StepError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn recall(&self, query: &str, limit: usize) -> Result<Vec<MemoryRecord>, StepError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.matches(query))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn recall_newest_first() {
        let store = InMemoryStore::new();
        store.store(MemoryRecord::new("fact", json!("the sky is Blue"), None)).await.unwrap();
        store.store(MemoryRecord::new("fact", json!("grass is green"), None)).await.unwrap();
        store.store(MemoryRecord::new("note", json!({"color": "blue"}), None)).await.unwrap();

        let hits = store.recall("blue", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].memory_type, "note");

        let facts = store.recall("FACT", 1).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].content, json!("grass is green"));
    }
}
