use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{GenerationRecord, GenerationStore};

/// Process-local store used when no database is configured, and in tests.
#[derive(Debug, Default)]
pub struct MemoryGenerationStore {
    records: RwLock<Vec<GenerationRecord>>,
}

impl MemoryGenerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl GenerationStore for MemoryGenerationStore {
    async fn insert(&self, record: &GenerationRecord) -> Result<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<GenerationRecord>> {
        let records = self.records.read().await;
        // Later inserts win ties on created_at.
        let mut recent: Vec<GenerationRecord> = records.iter().rev().cloned().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);
        Ok(recent)
    }
}
