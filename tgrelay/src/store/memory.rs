use async_trait::async_trait;
use dashmap::DashMap;

use super::{FileRecord, MetadataStore};

/// In-process store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, FileRecord>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn put(&self, key: &str, record: &FileRecord) -> anyhow::Result<()> {
        self.records.insert(key.to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<FileRecord>> {
        Ok(self.records.get(key).map(|entry| entry.value().clone()))
    }
}
