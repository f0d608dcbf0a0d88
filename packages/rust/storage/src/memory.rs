//! Process-local content store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use examforge_shared::{CacheFilter, CacheRecord, CacheStat, Result};
use tokio::sync::RwLock;

use crate::ContentStore;

/// In-memory, append-only [`ContentStore`]. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<CacheRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `records`.
    pub fn with_records(records: Vec<CacheRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Total number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn read(&self, filter: &CacheFilter, limit: usize) -> Result<Vec<CacheRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn write(&self, records: &[CacheRecord]) -> Result<()> {
        self.records.write().await.extend_from_slice(records);
        Ok(())
    }

    async fn stats(&self) -> Result<Vec<CacheStat>> {
        let records = self.records.read().await;
        let mut buckets: BTreeMap<(String, Option<String>, Option<String>), u64> = BTreeMap::new();
        for r in records.iter() {
            *buckets
                .entry((r.role.clone(), r.area.clone(), r.competency.clone()))
                .or_default() += 1;
        }
        Ok(buckets
            .into_iter()
            .map(|((role, area, competency), count)| CacheStat {
                role,
                area,
                competency,
                count,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sample_record;

    #[tokio::test]
    async fn reads_newest_first_within_limit() {
        let store = MemoryStore::new();
        store
            .write(&[
                sample_record("Docente de Aula", None, "old"),
                sample_record("Docente de Aula", None, "new"),
                sample_record("Orientador", None, "other role"),
            ])
            .await
            .unwrap();

        let filter = CacheFilter {
            role: "Docente de Aula".into(),
            area: None,
            competency: None,
        };
        let records = store.read(&filter, 1).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content.text, "new");
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn repeated_writes_keep_duplicates() {
        let store = MemoryStore::new();
        let batch = vec![sample_record("Docente de Aula", None, "dup")];
        store.write(&batch).await.unwrap();
        store.write(&batch).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].count, 2);
    }
}
