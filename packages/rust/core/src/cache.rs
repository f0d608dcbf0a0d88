//! Cache read and write sides of the pipeline.
//!
//! Neither side ever fails outward: store errors are logged and absorbed,
//! so an unavailable store degrades to "no cache" rather than an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use examforge_shared::{CacheFilter, CacheRecord, QuestionContent, RecordId};
use examforge_storage::ContentStore;

use crate::extract::validate_content;

// ---------------------------------------------------------------------------
// CacheReader
// ---------------------------------------------------------------------------

/// Serves up to N randomly chosen, valid cached records for a category.
#[derive(Clone)]
pub struct CacheReader {
    store: Arc<dyn ContentStore>,
    oversample_factor: usize,
}

impl CacheReader {
    pub fn new(store: Arc<dyn ContentStore>, oversample_factor: usize) -> Self {
        Self {
            store,
            oversample_factor: oversample_factor.max(1),
        }
    }

    /// Fetch `oversample_factor × n` matching records, drop invalid ones,
    /// shuffle and keep `n`. Returns fewer when the pool is smaller.
    #[instrument(skip_all, fields(role = %filter.role, wanted = n))]
    pub async fn read(&self, filter: &CacheFilter, n: usize) -> Vec<CacheRecord> {
        if n == 0 {
            return Vec::new();
        }

        let limit = n.saturating_mul(self.oversample_factor);
        let pool = match self.store.read(filter, limit).await {
            Ok(pool) => pool,
            Err(e) => {
                warn!(error = %e, "cache read failed, continuing without cache");
                return Vec::new();
            }
        };

        let fetched = pool.len();
        let mut valid: Vec<CacheRecord> = pool
            .into_iter()
            .filter(|r| match validate_content(&r.content) {
                Ok(()) => true,
                Err(e) => {
                    debug!(id = %r.id, error = %e, "skipping invalid cached question");
                    false
                }
            })
            .collect();

        valid.shuffle(&mut rand::rng());
        valid.truncate(n);

        debug!(fetched, served = valid.len(), "cache read");
        valid
    }
}

impl std::fmt::Debug for CacheReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheReader")
            .field("oversample_factor", &self.oversample_factor)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// CacheWriter
// ---------------------------------------------------------------------------

/// Persists freshly generated questions in a detached, time-bounded task.
#[derive(Clone)]
pub struct CacheWriter {
    store: Arc<dyn ContentStore>,
    timeout: Duration,
}

impl CacheWriter {
    pub fn new(store: Arc<dyn ContentStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Tag `questions` with the request's category and append them in the
    /// background. The returned handle may be awaited or dropped; the write
    /// proceeds either way and its outcome is only logged.
    pub fn persist(
        &self,
        category: &CacheFilter,
        questions: Vec<QuestionContent>,
        prompt_hash: Option<String>,
    ) -> JoinHandle<()> {
        let now = Utc::now();
        let records: Vec<CacheRecord> = questions
            .into_iter()
            .map(|content| CacheRecord {
                id: RecordId::new(),
                role: category.role.clone(),
                area: category.area.clone(),
                competency: category.competency.clone(),
                content,
                prompt_hash: prompt_hash.clone(),
                created_at: now,
            })
            .collect();

        let store = Arc::clone(&self.store);
        let timeout = self.timeout;
        let role = category.role.clone();

        tokio::spawn(async move {
            let count = records.len();
            match tokio::time::timeout(timeout, store.write(&records)).await {
                Ok(Ok(())) => info!(%role, count, "cached generated questions"),
                Ok(Err(e)) => warn!(%role, count, error = %e, "cache write failed"),
                Err(_) => warn!(
                    %role,
                    count,
                    timeout_secs = timeout.as_secs(),
                    "cache write timed out"
                ),
            }
        })
    }
}

impl std::fmt::Debug for CacheWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWriter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use examforge_shared::{CacheStat, ExamForgeError, OptionId, QuestionOption, Result};
    use examforge_storage::MemoryStore;
    use std::collections::HashSet;

    /// Store whose every operation fails.
    pub(crate) struct FailingStore;

    #[async_trait]
    impl ContentStore for FailingStore {
        async fn read(&self, _filter: &CacheFilter, _limit: usize) -> Result<Vec<CacheRecord>> {
            Err(ExamForgeError::Storage("database is locked".into()))
        }

        async fn write(&self, _records: &[CacheRecord]) -> Result<()> {
            Err(ExamForgeError::Storage("disk full".into()))
        }

        async fn stats(&self) -> Result<Vec<CacheStat>> {
            Err(ExamForgeError::Storage("database is locked".into()))
        }
    }

    /// Store whose writes never finish in time.
    struct HangingStore;

    #[async_trait]
    impl ContentStore for HangingStore {
        async fn read(&self, _filter: &CacheFilter, _limit: usize) -> Result<Vec<CacheRecord>> {
            Ok(Vec::new())
        }

        async fn write(&self, _records: &[CacheRecord]) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }

        async fn stats(&self) -> Result<Vec<CacheStat>> {
            Ok(Vec::new())
        }
    }

    pub(crate) fn content(text: &str) -> QuestionContent {
        QuestionContent {
            text: text.into(),
            context: String::new(),
            options: OptionId::ALL
                .iter()
                .map(|id| QuestionOption {
                    id: *id,
                    text: format!("opción {id}"),
                })
                .collect(),
            correct_option_id: OptionId::B,
            competency: None,
            bloom_level: None,
            normative: None,
            difficulty_analysis: None,
        }
    }

    pub(crate) fn record(role: &str, area: Option<&str>, text: &str) -> CacheRecord {
        CacheRecord {
            id: RecordId::new(),
            role: role.into(),
            area: area.map(Into::into),
            competency: None,
            content: content(text),
            prompt_hash: None,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn filter(role: &str, area: Option<&str>) -> CacheFilter {
        CacheFilter {
            role: role.into(),
            area: area.map(Into::into),
            competency: None,
        }
    }

    #[tokio::test]
    async fn returns_exactly_n_unique_records_from_large_pool() {
        let records: Vec<CacheRecord> = (0..12)
            .map(|i| record("Docente de Aula", Some("Matemáticas"), &format!("q{i}")))
            .collect();
        let reader = CacheReader::new(Arc::new(MemoryStore::with_records(records)), 2);

        let served = reader
            .read(&filter("Docente de Aula", Some("Matemáticas")), 5)
            .await;
        assert_eq!(served.len(), 5);
        let ids: HashSet<String> = served.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids.len(), 5);
    }

    #[tokio::test]
    async fn small_pool_returns_what_exists() {
        let store = MemoryStore::with_records(vec![
            record("Orientador", None, "a"),
            record("Orientador", None, "b"),
            record("Docente de Aula", None, "other"),
        ]);
        let reader = CacheReader::new(Arc::new(store), 2);
        let served = reader.read(&filter("Orientador", None), 5).await;
        assert_eq!(served.len(), 2);
        assert!(served.iter().all(|r| r.role == "Orientador"));
    }

    #[tokio::test]
    async fn invalid_cached_content_is_skipped() {
        let mut broken = record("Orientador", None, "broken");
        broken.content.options.pop();
        let store = MemoryStore::with_records(vec![broken, record("Orientador", None, "ok")]);
        let served = CacheReader::new(Arc::new(store), 2)
            .read(&filter("Orientador", None), 2)
            .await;
        assert_eq!(served.len(), 1);
        assert_eq!(served[0].content.text, "ok");
    }

    #[tokio::test]
    async fn store_failure_reads_as_empty() {
        let reader = CacheReader::new(Arc::new(FailingStore), 2);
        assert!(reader.read(&filter("Orientador", None), 3).await.is_empty());
    }

    #[tokio::test]
    async fn writer_tags_records_with_category() {
        let store = Arc::new(MemoryStore::new());
        let writer = CacheWriter::new(store.clone(), Duration::from_secs(5));
        let category = CacheFilter {
            role: "Docente de Aula".into(),
            area: Some("Ciencias".into()),
            competency: Some("Didáctica".into()),
        };

        writer
            .persist(&category, vec![content("g1"), content("g2")], Some("abc".into()))
            .await
            .unwrap();

        let stored = store.read(&category, 10).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| r.prompt_hash.as_deref() == Some("abc")));
        assert!(stored.iter().all(|r| r.competency.as_deref() == Some("Didáctica")));
    }

    #[tokio::test]
    async fn writer_absorbs_failures_and_timeouts() {
        let failing = CacheWriter::new(Arc::new(FailingStore), Duration::from_secs(5));
        failing
            .persist(&filter("x", None), vec![content("g")], None)
            .await
            .expect("task completes");

        let hanging = CacheWriter::new(Arc::new(HangingStore), Duration::from_millis(50));
        let started = std::time::Instant::now();
        hanging
            .persist(&filter("x", None), vec![content("g")], None)
            .await
            .expect("task completes");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn same_batch_written_twice_keeps_both() {
        let store = Arc::new(MemoryStore::new());
        let writer = CacheWriter::new(store.clone(), Duration::from_secs(5));
        let category = filter("Orientador", None);
        for _ in 0..2 {
            writer
                .persist(&category, vec![content("repetida")], None)
                .await
                .unwrap();
        }
        let stored = store.read(&category, 10).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| r.content.text == "repetida"));
    }
}
