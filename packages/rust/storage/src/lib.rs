//! Content store for generated questions.
//!
//! The [`ContentStore`] trait is the seam the pipeline reads from and writes
//! to. Two implementations ship here:
//! - [`Storage`]: Turso Embedded / libSQL database on disk
//! - [`MemoryStore`]: process-local, for ephemeral deployments and tests
//!
//! The store is append-only: records are inserted, never updated, and
//! duplicates are accepted.

mod memory;
mod migrations;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use examforge_shared::{
    CacheFilter, CacheRecord, CacheStat, ExamForgeError, QuestionContent, RecordId, Result,
    StorageConfig, StorageKind,
};
use libsql::{Connection, Database, params};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub use memory::MemoryStore;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Append-only storage for generated questions.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Read up to `limit` records matching `filter`, newest first.
    async fn read(&self, filter: &CacheFilter, limit: usize) -> Result<Vec<CacheRecord>>;

    /// Append records. Never deduplicates.
    async fn write(&self, records: &[CacheRecord]) -> Result<()>;

    /// Record counts per (role, area, competency).
    async fn stats(&self) -> Result<Vec<CacheStat>>;
}

// ---------------------------------------------------------------------------
// libSQL storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    // One write transaction at a time on the shared connection.
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ExamForgeError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ExamForgeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ExamForgeError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            write_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode (for reporting
    /// tools). Migrations are not run.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ExamForgeError::Storage(format!(
                "no question cache at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ExamForgeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ExamForgeError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            write_lock: Mutex::new(()),
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ExamForgeError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ExamForgeError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Insert a single record on `conn`.
    async fn insert_record(conn: &Connection, record: &CacheRecord) -> Result<()> {
        let content_json = serde_json::to_string(&record.content)
            .map_err(|e| ExamForgeError::Storage(format!("failed to encode question: {e}")))?;

        conn.execute(
                "INSERT INTO question_cache (id, role, area, competency, content_json, prompt_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id.to_string(),
                    record.role.as_str(),
                    record.area.as_deref(),
                    record.competency.as_deref(),
                    content_json,
                    record.prompt_hash.as_deref(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| ExamForgeError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for Storage {
    async fn read(&self, filter: &CacheFilter, limit: usize) -> Result<Vec<CacheRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, role, area, competency, content_json, prompt_hash, created_at
                 FROM question_cache
                 WHERE role = ?1
                   AND (?2 IS NULL OR area = ?2)
                   AND (?3 IS NULL OR competency = ?3)
                 ORDER BY created_at DESC
                 LIMIT ?4",
                params![
                    filter.role.as_str(),
                    filter.area.as_deref(),
                    filter.competency.as_deref(),
                    limit as i64,
                ],
            )
            .await
            .map_err(|e| ExamForgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| ExamForgeError::Storage(e.to_string()))?
        {
            match row_to_record(&row) {
                Ok(record) => results.push(record),
                Err(e) => warn!(error = %e, "skipping undecodable cache row"),
            }
        }
        Ok(results)
    }

    async fn write(&self, records: &[CacheRecord]) -> Result<()> {
        self.check_writable()?;
        if records.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| ExamForgeError::Storage(e.to_string()))?;

        for record in records {
            if let Err(e) = Self::insert_record(&tx, record).await {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback of cache batch failed");
                }
                return Err(e);
            }
        }

        tx.commit()
            .await
            .map_err(|e| ExamForgeError::Storage(e.to_string()))
    }

    async fn stats(&self) -> Result<Vec<CacheStat>> {
        let mut rows = self
            .conn
            .query(
                "SELECT role, area, competency, COUNT(*)
                 FROM question_cache
                 GROUP BY role, area, competency
                 ORDER BY role, area, competency",
                params![],
            )
            .await
            .map_err(|e| ExamForgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| ExamForgeError::Storage(e.to_string()))?
        {
            results.push(CacheStat {
                role: row
                    .get::<String>(0)
                    .map_err(|e| ExamForgeError::Storage(e.to_string()))?,
                area: row.get::<String>(1).ok(),
                competency: row.get::<String>(2).ok(),
                count: row.get::<i64>(3).unwrap_or(0) as u64,
            });
        }
        Ok(results)
    }
}

/// Open the store selected by `[storage]` in the config.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn ContentStore>> {
    match config.kind {
        StorageKind::Libsql => {
            let storage = Storage::open(Path::new(&config.path)).await?;
            info!(path = %config.path, "opened question cache");
            Ok(Arc::new(storage))
        }
        StorageKind::Memory => {
            info!("using in-memory question cache; contents are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Open the configured store for inspection only.
///
/// A libSQL cache is opened read-only and left unmigrated. A memory store
/// has nothing to inspect across processes and opens empty.
pub async fn open_store_readonly(config: &StorageConfig) -> Result<Arc<dyn ContentStore>> {
    match config.kind {
        StorageKind::Libsql => Ok(Arc::new(
            Storage::open_readonly(Path::new(&config.path)).await?,
        )),
        StorageKind::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Convert a database row to a [`CacheRecord`].
fn row_to_record(row: &libsql::Row) -> Result<CacheRecord> {
    let id: String = row
        .get(0)
        .map_err(|e| ExamForgeError::Storage(e.to_string()))?;
    let content_json: String = row
        .get(4)
        .map_err(|e| ExamForgeError::Storage(e.to_string()))?;
    let content: QuestionContent = serde_json::from_str(&content_json)
        .map_err(|e| ExamForgeError::Storage(format!("invalid content for {id}: {e}")))?;

    Ok(CacheRecord {
        id: id
            .parse::<RecordId>()
            .map_err(|e| ExamForgeError::Storage(format!("invalid record id {id}: {e}")))?,
        role: row
            .get::<String>(1)
            .map_err(|e| ExamForgeError::Storage(e.to_string()))?,
        area: row.get::<String>(2).ok(),
        competency: row.get::<String>(3).ok(),
        content,
        prompt_hash: row.get::<String>(5).ok(),
        created_at: {
            let s: String = row
                .get(6)
                .map_err(|e| ExamForgeError::Storage(e.to_string()))?;
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| ExamForgeError::Storage(format!("invalid date: {e}")))?
        },
    })
}
