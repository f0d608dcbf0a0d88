//! SQL migration definitions for the ExamForge question cache.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: question_cache",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Generated questions, append-only. Duplicates are allowed.
CREATE TABLE IF NOT EXISTS question_cache (
    id           TEXT PRIMARY KEY,
    role         TEXT NOT NULL,
    area         TEXT,
    competency   TEXT,
    content_json TEXT NOT NULL,
    prompt_hash  TEXT,
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_question_cache_category
    ON question_cache(role, area, competency);

CREATE INDEX IF NOT EXISTS idx_question_cache_created
    ON question_cache(created_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
    ]
}
