pub mod models;
pub mod posts;
pub mod replies;
pub mod users;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

use crate::state::DbPool;

pub const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial",
    include_str!("../../migrations/001_initial.sql"),
)];

/// Per-connection pragmas. `foreign_keys` is connection-scoped in SQLite, so
/// it has to be applied to every pooled connection, not just the first.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
";

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager =
        SqliteConnectionManager::file(db_path).with_init(|c| c.execute_batch(CONNECTION_PRAGMAS));
    let pool = Pool::builder().max_size(8).build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;

    Ok(pool)
}

/// Single-connection in-memory pool. Every pooled connection to
/// `:memory:` is a separate database, hence `max_size(1)`.
pub fn create_memory_pool() -> anyhow::Result<DbPool> {
    let manager =
        SqliteConnectionManager::memory().with_init(|c| c.execute_batch(CONNECTION_PRAGMAS));
    let pool = Pool::builder().max_size(1).build(manager)?;
    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}

/// Current time as an ISO-8601 UTC string with millisecond precision.
///
/// All stored timestamps use this one format so that lexical `ORDER BY`
/// on the text columns is chronological.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
pub(crate) fn test_pool() -> DbPool {
    let pool = create_memory_pool().unwrap();
    run_migrations(&pool).unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_pool_creates_db_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("sub/dir/test.db");
        let pool = create_pool(&db_path).unwrap();
        assert!(db_path.exists());
        let conn = pool.get().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn every_pooled_connection_enforces_foreign_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = create_pool(&tmp.path().join("fk.db")).unwrap();
        let first = pool.get().unwrap();
        let second = pool.get().unwrap();
        for conn in [&first, &second] {
            let on: bool = conn
                .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                .unwrap();
            assert!(on);
        }
    }

    #[test]
    fn migrations_run_successfully() {
        let pool = test_pool();
        let conn = pool.get().unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };
        for table in ["users", "sessions", "posts", "replies"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let pool = test_pool();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn reply_requires_existing_post() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let now = now_iso();
        let result = conn.execute(
            "INSERT INTO replies (post_id, content, author, created_at, updated_at)
             VALUES (999, 'hi', 'bob', ?1, ?1)",
            params![now],
        );
        assert!(result.is_err());
    }

    #[test]
    fn deleting_a_post_cascades_to_its_replies() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let now = now_iso();
        conn.execute(
            "INSERT INTO posts (title, content, author, created_at, updated_at)
             VALUES ('t', 'c', 'a', ?1, ?1)",
            params![now],
        )
        .unwrap();
        let post_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO replies (post_id, content, author, created_at, updated_at)
             VALUES (?1, 'top', 'a', ?2, ?2)",
            params![post_id, now],
        )
        .unwrap();
        let parent = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO replies (post_id, content, author, parent_reply_id, created_at, updated_at)
             VALUES (?1, 'nested', 'b', ?2, ?3, ?3)",
            params![post_id, parent, now],
        )
        .unwrap();

        conn.execute("DELETE FROM posts WHERE id = ?1", params![post_id])
            .unwrap();

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM replies", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn now_iso_is_millisecond_utc() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2025-01-15T12:00:00.000Z".len());
    }
}
