//! Persistence Store: durable table of download rows and settings (§4.A).
//!
//! SQLite via `sqlx`, a single hand-rolled `CREATE TABLE IF NOT EXISTS`
//! migration run once at `open`, exactly the shape of the teacher's
//! `ResumeDb` — no external migration framework, no cross-row transactions.

use std::path::Path;

use anyhow::Result;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};

use crate::download::DownloadId;

/// One persisted download row (§6: the `downloads` table).
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRow {
    pub id: DownloadId,
    pub url: String,
    pub folder: String,
    pub filename: String,
    pub status: String,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// The two recognized settings keys (§3), typed after load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub global_rate_limit_bps: u64,
    pub max_concurrent_downloads: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            global_rate_limit_bps: 0,
            max_concurrent_downloads: 3,
        }
    }
}

/// Handle to the SQLite-backed download/settings database.
///
/// The database file lives under the XDG state directory:
/// `~/.local/state/haul/downloads.db` on Linux.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Open (or create) the default database and run migrations.
    pub async fn open_default() -> Result<Self> {
        let path = crate::config::default_db_path()?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Self::open_uri(&format!("sqlite://{}?mode=rwc", path.display())).await
    }

    /// Open (or create) the database at an explicit file path, bypassing XDG
    /// discovery. Used by integration tests to reopen the same file across
    /// two `Store` instances, simulating a process restart (§8 scenario 1).
    pub async fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Self::open_uri(&format!("sqlite://{}?mode=rwc", path.display())).await
    }

    /// Open an in-memory database (used by tests — no disk I/O, no cross-test
    /// interference).
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Store { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn open_uri(uri: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(8).connect(uri).await?;
        let store = Store { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS downloads (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                folder TEXT NOT NULL,
                filename TEXT NOT NULL,
                status TEXT NOT NULL,
                downloaded_bytes INTEGER NOT NULL DEFAULT 0,
                total_bytes INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                completed_at INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Initialize recognized keys on first run (§6: "at least the two
        // recognized keys initialized on first run").
        let defaults = Settings::default();
        self.init_setting_default("global_rate_limit_bps", &defaults.global_rate_limit_bps.to_string())
            .await?;
        self.init_setting_default(
            "max_concurrent_downloads",
            &defaults.max_concurrent_downloads.to_string(),
        )
        .await?;

        Ok(())
    }

    async fn init_setting_default(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Creates a new download row (§4.A: `insert`).
    pub async fn insert(&self, row: &DownloadRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO downloads (
                id, url, folder, filename, status,
                downloaded_bytes, total_bytes, error_message, created_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&row.id)
        .bind(&row.url)
        .bind(&row.folder)
        .bind(&row.filename)
        .bind(&row.status)
        .bind(row.downloaded_bytes as i64)
        .bind(row.total_bytes as i64)
        .bind(&row.error_message)
        .bind(row.created_at)
        .bind(row.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically overwrites progress-bearing fields for one row (§4.A:
    /// `update_progress`).
    #[allow(clippy::too_many_arguments)]
    pub async fn update_progress(
        &self,
        id: &str,
        downloaded_bytes: u64,
        total_bytes: u64,
        status: &str,
        error_message: Option<&str>,
        completed_at: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE downloads
            SET downloaded_bytes = ?1, total_bytes = ?2, status = ?3, error_message = ?4, completed_at = ?5
            WHERE id = ?6
            "#,
        )
        .bind(downloaded_bytes as i64)
        .bind(total_bytes as i64)
        .bind(status)
        .bind(error_message)
        .bind(completed_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Updates only the status column, leaving progress fields untouched
    /// (used by pause/resume, which don't change byte counts).
    pub async fn set_status(&self, id: &str, status: &str) -> Result<()> {
        sqlx::query("UPDATE downloads SET status = ?1 WHERE id = ?2")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes a row (§4.A: `delete`).
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM downloads WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns all rows whose status is in {queued, downloading, paused},
    /// ordered by `created_at` ascending with id as tiebreak (§9: deterministic
    /// admission order).
    pub async fn list_nonterminal(&self) -> Result<Vec<DownloadRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, url, folder, filename, status, downloaded_bytes, total_bytes,
                   error_message, created_at, completed_at
            FROM downloads
            WHERE status IN ('queued', 'downloading', 'paused')
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_download).collect())
    }

    /// Startup reconciliation (§3, §4.D): anything left `downloading` when the
    /// process died is demoted to `queued` so the admission loop re-schedules
    /// it; the partial file on disk lets the Worker resume. Mirrors the
    /// teacher's `ResumeDb::recover_running_jobs`.
    pub async fn demote_downloading_to_queued(&self) -> Result<u64> {
        let r = sqlx::query("UPDATE downloads SET status = 'queued' WHERE status = 'downloading'")
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }

    /// Loads both recognized settings, falling back to defaults for any key
    /// that is missing or fails to parse.
    pub async fn get_settings(&self) -> Result<Settings> {
        let rows = sqlx::query("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;
        let mut settings = Settings::default();
        for row in rows {
            let key: String = row.get("key");
            let value: String = row.get("value");
            match key.as_str() {
                "global_rate_limit_bps" => {
                    if let Ok(v) = value.parse() {
                        settings.global_rate_limit_bps = v;
                    }
                }
                "max_concurrent_downloads" => {
                    if let Ok(v) = value.parse() {
                        settings.max_concurrent_downloads = v;
                    }
                }
                _ => {}
            }
        }
        Ok(settings)
    }

    /// Reads one setting's raw string value, if present.
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    /// Upserts one setting (§4.A: `set_setting`).
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_download(row: SqliteRow) -> DownloadRow {
    DownloadRow {
        id: row.get("id"),
        url: row.get("url"),
        folder: row.get("folder"),
        filename: row.get("filename"),
        status: row.get("status"),
        downloaded_bytes: row.get::<i64, _>("downloaded_bytes") as u64,
        total_bytes: row.get::<i64, _>("total_bytes") as u64,
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(id: &str, created_at: i64) -> DownloadRow {
        DownloadRow {
            id: id.to_string(),
            url: format!("https://example.com/{id}"),
            folder: "".to_string(),
            filename: format!("{id}.bin"),
            status: "queued".to_string(),
            downloaded_bytes: 0,
            total_bytes: 0,
            error_message: None,
            created_at,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn insert_list_delete_roundtrip() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store.list_nonterminal().await.unwrap().is_empty());

        store.insert(&sample_row("a", 1)).await.unwrap();
        store.insert(&sample_row("b", 2)).await.unwrap();

        let rows = store.list_nonterminal().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "a");
        assert_eq!(rows[1].id, "b");

        store.delete("a").await.unwrap();
        let rows = store.list_nonterminal().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "b");
    }

    #[tokio::test]
    async fn list_nonterminal_orders_by_created_at_then_id() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert(&sample_row("later", 5)).await.unwrap();
        store.insert(&sample_row("earlier", 1)).await.unwrap();
        store.insert(&sample_row("tie-b", 3)).await.unwrap();
        store.insert(&sample_row("tie-a", 3)).await.unwrap();

        let rows = store.list_nonterminal().await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["earlier", "tie-a", "tie-b", "later"]);
    }

    #[tokio::test]
    async fn list_nonterminal_excludes_terminal_statuses() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert(&sample_row("a", 1)).await.unwrap();
        store.set_status("a", "completed").await.unwrap();
        assert!(store.list_nonterminal().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_progress_overwrites_fields() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert(&sample_row("a", 1)).await.unwrap();
        store
            .update_progress("a", 500, 1000, "downloading", None, None)
            .await
            .unwrap();
        let rows = store.list_nonterminal().await.unwrap();
        assert_eq!(rows[0].downloaded_bytes, 500);
        assert_eq!(rows[0].total_bytes, 1000);
        assert_eq!(rows[0].status, "downloading");

        store
            .update_progress("a", 1000, 1000, "completed", None, Some(42))
            .await
            .unwrap();
        assert!(store.list_nonterminal().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn demote_downloading_to_queued_resets_only_downloading() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert(&sample_row("a", 1)).await.unwrap();
        store.insert(&sample_row("b", 2)).await.unwrap();
        store.set_status("a", "downloading").await.unwrap();
        store.set_status("b", "paused").await.unwrap();

        let n = store.demote_downloading_to_queued().await.unwrap();
        assert_eq!(n, 1);

        let rows = store.list_nonterminal().await.unwrap();
        let a = rows.iter().find(|r| r.id == "a").unwrap();
        let b = rows.iter().find(|r| r.id == "b").unwrap();
        assert_eq!(a.status, "queued");
        assert_eq!(b.status, "paused");
    }

    #[tokio::test]
    async fn settings_default_on_first_run() {
        let store = Store::open_in_memory().await.unwrap();
        let settings = store.get_settings().await.unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn set_setting_upserts_and_get_settings_reflects_it() {
        let store = Store::open_in_memory().await.unwrap();
        store.set_setting("global_rate_limit_bps", "1000000").await.unwrap();
        store.set_setting("max_concurrent_downloads", "8").await.unwrap();
        let settings = store.get_settings().await.unwrap();
        assert_eq!(settings.global_rate_limit_bps, 1_000_000);
        assert_eq!(settings.max_concurrent_downloads, 8);

        assert_eq!(
            store.get_setting("global_rate_limit_bps").await.unwrap().as_deref(),
            Some("1000000")
        );
        assert_eq!(store.get_setting("unknown_key").await.unwrap(), None);
    }
}
