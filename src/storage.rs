//! # Document-store access.
//!
//! One deployment serves several customer projects; each project has its own
//! logical database, here one SQLite file per project discovered in the
//! configured database directory. Documents with nested structure
//! (`currentLocation`, the attendance `values` array) are stored as JSON
//! columns.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tokio::fs;

use crate::constants::{STORE_RETRY_COUNT, STORE_RETRY_DELAY};
use crate::context::Context;
use crate::sql::Sql;

/// A single project database.
#[derive(Debug)]
pub struct Db {
    /// Project name, used to address the database and to label errors.
    pub project_name: String,

    /// The underlying SQLite handle.
    pub sql: Sql,
}

impl Db {
    /// Opens a project database and makes sure the schema exists.
    pub async fn open(project_name: impl Into<String>, path: impl AsRef<Path>) -> Result<Arc<Db>> {
        let sql = Sql::open(path).await?;
        let db = Db {
            project_name: project_name.into(),
            sql,
        };
        db.init_tables().await?;
        Ok(Arc::new(db))
    }

    async fn init_tables(&self) -> Result<()> {
        self.sql
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS employee (
                       id TEXT PRIMARY KEY,
                       uid TEXT NOT NULL UNIQUE,
                       name TEXT NOT NULL DEFAULT '',
                       telegram_chat_id TEXT,
                       working_area TEXT NOT NULL DEFAULT '',
                       timezone TEXT,
                       reporting_line_manager TEXT,
                       current_location TEXT,
                       last_changed TEXT
                     );
                     CREATE TABLE IF NOT EXISTS attendance (
                       id TEXT PRIMARY KEY,
                       uid TEXT NOT NULL,
                       year INTEGER NOT NULL,
                       month TEXT NOT NULL,
                       monthly_worked_hours REAL NOT NULL DEFAULT 0,
                       last_clock_in TEXT,
                       values_json TEXT NOT NULL DEFAULT '[]',
                       last_changed TEXT,
                       UNIQUE(uid, year, month)
                     );
                     CREATE TABLE IF NOT EXISTS location_logs (
                       id INTEGER PRIMARY KEY AUTOINCREMENT,
                       employee_id TEXT NOT NULL,
                       latitude REAL NOT NULL,
                       longitude REAL NOT NULL,
                       accuracy REAL,
                       heading REAL,
                       speed REAL,
                       source TEXT NOT NULL,
                       chat_id INTEGER NOT NULL,
                       message_id INTEGER NOT NULL,
                       live_period_seconds INTEGER,
                       recorded_at TEXT NOT NULL
                     );",
                )?;
                Ok(())
            })
            .await
            .with_context(|| format!("schema init failed for project {}", self.project_name))
    }

    /// Cheap liveness probe.
    pub async fn is_healthy(&self) -> bool {
        self.sql
            .query_row("SELECT 1", (), |row| row.get::<_, i64>(0))
            .await
            .is_ok()
    }
}

/// The set of project databases this deployment serves.
#[derive(Debug, Clone, Default)]
pub struct DbPool {
    dbs: Vec<Arc<Db>>,
}

impl DbPool {
    /// Opens every `*.sqlite` file in `dir` as a project database.
    ///
    /// The file stem is the project name. A missing or empty directory yields
    /// an empty pool; the server still runs, monitor ticks are no-ops.
    pub async fn open_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut dbs = Vec::new();

        if fs::try_exists(dir).await.unwrap_or(false) {
            let mut entries = fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("sqlite") {
                    continue;
                }
                let project_name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .context("database file without a stem")?
                    .to_string();
                dbs.push(Db::open(project_name, &path).await?);
            }
        }

        dbs.sort_by(|a, b| a.project_name.cmp(&b.project_name));
        Ok(Self { dbs })
    }

    /// Builds a pool from already-opened databases.
    pub fn from_dbs(dbs: Vec<Arc<Db>>) -> Self {
        Self { dbs }
    }

    /// All databases, healthy or not.
    pub fn all(&self) -> &[Arc<Db>] {
        &self.dbs
    }

    /// Databases currently answering the health probe.
    pub async fn healthy(&self) -> Vec<Arc<Db>> {
        let mut healthy = Vec::with_capacity(self.dbs.len());
        for db in &self.dbs {
            if db.is_healthy().await {
                healthy.push(db.clone());
            }
        }
        healthy
    }

    /// Looks a database up by project name.
    pub fn get(&self, project_name: &str) -> Option<Arc<Db>> {
        self.dbs
            .iter()
            .find(|db| db.project_name == project_name)
            .cloned()
    }
}

/// Runs a document-store operation, retrying transient failures.
///
/// Up to [`STORE_RETRY_COUNT`] retries at [`STORE_RETRY_DELAY`] intervals;
/// errors are labeled with the project name. Non-idempotent operations go
/// through here too, on the assumption that the failure happened in
/// transport rather than after the write applied.
pub(crate) async fn with_retry<T, F, Fut>(
    context: &Context,
    project_name: &str,
    operation: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(res) => return Ok(res),
            Err(err) if attempt < STORE_RETRY_COUNT => {
                attempt += 1;
                warn!(
                    context,
                    "[{}] {} failed (attempt {}/{}): {:#}",
                    project_name,
                    operation,
                    attempt,
                    STORE_RETRY_COUNT + 1,
                    err
                );
                tokio::time::sleep(STORE_RETRY_DELAY).await;
            }
            Err(err) => {
                return Err(err.context(format!("[{project_name}] {operation}")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestContext;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_open_dir_discovers_projects() -> Result<()> {
        let dir = tempfile::tempdir()?;
        Db::open("acme", dir.path().join("acme.sqlite")).await?;
        Db::open("globex", dir.path().join("globex.sqlite")).await?;
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;

        let pool = DbPool::open_dir(dir.path()).await?;
        let names: Vec<_> = pool
            .all()
            .iter()
            .map(|db| db.project_name.clone())
            .collect();
        assert_eq!(names, ["acme", "globex"]);
        assert_eq!(pool.healthy().await.len(), 2);
        assert!(pool.get("acme").is_some());
        assert!(pool.get("initech").is_none());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_open_dir_missing_is_empty() -> Result<()> {
        let pool = DbPool::open_dir("/nonexistent/geoclock-db-dir").await?;
        assert!(pool.all().is_empty());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_with_retry_gives_up_after_retries() {
        let t = TestContext::new().await;
        let mut calls = 0;
        let res: Result<()> = with_retry(&t.ctx, "acme", "doomed write", || {
            calls += 1;
            async { anyhow::bail!("transport down") }
        })
        .await;
        assert!(res.is_err());
        assert_eq!(calls, 3);
    }
}
