//! # SQLite wrapper.
//!
//! One connection per database file, serialized behind an async mutex so
//! callers on the cooperative runtime never block each other on rusqlite's
//! synchronous API for longer than a single statement.

use std::path::Path;

use anyhow::{Context as _, Result};
use tokio::sync::Mutex;

/// A wrapper around the underlying SQLite connection.
#[derive(Debug)]
pub struct Sql {
    conn: Mutex<rusqlite::Connection>,
}

impl Sql {
    /// Opens the database file, creating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = rusqlite::Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory database, mainly useful in tests.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs a closure with the locked connection.
    pub(crate) async fn call<T, F>(&self, function: F) -> Result<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send,
        T: Send,
    {
        let mut conn = self.conn.lock().await;
        function(&mut conn)
    }

    /// Executes a query which is expected to return zero or more modified rows.
    pub async fn execute(
        &self,
        query: &str,
        params: impl rusqlite::Params + Send,
    ) -> Result<usize> {
        self.call(|conn| {
            let count = conn.execute(query, params)?;
            Ok(count)
        })
        .await
    }

    /// Executes a query expected to return exactly one row.
    pub async fn query_row<T, F>(
        &self,
        query: &str,
        params: impl rusqlite::Params + Send,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&rusqlite::Row) -> rusqlite::Result<T> + Send,
        T: Send,
    {
        self.call(|conn| {
            let res = conn.query_row(query, params, f)?;
            Ok(res)
        })
        .await
    }

    /// Executes a query expected to return one or no rows.
    pub async fn query_row_optional<T, F>(
        &self,
        query: &str,
        params: impl rusqlite::Params + Send,
        f: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(&rusqlite::Row) -> rusqlite::Result<T> + Send,
        T: Send,
    {
        self.call(|conn| match conn.query_row(query, params, f) {
            Ok(res) => Ok(Some(res)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(err.into()),
        })
        .await
    }

    /// Executes a query mapping each returned row, then folding the rows
    /// with `g`.
    pub async fn query_map<T, F, G, H>(
        &self,
        query: &str,
        params: impl rusqlite::Params + Send,
        f: F,
        g: G,
    ) -> Result<H>
    where
        F: FnMut(&rusqlite::Row) -> rusqlite::Result<T> + Send,
        G: FnOnce(rusqlite::MappedRows<F>) -> Result<H> + Send,
        T: Send,
        H: Send,
    {
        self.call(|conn| {
            let mut stmt = conn.prepare(query)?;
            let res = stmt.query_map(params, f)?;
            g(res)
        })
        .await
    }

    /// Returns whether the given query returns a count greater than zero.
    pub async fn exists(&self, query: &str, params: impl rusqlite::Params + Send) -> Result<bool> {
        let count: i64 = self.query_row(query, params, |row| row.get(0)).await?;
        Ok(count > 0)
    }

    /// Runs the closure inside a transaction which is committed if it
    /// returns `Ok` and rolled back otherwise.
    pub async fn transaction<T, F>(&self, callback: F) -> Result<T>
    where
        F: FnOnce(&mut rusqlite::Transaction<'_>) -> Result<T> + Send,
        T: Send,
    {
        self.call(|conn| {
            let mut transaction = conn.transaction()?;
            let ret = callback(&mut transaction);

            match ret {
                Ok(ret) => {
                    transaction.commit()?;
                    Ok(ret)
                }
                Err(err) => {
                    transaction.rollback()?;
                    Err(err)
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_and_query() -> Result<()> {
        let sql = Sql::open_in_memory().await?;
        sql.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", ())
            .await?;
        sql.execute("INSERT INTO t (name) VALUES (?)", ("alice",))
            .await?;

        let name: String = sql
            .query_row("SELECT name FROM t WHERE id=1", (), |row| row.get(0))
            .await?;
        assert_eq!(name, "alice");

        assert!(sql.exists("SELECT COUNT(*) FROM t", ()).await?);
        assert_eq!(
            sql.query_row_optional("SELECT name FROM t WHERE id=7", (), |row| row
                .get::<_, String>(0))
                .await?,
            None
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_transaction_rolls_back() -> Result<()> {
        let sql = Sql::open_in_memory().await?;
        sql.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", ())
            .await?;

        let res: Result<()> = sql
            .transaction(|transaction| {
                transaction.execute("INSERT INTO t (id) VALUES (1)", ())?;
                anyhow::bail!("nope");
            })
            .await;
        assert!(res.is_err());
        assert!(!sql.exists("SELECT COUNT(*) FROM t", ()).await?);
        Ok(())
    }
}
