//! Credential store: one `SQLite` file, one writer.
//!
//! Every record maps a forum username to an optional registered public key
//! and an optional pending one-time secret. All access goes through a single
//! async mutex over the only connection; `SQLite` does not tolerate
//! concurrent writers, and the replicator reads the backing file byte-wise
//! while holding the same lock.

use sqlx::{
    ConnectOptions, Row, SqliteConnection,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tokio::sync::Mutex;
use tracing::debug;

/// Outcome of a key-confirmation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    InvalidSecret,
}

/// A single row of the `keys` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub username: String,
    pub public_key: Option<String>,
    pub pending_secret: Option<String>,
}

#[derive(Debug)]
pub struct CredentialStore {
    conn: Mutex<SqliteConnection>,
    path: PathBuf,
}

impl CredentialStore {
    /// Open (creating if necessary) the store at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or the schema fails to
    /// apply.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(sqlx::Error::Io)?;
            }
        }

        // DELETE journal mode keeps every committed page in the main file,
        // which `snapshot` reads byte-for-byte for replication.
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);

        let mut conn = options.connect().await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS keys (
                username TEXT PRIMARY KEY,
                public_key TEXT,
                secret TEXT
            )",
        )
        .execute(&mut conn)
        .await?;

        debug!(path = %path.display(), "Credential store ready");

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// All usernames that completed registration, with their public keys.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_public_keys(&self) -> Result<BTreeMap<String, String>, sqlx::Error> {
        let mut conn = self.conn.lock().await;

        let rows =
            sqlx::query("SELECT username, public_key FROM keys WHERE public_key IS NOT NULL")
                .fetch_all(&mut *conn)
                .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>(0), row.get::<String, _>(1)))
            .collect())
    }

    /// Insert or replace the pending secret for `username`.
    ///
    /// A previously registered public key survives a re-issue; only the
    /// secret column is replaced.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn upsert_pending_secret(
        &self,
        username: &str,
        secret: &str,
    ) -> Result<(), sqlx::Error> {
        let mut conn = self.conn.lock().await;

        sqlx::query(
            "INSERT INTO keys (username, secret) VALUES (?1, ?2)
             ON CONFLICT(username) DO UPDATE SET secret = excluded.secret",
        )
        .bind(username)
        .bind(secret)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Commit `public_key` for `username` if `secret` matches the pending
    /// one; the secret is cleared in the same step so it cannot be replayed.
    /// On mismatch nothing is mutated.
    ///
    /// # Errors
    /// Returns an error if a query fails.
    pub async fn confirm_key(
        &self,
        username: &str,
        secret: &str,
        public_key: &str,
    ) -> Result<Confirmation, sqlx::Error> {
        let mut conn = self.conn.lock().await;

        let stored: Option<String> = sqlx::query("SELECT secret FROM keys WHERE username = ?1")
            .bind(username)
            .fetch_optional(&mut *conn)
            .await?
            .and_then(|row| row.get::<Option<String>, _>(0));

        match stored {
            Some(pending) if pending == secret => {}
            _ => return Ok(Confirmation::InvalidSecret),
        }

        sqlx::query("UPDATE keys SET public_key = ?1, secret = NULL WHERE username = ?2")
            .bind(public_key)
            .bind(username)
            .execute(&mut *conn)
            .await?;

        Ok(Confirmation::Confirmed)
    }

    /// The full record for `username`, if any.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn record(&self, username: &str) -> Result<Option<CredentialRecord>, sqlx::Error> {
        let mut conn = self.conn.lock().await;

        let row = sqlx::query("SELECT username, public_key, secret FROM keys WHERE username = ?1")
            .bind(username)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(|row| CredentialRecord {
            username: row.get(0),
            public_key: row.get(1),
            pending_secret: row.get(2),
        }))
    }

    /// Raw bytes of the backing file, read while holding the store lock so no
    /// write interleaves with the copy. The lock is released before any
    /// network transfer of the snapshot.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub async fn snapshot(&self) -> std::io::Result<Vec<u8>> {
        let _guard = self.conn.lock().await;

        tokio::fs::read(&self.path).await
    }
}
