// Persistent token storage in a SQLite database

use anyhow::Context;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use super::storage::TokenStorage;
use super::types::Tokens;
use crate::error::{Result, SdkError};

const DEFAULT_ALIAS_KEY: &str = "default_alias";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tokens (
        alias TEXT PRIMARY KEY,
        access_token TEXT NOT NULL,
        refresh_token TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Token storage that survives restarts ("remember me")
pub struct SqliteTokenStorage {
    conn: Mutex<Connection>,
}

impl SqliteTokenStorage {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))
                .map_err(|e| SdkError::Storage(format!("{:#}", e)))?;
        }

        tracing::debug!("Opening token database: {}", path.display());
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open the database in the platform data directory
    pub fn open_default() -> Result<Self> {
        let path = default_db_path().ok_or_else(|| {
            SdkError::Storage("Could not determine the user data directory".to_string())
        })?;
        Self::open(&path)
    }

    /// Database that lives only as long as this value
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn default_alias(conn: &Connection) -> Result<Option<String>> {
        let alias = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                [DEFAULT_ALIAS_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(alias)
    }

    fn write_default(conn: &Connection, alias: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![DEFAULT_ALIAS_KEY, alias],
        )?;
        Ok(())
    }
}

impl TokenStorage for SqliteTokenStorage {
    fn get_tokens(&self, alias: Option<&str>) -> Result<Option<Tokens>> {
        let conn = self.conn.lock();

        let alias = match alias {
            Some(alias) => alias.to_string(),
            None => match Self::default_alias(&conn)? {
                Some(alias) => alias,
                None => return Ok(None),
            },
        };

        let tokens = conn
            .query_row(
                "SELECT access_token, refresh_token FROM tokens WHERE alias = ?",
                [&alias],
                |row| {
                    Ok(Tokens {
                        access_token: row.get(0)?,
                        refresh_token: row.get(1)?,
                    })
                },
            )
            .optional()?;

        Ok(tokens)
    }

    fn set_tokens(&self, alias: &str, tokens: &Tokens, make_default: bool) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO tokens (alias, access_token, refresh_token, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(alias) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                updated_at = excluded.updated_at",
            params![
                alias,
                tokens.access_token,
                tokens.refresh_token,
                Utc::now().to_rfc3339()
            ],
        )?;

        if make_default {
            Self::write_default(&tx, alias)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn set_default(&self, alias: &str) -> Result<()> {
        let conn = self.conn.lock();
        Self::write_default(&conn, alias)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("DELETE FROM tokens; DELETE FROM settings;")?;
        Ok(())
    }
}

/// Location of the token database under the user's data directory
pub fn default_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("jexia-sdk").join("tokens.sqlite3"))
}
