use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::model::{GuildId, QaPair};
use crate::store::{decode_payload, encode_payload, QaStore};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS faq (
    guild_id INTEGER PRIMARY KEY,
    qa TEXT DEFAULT '[]'
)";

/// One row per guild; the `qa` column holds the JSON-encoded pair list.
pub struct SqliteQaStore {
    conn: Mutex<Connection>,
}

impl SqliteQaStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened faq database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }
}

fn row_key(guild: GuildId) -> Result<i64> {
    i64::try_from(guild)
        .map_err(|_| StoreError::InvalidArg(format!("guild id {guild} out of range")))
}

impl QaStore for SqliteQaStore {
    fn get_pairs(&self, guild: GuildId) -> Result<Vec<QaPair>> {
        let key = row_key(guild)?;
        let raw: Option<Option<String>> = self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT qa FROM faq WHERE guild_id = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()?)
        })?;

        Ok(match raw.flatten() {
            Some(payload) => decode_payload(guild, &payload),
            None => Vec::new(),
        })
    }

    fn set_pairs(&self, guild: GuildId, pairs: &[QaPair]) -> Result<()> {
        let key = row_key(guild)?;
        let payload = encode_payload(pairs)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO faq (guild_id, qa) VALUES (?1, ?2)
                 ON CONFLICT(guild_id) DO UPDATE SET qa = excluded.qa",
                params![key, payload],
            )?;
            Ok(())
        })
    }
}
