use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};

use crate::app::{ProxyError, Result};
use crate::domain::CacheEntry;
use crate::store::CacheBacking;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            ProxyError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        migrations
            .to_latest(&mut conn)
            .map_err(|_| ProxyError::Database(rusqlite::Error::InvalidQuery))?;

        Ok(())
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }
}

impl CacheBacking for SqliteStore {
    fn put_page(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT OR REPLACE INTO page_cache (cache_key, content_type, content, expires_at, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key,
                entry.content_type,
                entry.content,
                entry.expires_at.map(|at| at.to_rfc3339()),
                Utc::now().to_rfc3339()
            ],
        )?;

        Ok(())
    }

    fn get_page(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                "SELECT content_type, content, expires_at FROM page_cache WHERE cache_key = ?1",
                params![key],
                |row| {
                    Ok(CacheEntry {
                        content_type: row.get(0)?,
                        content: row.get(1)?,
                        expires_at: row
                            .get::<_, Option<String>>(2)?
                            .and_then(|s| Self::parse_datetime(&s)),
                    })
                },
            )
            .optional()?;

        Ok(result)
    }

    fn delete_page(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM page_cache WHERE cache_key = ?1", params![key])?;
        Ok(())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare("SELECT cache_key, expires_at FROM page_cache WHERE expires_at IS NOT NULL")?;
        let expired = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|(_, at)| Self::parse_datetime(at).is_some_and(|at| now >= at))
            .map(|(key, _)| key)
            .collect::<Vec<_>>();

        for key in &expired {
            conn.execute("DELETE FROM page_cache WHERE cache_key = ?1", params![key])?;
        }

        Ok(expired.len())
    }
}
