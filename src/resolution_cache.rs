//! Resolution cache shared by every item of a batch.
//!
//! Title keys remember which reference a title resolved to, or that it will
//! fail. Reference keys remember parsed metadata, or that processing the
//! reference failed for good.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::CacheConfig;
use crate::model::{CacheValue, MetadataRecord, NormalizedQuery};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Key/value store the resolution core reads and writes through.
pub trait CacheStore {
    fn get(&self, key: &str) -> Option<CacheValue>;
    fn store(&mut self, key: &str, value: CacheValue);
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: HashMap<String, CacheValue>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<CacheValue> {
        self.entries.get(key).cloned()
    }

    fn store(&mut self, key: &str, value: CacheValue) {
        self.entries.insert(key.to_string(), value);
    }
}

/// Lifetimes applied to rows written by [`SqliteCacheStore`].
#[derive(Debug, Clone, Copy)]
pub struct CacheTtl {
    pub failure: Duration,
    pub resolved: Duration,
}

impl CacheTtl {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            failure: Duration::from_secs(u64::from(config.failure_ttl_days) * SECONDS_PER_DAY),
            resolved: Duration::from_secs(u64::from(config.record_ttl_days) * SECONDS_PER_DAY),
        }
    }

    fn for_value(&self, value: &CacheValue) -> Duration {
        match value {
            CacheValue::Failure => self.failure,
            CacheValue::Reference(_) | CacheValue::Metadata(_) => self.resolved,
        }
    }
}

/// SQLite-backed store that outlives a single execution.
pub struct SqliteCacheStore {
    conn: Connection,
    ttl: CacheTtl,
}

impl SqliteCacheStore {
    pub fn open(path: &Path, ttl: CacheTtl) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(error) = std::fs::create_dir_all(parent) {
                    warn!(
                        "Failed to create cache directory {}: {}",
                        parent.display(),
                        error
                    );
                }
            }
        }
        Self::with_connection(Connection::open(path)?, ttl)
    }

    #[cfg(test)]
    pub fn open_in_memory(ttl: CacheTtl) -> Result<Self, rusqlite::Error> {
        Self::with_connection(Connection::open_in_memory()?, ttl)
    }

    fn with_connection(conn: Connection, ttl: CacheTtl) -> Result<Self, rusqlite::Error> {
        let store = Self { conn, ttl };
        store.initialize_schema()?;
        let pruned = store.prune_expired(Self::now_unix_ms())?;
        if pruned > 0 {
            debug!("Pruned {} expired cache entries", pruned);
        }
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                stored_at_unix_ms INTEGER NOT NULL,
                expires_at_unix_ms INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn now_unix_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as i64)
            .unwrap_or(0)
    }

    pub fn prune_expired(&self, now_unix_ms: i64) -> Result<usize, rusqlite::Error> {
        self.conn.execute(
            "DELETE FROM cache_entries WHERE expires_at_unix_ms <= ?1",
            params![now_unix_ms],
        )
    }

    fn get_at(&self, key: &str, now_unix_ms: i64) -> Result<Option<CacheValue>, rusqlite::Error> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at_unix_ms > ?2",
                params![key, now_unix_ms],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(error) => {
                warn!("Discarding unreadable cache entry {}: {}", key, error);
                Ok(None)
            }
        }
    }

    fn store_at(
        &self,
        key: &str,
        value: &CacheValue,
        now_unix_ms: i64,
    ) -> Result<(), rusqlite::Error> {
        let serialized = serde_json::to_string(value)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
        let expires_at = now_unix_ms.saturating_add(self.ttl.for_value(value).as_millis() as i64);
        self.conn.execute(
            "INSERT INTO cache_entries (key, value, stored_at_unix_ms, expires_at_unix_ms)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                stored_at_unix_ms = excluded.stored_at_unix_ms,
                expires_at_unix_ms = excluded.expires_at_unix_ms",
            params![key, serialized, now_unix_ms, expires_at],
        )?;
        Ok(())
    }
}

impl CacheStore for SqliteCacheStore {
    fn get(&self, key: &str) -> Option<CacheValue> {
        match self.get_at(key, Self::now_unix_ms()) {
            Ok(value) => value,
            Err(error) => {
                warn!("Failed to read cache entry {}: {}", key, error);
                None
            }
        }
    }

    fn store(&mut self, key: &str, value: CacheValue) {
        if let Err(error) = self.store_at(key, &value, Self::now_unix_ms()) {
            warn!("Failed to write cache entry {}: {}", key, error);
        }
    }
}

/// What the cache knows about a title.
#[derive(Debug, Clone, PartialEq)]
pub enum TitleLookup {
    Unknown,
    Failed,
    Resolved(String),
}

/// What the cache knows about a reference.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordLookup {
    Unknown,
    Poisoned,
    Cached(MetadataRecord),
}

/// Typed, namespaced access to a borrowed [`CacheStore`].
pub struct ResolutionCache<'a> {
    store: &'a mut dyn CacheStore,
}

impl<'a> ResolutionCache<'a> {
    pub fn new(store: &'a mut dyn CacheStore) -> Self {
        Self { store }
    }

    pub fn title_key(query: &NormalizedQuery) -> String {
        let text = query.text.to_lowercase();
        match query.year_hint {
            Some(year) => format!("title:{text} ({year})"),
            None => format!("title:{text}"),
        }
    }

    pub fn reference_key(reference: &str) -> String {
        format!("reference:{reference}")
    }

    pub fn title(&self, query: &NormalizedQuery) -> TitleLookup {
        match self.store.get(&Self::title_key(query)) {
            None => TitleLookup::Unknown,
            Some(CacheValue::Failure) => TitleLookup::Failed,
            Some(CacheValue::Reference(reference)) => TitleLookup::Resolved(reference),
            Some(CacheValue::Metadata(_)) => {
                warn!(
                    "Ignoring metadata stored under title key {}",
                    Self::title_key(query)
                );
                TitleLookup::Unknown
            }
        }
    }

    pub fn remember_title(&mut self, query: &NormalizedQuery, reference: &str) {
        self.store.store(
            &Self::title_key(query),
            CacheValue::Reference(reference.to_string()),
        );
    }

    pub fn remember_title_failure(&mut self, query: &NormalizedQuery) {
        self.store.store(&Self::title_key(query), CacheValue::Failure);
    }

    pub fn record(&self, reference: &str) -> RecordLookup {
        match self.store.get(&Self::reference_key(reference)) {
            None => RecordLookup::Unknown,
            Some(CacheValue::Failure) => RecordLookup::Poisoned,
            Some(CacheValue::Metadata(record)) => RecordLookup::Cached(record),
            Some(CacheValue::Reference(_)) => {
                warn!(
                    "Ignoring reference stored under reference key {}",
                    Self::reference_key(reference)
                );
                RecordLookup::Unknown
            }
        }
    }

    pub fn remember_record(&mut self, reference: &str, record: &MetadataRecord) {
        self.store.store(
            &Self::reference_key(reference),
            CacheValue::Metadata(record.clone()),
        );
    }

    pub fn poison_reference(&mut self, reference: &str) {
        self.store
            .store(&Self::reference_key(reference), CacheValue::Failure);
    }
}
