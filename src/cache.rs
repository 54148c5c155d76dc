use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use itertools::Itertools;
use tracing::{debug, info};

use crate::{
    error::Result,
    load::{Source, Table},
};

/// 24 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24);

struct Entry {
    loaded_at: Instant,
    table: Arc<Table>,
}

/// Read-through cache of loaded tables keyed by load parameters. Cached
/// tables are shared and never mutated; failed loads are not stored.
pub struct TableCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for TableCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl TableCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A panic in another caller cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_or_load<F>(&self, key: &str, load: F) -> Result<Arc<Table>>
    where
        F: FnOnce() -> Result<Table>,
    {
        if let Some(entry) = self.entries().get(key) {
            if entry.loaded_at.elapsed() < self.ttl {
                debug!("Cache hit for {}", key);
                return Ok(entry.table.clone());
            }
            info!("Cached table for {} expired, reloading", key);
        }

        let table = Arc::new(load()?);
        self.entries().insert(
            key.to_owned(),
            Entry { loaded_at: Instant::now(), table: table.clone() },
        );
        Ok(table)
    }

    pub fn invalidate(&self, key: &str) {
        self.entries().remove(key);
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn cache_key(sources: &[Source]) -> String {
    sources.iter().join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Error, load::Observation};
    use std::cell::Cell;

    fn table() -> Result<Table> {
        let obs = Observation::new("ATL", None, "30301", 2020, 300_000.0, 50_000.0).unwrap();
        Ok(Table::from_rows(vec![obs]))
    }

    #[test]
    fn second_load_is_cached() {
        let cache = TableCache::default();
        let loads = Cell::new(0);
        for _ in 0..3 {
            let t = cache
                .get_or_load("k", || {
                    loads.set(loads.get() + 1);
                    table()
                })
                .unwrap();
            assert_eq!(t.len(), 1);
        }
        assert_eq!(loads.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_ttl_reloads() {
        let cache = TableCache::new(Duration::ZERO);
        let loads = Cell::new(0);
        for _ in 0..2 {
            cache
                .get_or_load("k", || {
                    loads.set(loads.get() + 1);
                    table()
                })
                .unwrap();
        }
        assert_eq!(loads.get(), 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = TableCache::default();
        let err = cache.get_or_load("k", || Err(Error::SourceMissing("x".into())));
        assert!(err.is_err());
        assert!(cache.is_empty());
        assert!(cache.get_or_load("k", table).is_ok());
    }

    #[test]
    fn keys_separate_sources() {
        let a = cache_key(&[Source::parse("a.csv"), Source::parse("https://x/b.csv")]);
        assert_eq!(a, "a.csv|https://x/b.csv");
        let cache = TableCache::default();
        cache.get_or_load(&a, table).unwrap();
        cache.get_or_load("other", table).unwrap();
        assert_eq!(cache.len(), 2);
        cache.invalidate(&a);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
