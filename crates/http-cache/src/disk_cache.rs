//! Keyed, persistent JSON cache with an explicit validity policy (§4.2).
//!
//! Every outbound-facing source wraps its queries in one of these. Caches
//! survive process restarts (the file lives under `data/cache/`) and a
//! cached hit is returned with the same fidelity as a fresh fetch
//! (invariant 7, §8).

use chrono::{DateTime, NaiveDate, Utc};
use domain::Error;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct CacheRecord<V> {
    pub fetched_at: DateTime<Utc>,
    pub cache_date: Option<NaiveDate>,
    pub value: V,
}

/// §4.2's TTL column, generalized to the two shapes the table actually uses.
#[derive(Debug, Clone, Copy)]
pub enum Validity {
    /// Odds cache: valid for `ttl` wall-clock time since `fetched_at`.
    WallClockTtl(chrono::Duration),
    /// Rankings / Team Four-Factors / Research caches: valid iff
    /// `cache_date == target_date`.
    DateMatch,
}

pub struct DiskCache<V> {
    path: PathBuf,
    validity: Validity,
    _marker: PhantomData<V>,
}

impl<V> DiskCache<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    pub fn new(path: impl Into<PathBuf>, validity: Validity) -> Self {
        Self {
            path: path.into(),
            validity,
            _marker: PhantomData,
        }
    }

    fn load_map(&self) -> HashMap<String, CacheRecord<V>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("cache read failure at {:?}, treating as miss: {e}", self.path);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        }
    }

    fn save_map(&self, map: &HashMap<String, CacheRecord<V>>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, serialized)?;
        Ok(())
    }

    fn is_valid(&self, record: &CacheRecord<V>, target_date: Option<NaiveDate>, now: DateTime<Utc>) -> bool {
        match self.validity {
            Validity::WallClockTtl(ttl) => now - record.fetched_at < ttl,
            Validity::DateMatch => match (record.cache_date, target_date) {
                (Some(cached), Some(target)) => cached == target,
                _ => false,
            },
        }
    }

    /// Returns a cached value iff present and valid; `force_refresh` always
    /// misses (the `--force-refresh` invalidation path in §4.2).
    pub fn get(&self, key: &str, target_date: Option<NaiveDate>, force_refresh: bool) -> Option<V> {
        if force_refresh {
            return None;
        }
        let map = self.load_map();
        let record = map.get(key)?;
        if self.is_valid(record, target_date, Utc::now()) {
            Some(record.value.clone())
        } else {
            None
        }
    }

    /// Writes through even on partial upstream data — §4.2: "avoid
    /// re-punishing successful batches after a single failure".
    pub fn put(&self, key: &str, cache_date: Option<NaiveDate>, value: V) -> Result<(), Error> {
        let mut map = self.load_map();
        map.insert(
            key.to_string(),
            CacheRecord {
                fetched_at: Utc::now(),
                cache_date,
                value,
            },
        );
        self.save_map(&map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn wall_clock_ttl_hit_then_force_refresh_miss() {
        let dir = std::env::temp_dir().join(format!("hc-test-{}", uuid_like()));
        let cache: DiskCache<i64> = DiskCache::new(dir.join("odds.json"), Validity::WallClockTtl(Duration::hours(1)));
        cache.put("book:2025-11-24", None, 42).unwrap();
        assert_eq!(cache.get("book:2025-11-24", None, false), Some(42));
        assert_eq!(cache.get("book:2025-11-24", None, true), None);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn date_match_validity_requires_exact_date() {
        let dir = std::env::temp_dir().join(format!("hc-test-{}", uuid_like()));
        let cache: DiskCache<i64> = DiskCache::new(dir.join("rankings.json"), Validity::DateMatch);
        let d = NaiveDate::from_ymd_opt(2025, 11, 24).unwrap();
        cache.put("rankings", Some(d), 7).unwrap();
        assert_eq!(cache.get("rankings", Some(d), false), Some(7));
        let other = NaiveDate::from_ymd_opt(2025, 11, 25).unwrap();
        assert_eq!(cache.get("rankings", Some(other), false), None);
        std::fs::remove_dir_all(&dir).ok();
    }

    fn uuid_like() -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    }
}
