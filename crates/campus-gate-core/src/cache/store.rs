use std::fmt::Display;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

/// Consider an entry stale after 1 hour.
const STALE_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            fetched_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.fetched_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            // 1h 30m+ rounds up to 2h
            let hours = (minutes + 30) / 60;
            format!("{}h ago", hours)
        } else {
            let days = (minutes + 720) / 1440;
            format!("{}d ago", days)
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > STALE_MINUTES
    }
}

/// Durable backing for a cache actor.
pub trait Persistence<K, T>: Send + Sync {
    fn load(&self, key: &K) -> Result<Option<CacheEntry<T>>>;
    fn save(&self, key: &K, entry: &CacheEntry<T>) -> Result<()>;
    fn remove(&self, key: &K) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// One JSON file per key under `<cache_dir>/<namespace>/`.
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(cache_dir: PathBuf, namespace: &str) -> Result<Self> {
        let dir = cache_dir.join(namespace);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl<K, T> Persistence<K, T> for DiskCache
where
    K: Display,
    T: Serialize + DeserializeOwned,
{
    fn load(&self, key: &K) -> Result<Option<CacheEntry<T>>> {
        let path = self.path_for(&key.to_string());
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", path.display()))?;
        let entry = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", path.display()))?;
        debug!(key = %key, "Loaded cache entry from disk");
        Ok(Some(entry))
    }

    fn save(&self, key: &K, entry: &CacheEntry<T>) -> Result<()> {
        let path = self.path_for(&key.to_string());
        let contents = serde_json::to_string_pretty(entry)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write cache file: {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, key: &K) -> Result<()> {
        let path = self.path_for(&key.to_string());
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove cache file: {}", path.display()))?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_age_display() {
        let mut entry = CacheEntry::new(1);
        assert_eq!(entry.age_display(), "just now");

        entry.fetched_at = Utc::now() - Duration::minutes(5);
        assert_eq!(entry.age_display(), "5m ago");

        entry.fetched_at = Utc::now() - Duration::minutes(95);
        assert_eq!(entry.age_display(), "2h ago");

        entry.fetched_at = Utc::now() - Duration::hours(30);
        assert_eq!(entry.age_display(), "1d ago");

        // Clock skew
        entry.fetched_at = Utc::now() + Duration::minutes(10);
        assert_eq!(entry.age_display(), "just now");
    }

    #[test]
    fn test_is_stale() {
        let mut entry = CacheEntry::new("timetable");
        assert!(!entry.is_stale());
        entry.fetched_at = Utc::now() - Duration::minutes(61);
        assert!(entry.is_stale());
    }

    #[test]
    fn test_disk_cache_persists_entries() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf(), "bus").unwrap();

        let key = "https://bus.campus.edu/routes?line=3".to_string();
        let entry = CacheEntry::new(vec!["North Gate".to_string()]);
        Persistence::<String, Vec<String>>::save(&cache, &key, &entry).unwrap();

        let loaded: Option<CacheEntry<Vec<String>>> = cache.load(&key).unwrap();
        assert_eq!(loaded, Some(entry));

        Persistence::<String, Vec<String>>::remove(&cache, &key).unwrap();
        let gone: Option<CacheEntry<Vec<String>>> = cache.load(&key).unwrap();
        assert!(gone.is_none());
    }

    #[test]
    fn test_disk_cache_clear_removes_all_files() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf(), "grades").unwrap();
        for term in ["2023-2", "2024-1"] {
            Persistence::<&str, u32>::save(&cache, &term, &CacheEntry::new(90)).unwrap();
        }

        Persistence::<&str, u32>::clear(&cache).unwrap();
        assert_eq!(std::fs::read_dir(dir.path().join("grades")).unwrap().count(), 0);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf(), "wallet").unwrap();
        std::fs::write(dir.path().join("wallet").join("balance.json"), "not json").unwrap();

        let result: Result<Option<CacheEntry<f64>>> = cache.load(&"balance");
        assert!(result.is_err());
    }
}
