use std::time::Duration;

use moka::sync::Cache;

/// Default bound on remembered misses.
const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Paths recently found missing on a remote. Entries expire after the
/// configured time to live.
#[derive(Debug, Clone)]
pub struct NotFoundCache {
    entries: Cache<String, ()>,
}

impl NotFoundCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl: Duration, max_entries: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn insert(&self, path: &str) {
        self.entries.insert(key(path), ());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(key(path).as_str())
    }

    pub fn remove(&self, path: &str) {
        self.entries.invalidate(key(path).as_str());
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_contains_remove() {
        let cache = NotFoundCache::new(Duration::from_secs(60));
        assert!(!cache.contains("a/b.jar"));

        cache.insert("/a/b.jar");
        assert!(cache.contains("a/b.jar"));
        assert_eq!(cache.len(), 1);

        cache.remove("a/b.jar");
        assert!(!cache.contains("/a/b.jar"));

        cache.insert("x");
        cache.insert("y");
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entries_expire() {
        let cache = NotFoundCache::new(Duration::from_millis(50));
        cache.insert("a/b.jar.sha1");
        assert!(cache.contains("a/b.jar.sha1"));
        std::thread::sleep(Duration::from_millis(120));
        assert!(!cache.contains("a/b.jar.sha1"));
    }
}
