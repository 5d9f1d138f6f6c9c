//! Role → permission resolution with a TTL cache.
//!
//! On a miss the resolver loads the role's complete permission set from its
//! [`PermissionSource`] and caches it under the role id. Entries expire after
//! the configured TTL; a background sweep drops expired entries.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::types::Result;

/// Where permission sets come from.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// All permission names granted to a role. Unknown roles have none.
    async fn permissions_for_role(&self, role_id: &str) -> Result<Vec<String>>;
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct PermissionCacheConfig {
    /// How long a loaded permission set stays valid
    pub ttl: Duration,

    /// How often the background sweep runs
    pub cleanup_interval: Duration,
}

impl Default for PermissionCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),              // 5 minutes
            cleanup_interval: Duration::from_secs(600), // 10 minutes
        }
    }
}

// =============================================================================
// Cache Statistics
// =============================================================================

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    /// Permission sets fetched from the source
    pub loads: AtomicU64,
    /// Entries dropped because they expired
    pub evictions: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub evictions: u64,
}

// =============================================================================
// Permission Cache
// =============================================================================

struct CachedPermissions {
    permissions: Arc<HashSet<String>>,
    expires_at: Instant,
}

impl CachedPermissions {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// TTL cache of permission sets keyed by role id.
pub struct PermissionCache {
    entries: DashMap<String, CachedPermissions>,
    config: PermissionCacheConfig,
    stats: CacheStats,
}

impl PermissionCache {
    pub fn new(config: PermissionCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            stats: CacheStats::default(),
        }
    }

    /// Live entry for a role; an expired entry counts as a miss and is dropped.
    pub fn get(&self, role_id: &str) -> Option<Arc<HashSet<String>>> {
        if let Some(entry) = self.entries.get(role_id) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(role_id);
                self.stats.record_eviction();
                self.stats.record_miss();
                return None;
            }
            self.stats.record_hit();
            return Some(Arc::clone(&entry.permissions));
        }

        self.stats.record_miss();
        None
    }

    pub fn insert(&self, role_id: String, permissions: HashSet<String>) -> Arc<HashSet<String>> {
        let permissions = Arc::new(permissions);
        self.entries.insert(
            role_id,
            CachedPermissions {
                permissions: Arc::clone(&permissions),
                expires_at: Instant::now() + self.config.ttl,
            },
        );
        permissions
    }

    /// Drop one role's entry, e.g. after its grants changed.
    pub fn invalidate(&self, role_id: &str) -> bool {
        self.entries.remove(role_id).is_some()
    }

    /// Remove all expired entries. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, v| {
            if v.is_expired() {
                removed += 1;
                self.stats.record_eviction();
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &PermissionCacheConfig {
        &self.config
    }
}

// =============================================================================
// Resolver
// =============================================================================

pub struct PermissionResolver {
    source: Arc<dyn PermissionSource>,
    cache: PermissionCache,
}

impl PermissionResolver {
    pub fn new(source: Arc<dyn PermissionSource>, config: PermissionCacheConfig) -> Self {
        Self {
            source,
            cache: PermissionCache::new(config),
        }
    }

    /// The full permission set of a role.
    pub async fn permissions(&self, role_id: &str) -> Result<Arc<HashSet<String>>> {
        if let Some(cached) = self.cache.get(role_id) {
            return Ok(cached);
        }

        let loaded: HashSet<String> = self
            .source
            .permissions_for_role(role_id)
            .await?
            .into_iter()
            .collect();
        self.cache.stats.record_load();
        debug!(role_id, permissions = loaded.len(), "Loaded role permissions");

        Ok(self.cache.insert(role_id.to_string(), loaded))
    }

    pub async fn has_permission(&self, role_id: &str, permission: &str) -> Result<bool> {
        Ok(self.permissions(role_id).await?.contains(permission))
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }
}

/// Spawn a background task that periodically sweeps expired cache entries.
pub fn spawn_permission_cleanup_task(
    resolver: Arc<PermissionResolver>,
) -> tokio::task::JoinHandle<()> {
    let interval = resolver.cache().config().cleanup_interval;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let removed = resolver.cache().cleanup();
            if removed > 0 {
                info!(removed, "Permission cache cleanup");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MeritError;
    use std::sync::atomic::AtomicUsize;

    /// Static role table that counts how often it is queried.
    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl PermissionSource for CountingSource {
        async fn permissions_for_role(&self, role_id: &str) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MeritError::Database("connection refused".into()));
            }
            Ok(match role_id {
                "student" => vec!["achievement:create".into(), "achievement:list:self".into()],
                _ => vec![],
            })
        }
    }

    fn resolver_with(source: Arc<CountingSource>, ttl: Duration) -> PermissionResolver {
        PermissionResolver::new(
            source,
            PermissionCacheConfig {
                ttl,
                cleanup_interval: ttl * 2,
            },
        )
    }

    #[tokio::test]
    async fn test_loads_full_set_once() {
        let source = Arc::new(CountingSource::new());
        let resolver = resolver_with(source.clone(), Duration::from_secs(300));

        assert!(resolver
            .has_permission("student", "achievement:create")
            .await
            .unwrap());
        assert!(resolver
            .has_permission("student", "achievement:list:self")
            .await
            .unwrap());
        assert!(!resolver
            .has_permission("student", "achievement:verify")
            .await
            .unwrap());

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        let stats = resolver.cache().stats();
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
    }

    #[tokio::test]
    async fn test_expired_entries_reload() {
        let source = Arc::new(CountingSource::new());
        let resolver = resolver_with(source.clone(), Duration::from_millis(20));

        resolver.permissions("student").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        resolver.permissions("student").await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.cache().stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_cleanup_sweeps_expired() {
        let source = Arc::new(CountingSource::new());
        let resolver = resolver_with(source, Duration::from_millis(10));

        resolver.permissions("student").await.unwrap();
        resolver.permissions("lecturer").await.unwrap();
        assert_eq!(resolver.cache().len(), 2);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(resolver.cache().cleanup(), 2);
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn test_source_errors_are_not_cached() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let resolver = resolver_with(source.clone(), Duration::from_secs(300));

        assert!(resolver.permissions("student").await.is_err());
        assert!(resolver.permissions("student").await.is_err());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let source = Arc::new(CountingSource::new());
        let resolver = resolver_with(source.clone(), Duration::from_secs(300));

        resolver.permissions("student").await.unwrap();
        assert!(resolver.cache().invalidate("student"));
        resolver.permissions("student").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
