//! Instance-type cache (§5, §9): shared across every controller task,
//! concurrent `get`, fetch-once (single-flight) on miss, keyed by
//! `(region, instanceType)`. Its absence affects only latency, never
//! correctness, so callers treat a fetch failure as "skip the enrichment".

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceTypeKey {
    pub region: String,
    pub instance_type: String,
}

#[derive(Debug, Clone)]
pub struct InstanceTypeInfo {
    pub memory_mib: u64,
    pub vcpus: u32,
}

/// Static fallback table for the instance types this fleet's size classes
/// actually use. Cloud-provider instance-type APIs are out of scope
/// (§1 non-goal: cloud-provider-specific infrastructure creation); this is
/// the `fetch` callers hand to `get_or_fetch` when no cloud client exists.
/// Unknown instance types simply miss the cache.
pub fn lookup_instance_memory(instance_type: &str) -> Option<InstanceTypeInfo> {
    let (memory_mib, vcpus) = match instance_type {
        "m5.large" | "m6i.large" => (8192, 2),
        "m5.xlarge" | "m6i.xlarge" => (16384, 4),
        "m5.2xlarge" | "m6i.2xlarge" => (32768, 8),
        "m5.4xlarge" | "m6i.4xlarge" => (65536, 16),
        _ => return None,
    };
    Some(InstanceTypeInfo { memory_mib, vcpus })
}

/// A bounded, single-flight, concurrent cache. `fetch` performs the actual
/// lookup (a cloud API call in production, a fixture in tests) exactly once
/// per key no matter how many callers race to request it.
pub struct InstanceTypeCache {
    entries: DashMap<InstanceTypeKey, InstanceTypeInfo>,
    in_flight: Mutex<std::collections::HashMap<InstanceTypeKey, broadcast::Sender<InstanceTypeInfo>>>,
}

impl InstanceTypeCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            in_flight: Mutex::new(std::collections::HashMap::new()),
        })
    }

    pub fn get_cached(&self, key: &InstanceTypeKey) -> Option<InstanceTypeInfo> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    /// Returns the cached value, or runs `fetch` exactly once per key even
    /// under concurrent callers (single-flight), caching the result.
    pub async fn get_or_fetch<F, Fut>(&self, key: InstanceTypeKey, fetch: F) -> Option<InstanceTypeInfo>
    where
        F: FnOnce(InstanceTypeKey) -> Fut,
        Fut: std::future::Future<Output = Option<InstanceTypeInfo>>,
    {
        if let Some(v) = self.get_cached(&key) {
            return Some(v);
        }

        let mut guard = self.in_flight.lock().await;
        if let Some(tx) = guard.get(&key) {
            let mut rx = tx.subscribe();
            drop(guard);
            return rx.recv().await.ok();
        }

        let (tx, _rx) = broadcast::channel(1);
        guard.insert(key.clone(), tx.clone());
        drop(guard);

        let result = fetch(key.clone()).await;
        if let Some(ref info) = result {
            self.entries.insert(key.clone(), info.clone());
        }
        let _ = result.as_ref().map(|info| tx.send(info.clone()));

        self.in_flight.lock().await.remove(&key);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_misses_fetch_once() {
        let cache = InstanceTypeCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = InstanceTypeKey {
            region: "us-east-1".into(),
            instance_type: "m5.xlarge".into(),
        };

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch(key, |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Some(InstanceTypeInfo { memory_mib: 16384, vcpus: 4 })
                    })
                    .await
            }));
        }

        for h in handles {
            let info = h.await.unwrap();
            assert_eq!(info.unwrap().memory_mib, 16384);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_hit_skips_fetch() {
        let cache = InstanceTypeCache::new();
        let key = InstanceTypeKey { region: "eu-west-1".into(), instance_type: "m6i.large".into() };
        cache
            .get_or_fetch(key.clone(), |_| async { Some(InstanceTypeInfo { memory_mib: 8192, vcpus: 2 }) })
            .await;

        let calls = AtomicUsize::new(0);
        let info = cache
            .get_or_fetch(key, |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Some(InstanceTypeInfo { memory_mib: 0, vcpus: 0 })
            })
            .await;

        assert_eq!(info.unwrap().memory_mib, 8192);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn lookup_instance_memory_known_and_unknown_shapes() {
        assert_eq!(lookup_instance_memory("m5.xlarge").unwrap().memory_mib, 16384);
        assert!(lookup_instance_memory("c7g.medium").is_none());
    }
}
