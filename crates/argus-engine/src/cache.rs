use argus_types::MetricValue;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// 指标缓存（按名称缓存最近一次采样，带新鲜度 TTL）
pub struct MetricCache {
    entries: Arc<RwLock<HashMap<String, MetricValue>>>,
    ttl_secs: u64,
}

impl MetricCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl_secs,
        }
    }

    /// 取出仍在新鲜期内的缓存值
    pub async fn get_fresh(&self, name: &str, now: DateTime<Utc>) -> Option<MetricValue> {
        let entries = self.entries.read().await;
        entries
            .get(name)
            .filter(|sample| sample.is_fresh(now, self.ttl_secs))
            .cloned()
    }

    pub async fn insert(&self, sample: MetricValue) {
        let mut entries = self.entries.write().await;
        entries.insert(sample.name.clone(), sample);
    }

    /// 清理过期条目，返回清理数量
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();

        entries.retain(|_, sample| sample.is_fresh(now, self.ttl_secs));

        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, remaining = entries.len(), "Evicted expired metric cache entries");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_hit_and_expiry() {
        let cache = MetricCache::new(60);
        let now = Utc::now();

        cache.insert(MetricValue::new("cpu", 42.0, "%")).await;
        assert!(cache.get_fresh("cpu", now).await.is_some());
        assert!(cache.get_fresh("mem", now).await.is_none());

        let later = now + chrono::Duration::seconds(120);
        assert!(cache.get_fresh("cpu", later).await.is_none());
    }

    #[tokio::test]
    async fn test_evict_expired() {
        let cache = MetricCache::new(60);
        let now = Utc::now();

        let mut stale = MetricValue::new("cpu", 42.0, "%");
        stale.timestamp = now - chrono::Duration::seconds(120);
        cache.insert(stale).await;
        cache.insert(MetricValue::new("mem", 55.0, "%")).await;

        assert_eq!(cache.evict_expired(now).await, 1);
        assert_eq!(cache.len().await, 1);
    }
}
