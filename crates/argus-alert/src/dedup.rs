use argus_types::AlertMessage;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 去重配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// 去重窗口（秒）
    pub dedup_window_secs: i64,

    /// 活跃告警过期时长（秒），超过且无更新的条目被清理
    pub active_expiry_secs: i64,

    /// 历史环形缓冲区容量
    pub max_history: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: 300,
            active_expiry_secs: 3600,
            max_history: 1000,
        }
    }
}

/// 去重统计
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DedupStats {
    /// 处理过的告警总数
    pub total: u64,

    /// 被抑制的数量
    pub suppressed: u64,

    /// 已恢复的数量
    pub resolved: u64,

    /// 当前活跃数量（恒等于活跃表大小）
    pub active: usize,
}

struct DedupInner {
    active: HashMap<String, AlertMessage>,
    history: VecDeque<AlertMessage>,
    total: u64,
    suppressed: u64,
    resolved: u64,
}

/// 告警去重服务
///
/// 告警是否对外发出的唯一裁决者：按去重键跟踪活跃告警，
/// 识别恢复通知并解除对应的活跃条目。
pub struct Deduplicator {
    config: DedupConfig,
    inner: Arc<RwLock<DedupInner>>,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            inner: Arc::new(RwLock::new(DedupInner {
                active: HashMap::new(),
                history: VecDeque::new(),
                total: 0,
                suppressed: 0,
                resolved: 0,
            })),
        }
    }

    /// 裁决一条候选告警是否发出
    ///
    /// 恢复通知先于去重窗口判断：恢复与其解除的告警共享去重键，
    /// 否则窗口内的恢复会被错误抑制。恢复通知总是发出。
    pub async fn process(&self, alert: &AlertMessage) -> bool {
        let key = alert.dedup_key();
        let mut inner = self.inner.write().await;

        inner.total += 1;
        Self::housekeeping(&mut inner, &self.config);

        if alert.is_recovery() {
            if let Some(mut existing) = inner.active.remove(&key) {
                existing.resolve();
                inner.resolved += 1;

                info!(key = %key, "Active alert resolved by recovery");
                Self::push_history(&mut inner, existing, self.config.max_history);
            }
            return true;
        }

        let window = Duration::seconds(self.config.dedup_window_secs);
        let duplicate = inner
            .active
            .get(&key)
            .is_some_and(|existing| alert.timestamp - existing.timestamp < window);

        if duplicate {
            inner.suppressed += 1;
            debug!(key = %key, "Duplicate alert suppressed (within dedup window)");
            return false;
        }

        inner.active.insert(key.clone(), alert.clone());
        Self::push_history(&mut inner, alert.clone(), self.config.max_history);

        debug!(key = %key, level = %alert.level, "Alert accepted as active");
        true
    }

    /// 某个去重键当前是否活跃
    pub async fn is_active(&self, key: &str) -> bool {
        self.inner.read().await.active.contains_key(key)
    }

    /// 外部显式解除某个活跃告警
    pub async fn resolve(&self, key: &str) -> bool {
        let mut inner = self.inner.write().await;

        if let Some(mut existing) = inner.active.remove(key) {
            existing.resolve();
            inner.resolved += 1;
            info!(key = %key, "Active alert resolved explicitly");
            Self::push_history(&mut inner, existing, self.config.max_history);
            true
        } else {
            false
        }
    }

    /// 当前活跃告警列表
    pub async fn active_alerts(&self) -> Vec<AlertMessage> {
        self.inner.read().await.active.values().cloned().collect()
    }

    /// 最近的告警历史（倒序）
    pub async fn history(&self, limit: usize) -> Vec<AlertMessage> {
        let inner = self.inner.read().await;
        inner.history.iter().rev().take(limit).cloned().collect()
    }

    /// 统计快照
    pub async fn stats(&self) -> DedupStats {
        let inner = self.inner.read().await;
        DedupStats {
            total: inner.total,
            suppressed: inner.suppressed,
            resolved: inner.resolved,
            active: inner.active.len(),
        }
    }

    fn push_history(inner: &mut DedupInner, alert: AlertMessage, max_history: usize) {
        inner.history.push_back(alert);
        while inner.history.len() > max_history {
            inner.history.pop_front();
        }
    }

    fn housekeeping(inner: &mut DedupInner, config: &DedupConfig) {
        let now = Utc::now();
        let expiry = Duration::seconds(config.active_expiry_secs);
        let before = inner.active.len();

        inner.active.retain(|_, alert| now - alert.timestamp < expiry);

        let purged = before - inner.active.len();
        if purged > 0 {
            debug!(purged, "Purged stale active alerts");
        }

        while inner.history.len() > config.max_history {
            inner.history.pop_front();
        }
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_types::Severity;

    fn alert(level: Severity, value: f64) -> AlertMessage {
        AlertMessage::new(
            level,
            "system".to_string(),
            "cpu high".to_string(),
            "cpu".to_string(),
            value,
            80.0,
        )
    }

    #[tokio::test]
    async fn test_duplicate_suppressed_within_window() {
        let dedup = Deduplicator::default();

        assert!(dedup.process(&alert(Severity::Warning, 90.0)).await);
        assert!(!dedup.process(&alert(Severity::Warning, 91.0)).await);

        let stats = dedup.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(stats.active, 1);
    }

    #[tokio::test]
    async fn test_different_level_not_suppressed() {
        let dedup = Deduplicator::default();

        assert!(dedup.process(&alert(Severity::Warning, 90.0)).await);
        // 级别不同 => 去重键不同
        assert!(dedup.process(&alert(Severity::Error, 130.0)).await);

        assert_eq!(dedup.stats().await.active, 2);
    }

    #[tokio::test]
    async fn test_recovery_always_emits_and_clears_active() {
        let dedup = Deduplicator::default();

        let fired = alert(Severity::Warning, 90.0);
        assert!(dedup.process(&fired).await);
        assert!(dedup.is_active(&fired.dedup_key()).await);

        // 窗口内的恢复仍然发出
        let recovery = alert(Severity::Warning, 50.0).into_recovery();
        assert!(dedup.process(&recovery).await);
        assert!(!dedup.is_active(&fired.dedup_key()).await);

        let stats = dedup.stats().await;
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.active, dedup.active_alerts().await.len());
    }

    #[tokio::test]
    async fn test_recovery_without_active_still_emits() {
        let dedup = Deduplicator::default();

        let recovery = alert(Severity::Warning, 50.0).into_recovery();
        assert!(dedup.process(&recovery).await);
        assert_eq!(dedup.stats().await.resolved, 0);
    }

    #[tokio::test]
    async fn test_reemit_after_window_expires() {
        let dedup = Deduplicator::new(DedupConfig {
            dedup_window_secs: 60,
            ..Default::default()
        });

        let mut first = alert(Severity::Warning, 90.0);
        first.timestamp = Utc::now() - Duration::seconds(120);
        assert!(dedup.process(&first).await);

        // 超出窗口的同键告警重新发出
        assert!(dedup.process(&alert(Severity::Warning, 91.0)).await);
        assert_eq!(dedup.stats().await.suppressed, 0);
    }

    #[tokio::test]
    async fn test_history_bounded() {
        let dedup = Deduplicator::new(DedupConfig {
            dedup_window_secs: 0,
            max_history: 5,
            ..Default::default()
        });

        for i in 0..10 {
            dedup.process(&alert(Severity::Info, 81.0 + i as f64)).await;
        }

        let history = dedup.history(100).await;
        assert_eq!(history.len(), 5);
        // 保留的是最近的条目
        assert_eq!(history[0].value, 90.0);
    }

    #[tokio::test]
    async fn test_stale_active_purged() {
        let dedup = Deduplicator::new(DedupConfig {
            active_expiry_secs: 3600,
            ..Default::default()
        });

        let mut stale = alert(Severity::Warning, 90.0);
        stale.timestamp = Utc::now() - Duration::seconds(7200);
        dedup.process(&stale).await;

        // 下一次 process 触发清理
        let other = AlertMessage::new(
            Severity::Info,
            "system".to_string(),
            "mem".to_string(),
            "memory".to_string(),
            70.0,
            60.0,
        );
        dedup.process(&other).await;

        let stats = dedup.stats().await;
        assert_eq!(stats.active, 1);
        assert!(!dedup.is_active(&stale.dedup_key()).await);
    }

    #[tokio::test]
    async fn test_explicit_resolve() {
        let dedup = Deduplicator::default();

        let fired = alert(Severity::Warning, 90.0);
        dedup.process(&fired).await;

        assert!(dedup.resolve(&fired.dedup_key()).await);
        assert!(!dedup.resolve(&fired.dedup_key()).await);
        assert_eq!(dedup.stats().await.resolved, 1);
    }
}
