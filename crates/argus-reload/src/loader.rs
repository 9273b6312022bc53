use argus_types::{MonitorError, Rule, RuleRepository};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// 一次轮询得出的规则集差异
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDiff {
    pub added: Vec<i64>,
    pub modified: Vec<i64>,
    pub deleted: Vec<i64>,
}

impl RuleDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// 基于内容哈希对比新旧规则集
///
/// 纯函数：`snapshot` 为上次缓存的 id -> 哈希表，`current` 为本次加载结果。
pub fn diff_rules(snapshot: &HashMap<i64, String>, current: &[Rule]) -> RuleDiff {
    let mut diff = RuleDiff::default();

    for rule in current {
        match snapshot.get(&rule.id) {
            None => diff.added.push(rule.id),
            Some(cached_hash) => {
                if *cached_hash != rule.content_hash() {
                    diff.modified.push(rule.id);
                }
            }
        }
    }

    for id in snapshot.keys() {
        if !current.iter().any(|r| r.id == *id) {
            diff.deleted.push(*id);
        }
    }

    diff.added.sort_unstable();
    diff.modified.sort_unstable();
    diff.deleted.sort_unstable();
    diff
}

/// 热重载器
///
/// 周期性轮询规则仓库，用内容哈希检测变化；有变化时以完整规则列表
/// 通知所有订阅者（订阅者做整体重载，而非增量修补）。
pub struct HotLoader {
    repository: Arc<dyn RuleRepository>,

    /// 最近一次快照：rule_id -> 内容哈希
    snapshot: Arc<RwLock<HashMap<i64, String>>>,

    /// 订阅者（完整规则列表通道）
    subscribers: Arc<RwLock<Vec<mpsc::Sender<Vec<Rule>>>>>,

    /// 轮询与强制重载互斥：同一时刻只允许一次加载，后到者覆盖快照
    load_gate: Mutex<()>,

    reload_count: Arc<RwLock<u64>>,
    last_reload_at: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl HotLoader {
    pub fn new(repository: Arc<dyn RuleRepository>) -> Self {
        Self {
            repository,
            snapshot: Arc::new(RwLock::new(HashMap::new())),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            load_gate: Mutex::new(()),
            reload_count: Arc::new(RwLock::new(0)),
            last_reload_at: Arc::new(RwLock::new(None)),
        }
    }

    /// 订阅规则变更，收到的总是完整的当前规则列表
    pub async fn subscribe(&self) -> mpsc::Receiver<Vec<Rule>> {
        let (tx, rx) = mpsc::channel(8);
        self.subscribers.write().await.push(tx);
        rx
    }

    /// 轮询一次：加载、差异对比、必要时通知
    ///
    /// 仓库不可达只告警并保留最近一次成功快照，下一轮重试。
    pub async fn poll_once(&self) -> Option<RuleDiff> {
        let _gate = self.load_gate.lock().await;

        let rules = match self.repository.load_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "Rule store unreachable, keeping last-known-good snapshot");
                return None;
            }
        };

        let diff = {
            let snapshot = self.snapshot.read().await;
            diff_rules(&snapshot, &rules)
        };

        if diff.is_empty() {
            debug!("Rule poll found no changes");
            return Some(diff);
        }

        info!(
            added = diff.added.len(),
            modified = diff.modified.len(),
            deleted = diff.deleted.len(),
            "Rule changes detected, reloading"
        );

        self.apply(rules).await;
        Some(diff)
    }

    /// 强制重载：跳过差异对比，无条件重载并通知，返回应用的完整规则列表
    pub async fn force_reload(&self) -> Result<Vec<Rule>, MonitorError> {
        let _gate = self.load_gate.lock().await;

        let rules = self.repository.load_rules().await?;
        info!(rule_count = rules.len(), "Force reload");
        self.apply(rules.clone()).await;
        Ok(rules)
    }

    /// 覆盖快照并通知订阅者（调用方必须已持有 load_gate）
    async fn apply(&self, rules: Vec<Rule>) {
        {
            let mut snapshot = self.snapshot.write().await;
            *snapshot = rules
                .iter()
                .map(|r| (r.id, r.content_hash()))
                .collect();
        }

        *self.reload_count.write().await += 1;
        *self.last_reload_at.write().await = Some(Utc::now());

        let subscribers = self.subscribers.read().await;
        for tx in subscribers.iter() {
            if let Err(e) = tx.send(rules.clone()).await {
                warn!(error = %e, "Failed to notify reload subscriber");
            }
        }
    }

    pub async fn reload_count(&self) -> u64 {
        *self.reload_count.read().await
    }

    pub async fn last_reload_at(&self) -> Option<DateTime<Utc>> {
        *self.last_reload_at.read().await
    }

    pub async fn snapshot_len(&self) -> usize {
        self.snapshot.read().await.len()
    }
}
