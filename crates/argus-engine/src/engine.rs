use crate::cache::MetricCache;
use crate::context::{RuleExecContext, RuleState};
use argus_alert::Deduplicator;
use argus_types::{
    AlertMessage, AlertSink, MetricSource, MetricValue, MonitorError, Rule, Severity,
    RECOVERY_MARKER,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// 限流窗口长度（秒）
const RATE_LIMIT_WINDOW_SECS: i64 = 3600;

const ALL_SEVERITIES: [Severity; 4] = [
    Severity::Info,
    Severity::Warning,
    Severity::Error,
    Severity::Critical,
];

/// 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 指标缓存新鲜期（秒）
    pub metric_ttl_secs: u64,

    /// 执行上下文闲置过期时长（秒）
    pub context_expiry_secs: u64,

    /// 指标拉取超时（毫秒），超时按无值处理
    pub fetch_timeout_ms: u64,

    /// 条件恢复时是否发出恢复通知
    pub recovery_alerts: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            metric_ttl_secs: 60,
            context_expiry_secs: 3600,
            fetch_timeout_ms: 3000,
            recovery_alerts: true,
        }
    }
}

/// 引擎运行计数
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngineCounters {
    /// 求值轮次
    pub ticks: u64,

    /// 单规则求值失败次数
    pub execution_errors: u64,

    /// 告警下发失败次数
    pub dispatch_errors: u64,
}

/// 规则引擎
///
/// 每轮对快照中的全部规则求值；单规则失败只标记该规则为 ERROR，
/// 不会中断整轮循环。规则快照只读，由热重载整体替换。
pub struct RuleEngine {
    config: EngineConfig,
    source: Arc<dyn MetricSource>,
    sink: Arc<dyn AlertSink>,
    dedup: Arc<Deduplicator>,

    /// 规则快照
    rules: Arc<RwLock<HashMap<i64, Rule>>>,

    /// 规则状态表
    states: Arc<RwLock<HashMap<i64, RuleState>>>,

    /// 执行上下文（按规则 id 懒创建）
    contexts: Arc<RwLock<HashMap<i64, RuleExecContext>>>,

    /// 指标缓存
    cache: MetricCache,

    /// 限流计数器 (rule_id -> 发出时间戳)
    rate_limits: Arc<RwLock<HashMap<i64, Vec<i64>>>>,

    counters: Arc<RwLock<EngineCounters>>,
}

impl RuleEngine {
    pub fn new(
        source: Arc<dyn MetricSource>,
        sink: Arc<dyn AlertSink>,
        dedup: Arc<Deduplicator>,
        config: EngineConfig,
    ) -> Self {
        let cache = MetricCache::new(config.metric_ttl_secs);
        Self {
            config,
            source,
            sink,
            dedup,
            rules: Arc::new(RwLock::new(HashMap::new())),
            states: Arc::new(RwLock::new(HashMap::new())),
            contexts: Arc::new(RwLock::new(HashMap::new())),
            cache,
            rate_limits: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(RwLock::new(EngineCounters::default())),
        }
    }

    /// 整体替换规则快照并重建状态表
    ///
    /// 仍然存在的规则 id 保留其执行上下文（触发历史不因无关重载清零）。
    pub async fn reload(&self, rules: Vec<Rule>) {
        let mut rule_map = self.rules.write().await;
        let mut states = self.states.write().await;
        let mut contexts = self.contexts.write().await;

        rule_map.clear();
        states.clear();

        for rule in rules {
            let state = if rule.enabled {
                RuleState::Loading
            } else {
                RuleState::Inactive
            };
            states.insert(rule.id, state);
            rule_map.insert(rule.id, rule);
        }

        contexts.retain(|id, _| rule_map.contains_key(id));

        info!(rule_count = rule_map.len(), "Rule snapshot reloaded");
    }

    /// 一轮完整求值
    pub async fn evaluate_all(&self) {
        let snapshot: Vec<Rule> = {
            let rules = self.rules.read().await;
            rules.values().cloned().collect()
        };

        for rule in &snapshot {
            match self.evaluate_rule(rule).await {
                Ok(_) => {
                    let state = if rule.enabled {
                        RuleState::Active
                    } else {
                        RuleState::Inactive
                    };
                    self.set_state_if_present(rule.id, state).await;
                }
                Err(e) => {
                    error!(rule_id = rule.id, error = %e, "Rule evaluation failed");
                    self.set_state_if_present(rule.id, RuleState::Error).await;
                    self.counters.write().await.execution_errors += 1;
                }
            }
        }

        self.counters.write().await.ticks += 1;
    }

    /// 写回求值后的状态；规则在求值期间被并发重载删除时不得复活其状态条目
    ///
    /// 锁序与 reload 一致：先 rules 后 states。
    async fn set_state_if_present(&self, rule_id: i64, state: RuleState) {
        let rules = self.rules.read().await;
        if rules.contains_key(&rule_id) {
            self.states.write().await.insert(rule_id, state);
        } else {
            debug!(rule_id, "Rule removed during evaluation, state write skipped");
        }
    }

    /// 立即检查某条规则（None 为全部）
    pub async fn force_check(&self, rule_id: Option<i64>) {
        match rule_id {
            None => self.evaluate_all().await,
            Some(id) => {
                let rule = self.rules.read().await.get(&id).cloned();
                let Some(rule) = rule else {
                    warn!(rule_id = id, "Force check requested for unknown rule");
                    return;
                };

                if let Err(e) = self.evaluate_rule(&rule).await {
                    error!(rule_id = id, error = %e, "Forced rule check failed");
                    self.set_state_if_present(id, RuleState::Error).await;
                    self.counters.write().await.execution_errors += 1;
                } else {
                    let state = if rule.enabled {
                        RuleState::Active
                    } else {
                        RuleState::Inactive
                    };
                    self.set_state_if_present(id, state).await;
                }
            }
        }
    }

    /// 求值单条规则，返回是否发出了告警
    pub async fn evaluate_rule(&self, rule: &Rule) -> Result<bool, MonitorError> {
        let now = Utc::now();

        if !rule.enabled {
            return Ok(false);
        }

        // 静默期内跳过，不触碰连续命中计数
        {
            let mut contexts = self.contexts.write().await;
            let ctx = contexts
                .entry(rule.id)
                .or_insert_with(|| RuleExecContext::new(rule.id));
            ctx.last_eval = now;

            if ctx.in_silence(now, rule.silence_secs) {
                ctx.silenced = true;
                debug!(rule_id = rule.id, "Rule silenced, skipping evaluation");
                return Ok(false);
            }
            ctx.silenced = false;
        }

        let Some(sample) = self.fetch_metric(&rule.metric, now).await? else {
            debug!(rule_id = rule.id, metric = %rule.metric, "No metric value available, skipping");
            return Ok(false);
        };

        let triggered = rule.operator.compare(sample.value, rule.threshold);

        if triggered {
            self.handle_trigger(rule, &sample, now).await
        } else {
            self.handle_clear(rule, &sample).await?;
            Ok(false)
        }
    }

    /// 条件命中路径：累计连续命中，满足持续时长后构造告警并送交去重
    async fn handle_trigger(
        &self,
        rule: &Rule,
        sample: &MetricValue,
        now: DateTime<Utc>,
    ) -> Result<bool, MonitorError> {
        let satisfied = {
            let mut contexts = self.contexts.write().await;
            let ctx = contexts
                .entry(rule.id)
                .or_insert_with(|| RuleExecContext::new(rule.id));
            ctx.consecutive_triggers = ctx.consecutive_triggers.saturating_add(1);
            ctx.duration_satisfied(rule.duration_secs, rule.check_interval_secs)
        };

        if !satisfied {
            debug!(
                rule_id = rule.id,
                "Condition holds but duration requirement not yet met"
            );
            return Ok(false);
        }

        if !self.check_rate_limit(rule, now).await {
            warn!(rule_id = rule.id, "Alert rate limit exceeded for window");
            return Ok(false);
        }

        let level = Severity::classify(rule.priority, sample.value, rule.threshold);
        let alert = AlertMessage::new(
            level,
            rule.category.clone(),
            rule.render_message(sample.value),
            rule.metric.clone(),
            sample.value,
            rule.threshold,
        );

        let emitted = self.dedup.process(&alert).await;
        if !emitted {
            return Ok(false);
        }

        info!(
            rule_id = rule.id,
            metric = %rule.metric,
            value = sample.value,
            level = %level,
            "Alert emitted"
        );

        self.dispatch(&alert, rule).await;

        {
            let mut contexts = self.contexts.write().await;
            if let Some(ctx) = contexts.get_mut(&rule.id) {
                ctx.last_trigger = Some(now);
                ctx.trigger_count += 1;
            }
        }
        if rule.max_alerts_per_window > 0 {
            self.record_rate_limit(rule.id, now).await;
        }

        Ok(true)
    }

    /// 条件未命中路径：清零连续计数，必要时发出恢复通知
    async fn handle_clear(&self, rule: &Rule, sample: &MetricValue) -> Result<(), MonitorError> {
        {
            let mut contexts = self.contexts.write().await;
            if let Some(ctx) = contexts.get_mut(&rule.id) {
                ctx.consecutive_triggers = 0;
            }
        }

        if !self.config.recovery_alerts {
            return Ok(());
        }

        // 去重键包含级别，逐级别探测活跃告警
        for level in ALL_SEVERITIES {
            let key = format!("{}:{}:{}", rule.category, rule.metric, level);
            if !self.dedup.is_active(&key).await {
                continue;
            }

            let message = format!(
                "{}: {} = {:.2}{} back within threshold {}",
                rule.name, rule.metric, sample.value, rule.unit, RECOVERY_MARKER
            );
            let recovery = AlertMessage::new(
                level,
                rule.category.clone(),
                message,
                rule.metric.clone(),
                sample.value,
                rule.threshold,
            )
            .into_recovery();

            if self.dedup.process(&recovery).await {
                info!(rule_id = rule.id, key = %key, "Recovery alert emitted");
                self.dispatch(&recovery, rule).await;
            }
        }

        Ok(())
    }

    /// 送交 AlertSink；失败只计数记录，不影响触发语义
    async fn dispatch(&self, alert: &AlertMessage, rule: &Rule) {
        match self.sink.record(alert, rule).await {
            Ok(record_id) => {
                debug!(rule_id = rule.id, record_id = %record_id, "Alert recorded by sink");
            }
            Err(e) => {
                warn!(rule_id = rule.id, error = %e, "Alert sink dispatch failed");
                self.counters.write().await.dispatch_errors += 1;
            }
        }
    }

    /// 拉取指标：先查缓存，未命中或过期时带超时拉取并回填
    async fn fetch_metric(
        &self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MetricValue>, MonitorError> {
        if let Some(cached) = self.cache.get_fresh(name, now).await {
            return Ok(Some(cached));
        }

        let timeout = Duration::from_millis(self.config.fetch_timeout_ms);
        match tokio::time::timeout(timeout, self.source.get_metric(name)).await {
            Ok(Ok(Some(sample))) => {
                self.cache.insert(sample.clone()).await;
                Ok(Some(sample))
            }
            Ok(Ok(None)) => Ok(None),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                // 超时按无值处理，而不是错误
                debug!(metric = %name, "Metric fetch timed out");
                Ok(None)
            }
        }
    }

    /// 窗口限流：固定一小时窗口内最多发出 max_alerts_per_window 条（0 不限）
    async fn check_rate_limit(&self, rule: &Rule, now: DateTime<Utc>) -> bool {
        if rule.max_alerts_per_window == 0 {
            return true;
        }

        let mut limits = self.rate_limits.write().await;
        let window_start = now.timestamp() - RATE_LIMIT_WINDOW_SECS;
        let timestamps = limits.entry(rule.id).or_default();

        timestamps.retain(|&ts| ts > window_start);
        timestamps.len() < rule.max_alerts_per_window as usize
    }

    async fn record_rate_limit(&self, rule_id: i64, now: DateTime<Utc>) {
        let mut limits = self.rate_limits.write().await;
        limits.entry(rule_id).or_default().push(now.timestamp());
    }

    /// 清理过期缓存、闲置上下文与限流记录
    pub async fn cleanup(&self) {
        let now = Utc::now();

        self.cache.evict_expired(now).await;

        {
            let mut contexts = self.contexts.write().await;
            let before = contexts.len();
            contexts.retain(|_, ctx| !ctx.is_stale(now, self.config.context_expiry_secs));

            let dropped = before - contexts.len();
            if dropped > 0 {
                debug!(dropped, "Discarded stale rule execution contexts");
            }
        }

        // 限流表：丢弃已删除规则的条目，裁剪窗口外的时间戳
        let rules = self.rules.read().await;
        let mut limits = self.rate_limits.write().await;
        let window_start = now.timestamp() - RATE_LIMIT_WINDOW_SECS;
        limits.retain(|rule_id, timestamps| {
            if !rules.contains_key(rule_id) {
                return false;
            }
            timestamps.retain(|&ts| ts > window_start);
            !timestamps.is_empty()
        });
    }

    pub async fn rule_count(&self) -> usize {
        self.rules.read().await.len()
    }

    pub async fn active_rule_count(&self) -> usize {
        self.rules.read().await.values().filter(|r| r.enabled).count()
    }

    pub async fn rule_state(&self, rule_id: i64) -> Option<RuleState> {
        self.states.read().await.get(&rule_id).copied()
    }

    pub async fn context(&self, rule_id: i64) -> Option<RuleExecContext> {
        self.contexts.read().await.get(&rule_id).cloned()
    }

    pub async fn counters(&self) -> EngineCounters {
        *self.counters.read().await
    }
}
