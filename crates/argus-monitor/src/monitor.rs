use argus_alert::{DedupStats, Deduplicator};
use argus_engine::{EngineCounters, RuleEngine, RuleState};
use argus_reload::HotLoader;
use argus_types::MonitorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// 监控器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// 规则求值间隔（秒）
    pub check_interval_secs: u64,

    /// 热重载轮询间隔（秒）
    pub reload_interval_secs: u64,

    /// 清理循环间隔（秒）
    pub cleanup_interval_secs: u64,

    /// 停止时等待后台任务退出的上限（秒）
    pub shutdown_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            reload_interval_secs: 5,
            cleanup_interval_secs: 60,
            shutdown_timeout_secs: 5,
        }
    }
}

/// 运行统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStats {
    pub dedup: DedupStats,
    pub engine: EngineCounters,
}

/// 状态快照（调用方轮询此结构，而非接收异常）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub rule_count: usize,
    pub active_rule_count: usize,
    pub reload_count: u64,
    pub last_reload_at: Option<DateTime<Utc>>,
    pub stats: MonitorStats,
}

/// 告警监控器
///
/// 拥有三个常驻后台任务：规则求值循环、热重载轮询循环、清理循环，
/// 外加一个把重载结果灌入引擎的转发任务。所有协作者显式注入。
pub struct AlertMonitor {
    engine: Arc<RuleEngine>,
    loader: Arc<HotLoader>,
    dedup: Arc<Deduplicator>,
    config: MonitorConfig,

    running: AtomicBool,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AlertMonitor {
    pub fn new(
        engine: Arc<RuleEngine>,
        loader: Arc<HotLoader>,
        dedup: Arc<Deduplicator>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            engine,
            loader,
            dedup,
            config,
            running: AtomicBool::new(false),
            shutdown_tx: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// 启动全部后台任务（幂等，重复调用为空操作）
    pub async fn start(&self) -> Result<(), MonitorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Alert monitor already running");
            return Ok(());
        }

        let (tx, rx) = watch::channel(false);
        *self.shutdown_tx.lock().await = Some(tx);

        let mut tasks = self.tasks.lock().await;

        // 重载结果转发：订阅必须先于首次加载建立
        let mut rules_rx = self.loader.subscribe().await;
        let engine = self.engine.clone();
        let mut shutdown = rx.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = rules_rx.recv() => match received {
                        Some(rules) => engine.reload(rules).await,
                        None => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Reload forwarding task stopped");
        }));

        // 初始装载直接灌入引擎，保证首轮求值就能看到规则；
        // 存储暂时不可达不阻止启动，轮询循环会重试
        match self.loader.force_reload().await {
            Ok(rules) => self.engine.reload(rules).await,
            Err(e) => warn!(error = %e, "Initial rule load failed, will retry on poll"),
        }

        // 求值循环
        let engine = self.engine.clone();
        let mut shutdown = rx.clone();
        let interval = Duration::from_secs(self.config.check_interval_secs);
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => engine.evaluate_all().await,
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Rule monitor loop stopped");
        }));

        // 热重载轮询循环
        let loader = self.loader.clone();
        let mut shutdown = rx.clone();
        let interval = Duration::from_secs(self.config.reload_interval_secs);
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => { loader.poll_once().await; }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Hot reload loop stopped");
        }));

        // 清理循环
        let engine = self.engine.clone();
        let mut shutdown = rx;
        let interval = Duration::from_secs(self.config.cleanup_interval_secs);
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => engine.cleanup().await,
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Cleanup loop stopped");
        }));

        info!(task_count = tasks.len(), "Alert monitor started");
        Ok(())
    }

    /// 停止全部后台任务
    ///
    /// 每个任务的退出等待受 shutdown_timeout 约束，超时任务被记录并中止，
    /// 调用方永远不会被卡死的任务挂住。
    pub async fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(true);
        }

        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        let mut tasks = self.tasks.lock().await;

        for mut handle in tasks.drain(..) {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!("Background task did not stop within timeout, aborting");
                    handle.abort();
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Alert monitor stopped");
    }

    /// 手动"立即应用"：跳过差异对比直接重载
    pub async fn reload_now(&self) -> Result<(), MonitorError> {
        let rules = self.loader.force_reload().await?;
        self.engine.reload(rules).await;
        Ok(())
    }

    /// 立即检查某条规则（None 为全部）
    pub async fn force_rule_check(&self, rule_id: Option<i64>) {
        self.engine.force_check(rule_id).await;
    }

    pub async fn rule_state(&self, rule_id: i64) -> Option<RuleState> {
        self.engine.rule_state(rule_id).await
    }

    /// 状态快照
    pub async fn status(&self) -> MonitorStatus {
        MonitorStatus {
            running: self.running.load(Ordering::SeqCst),
            rule_count: self.engine.rule_count().await,
            active_rule_count: self.engine.active_rule_count().await,
            reload_count: self.loader.reload_count().await,
            last_reload_at: self.loader.last_reload_at().await,
            stats: MonitorStats {
                dedup: self.dedup.stats().await,
                engine: self.engine.counters().await,
            },
        }
    }
}
