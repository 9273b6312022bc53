use argus_alert::{DedupConfig, Deduplicator};
use argus_engine::{EngineConfig, RuleEngine};
use argus_monitor::{AlertMonitor, MonitorConfig};
use argus_reload::{HotLoader, MemoryRuleRepository};
use argus_types::{
    AlertMessage, AlertSink, CompareOp, MetricSource, MetricValue, MonitorError, Rule,
    RulePriority, RuleRepository,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// 模拟的 CPU 指标源：数值在 60% 与 95% 之间摆动
struct OscillatingSource {
    tick: AtomicU64,
}

#[async_trait]
impl MetricSource for OscillatingSource {
    async fn get_metric(&self, name: &str) -> Result<Option<MetricValue>, MonitorError> {
        if name != "cpu" {
            return Ok(None);
        }
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        let value = if tick % 4 < 2 { 95.0 } else { 60.0 };
        Ok(Some(MetricValue::new(name, value, "%").with_source("demo")))
    }
}

/// 把告警打印到终端的 sink
struct ConsoleSink;

#[async_trait]
impl AlertSink for ConsoleSink {
    async fn record(&self, alert: &AlertMessage, _rule: &Rule) -> Result<String, MonitorError> {
        println!("  📢 [{}] {}", alert.level, alert.message);
        Ok(format!("console-{}", alert.timestamp.timestamp_millis()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🚀 ARGUS - 告警监控核心演示\n");

    // 创建规则仓库并写入一条 CPU 规则
    let repo = Arc::new(MemoryRuleRepository::new());
    let rule = Rule {
        name: "cpu_high".to_string(),
        category: "system".to_string(),
        metric: "cpu".to_string(),
        operator: CompareOp::Gt,
        threshold: 80.0,
        unit: "%".to_string(),
        silence_secs: 3,
        priority: RulePriority::Medium,
        message_template: "CPU 使用率 {value}{unit} 超过阈值 {threshold}{unit}".to_string(),
        ..Default::default()
    };
    let rule_id = repo.save_rule(rule).await?;
    println!("✅ 规则已写入仓库: id={}", rule_id);

    // 组装核心协作者
    let dedup = Arc::new(Deduplicator::new(DedupConfig {
        dedup_window_secs: 2,
        ..Default::default()
    }));
    let engine = Arc::new(RuleEngine::new(
        Arc::new(OscillatingSource {
            tick: AtomicU64::new(0),
        }),
        Arc::new(ConsoleSink),
        dedup.clone(),
        EngineConfig {
            metric_ttl_secs: 0,
            ..Default::default()
        },
    ));
    let loader = Arc::new(HotLoader::new(repo.clone()));

    let monitor = AlertMonitor::new(
        engine,
        loader,
        dedup,
        MonitorConfig {
            check_interval_secs: 1,
            reload_interval_secs: 2,
            cleanup_interval_secs: 30,
            shutdown_timeout_secs: 5,
        },
    );

    // 启动后台任务
    monitor.start().await?;
    println!("✅ 监控器已启动，观察 10 秒...\n");

    sleep(Duration::from_secs(5)).await;

    // 运行中修改规则阈值，热重载自动生效
    println!("\n🔧 热更新: 阈值 80% -> 90%");
    let mut updated = repo.load_rules().await?.remove(0);
    updated.threshold = 90.0;
    repo.save_rule(updated).await?;

    sleep(Duration::from_secs(5)).await;

    // 查看状态
    let status = monitor.status().await;
    println!("\n📊 运行状态:");
    println!("  规则数: {}", status.rule_count);
    println!("  重载次数: {}", status.reload_count);
    println!("  告警总数: {}", status.stats.dedup.total);
    println!("  被抑制: {}", status.stats.dedup.suppressed);
    println!("  已恢复: {}", status.stats.dedup.resolved);

    // 优雅停止
    monitor.stop().await;
    println!("\n✅ 监控器已停止");

    Ok(())
}
