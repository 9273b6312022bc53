use crate::alert::AlertMessage;
use crate::error::MonitorError;
use crate::metric::MetricValue;
use crate::model::Rule;
use async_trait::async_trait;

/// 规则存储抽象（外部 CRUD 仓库）
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// 加载全部规则，I/O 失败返回 Store 错误
    async fn load_rules(&self) -> Result<Vec<Rule>, MonitorError>;

    /// 保存规则（id <= 0 为新建，否则更新），返回规则 id
    async fn save_rule(&self, rule: Rule) -> Result<i64, MonitorError>;

    /// 删除规则，返回是否存在
    async fn delete_rule(&self, id: i64) -> Result<bool, MonitorError>;
}

/// 指标来源抽象
///
/// 指标不存在返回 Ok(None)，而不是错误；实现必须支持并发调用。
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn get_metric(&self, name: &str) -> Result<Option<MetricValue>, MonitorError>;
}

/// 告警落地抽象（持久化历史或发送通知）
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// 记录一条告警，返回不透明的记录 id
    async fn record(&self, alert: &AlertMessage, rule: &Rule) -> Result<String, MonitorError>;
}
