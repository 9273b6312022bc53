use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 指标采样值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricValue {
    /// 指标名称
    pub name: String,

    /// 数值
    pub value: f64,

    /// 单位
    pub unit: String,

    /// 采样时间
    pub timestamp: DateTime<Utc>,

    /// 来源标签
    pub source: String,
}

impl MetricValue {
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
            timestamp: Utc::now(),
            source: "local".to_string(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// 采样是否仍在新鲜期内
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl_secs: u64) -> bool {
        now - self.timestamp < chrono::Duration::seconds(ttl_secs as i64)
    }
}
