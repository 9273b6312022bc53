use crate::model::RulePriority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 恢复告警的消息标记
pub const RECOVERY_MARKER: &str = "[recovered]";

/// 告警级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// 根据规则优先级与超限幅度推导级别
    ///
    /// 超限幅度 = |value - threshold| / |threshold|；阈值为 0 时视为完全超限。
    /// Critical 不会被自动推导，仅供外部调用方直接构造。
    pub fn classify(priority: RulePriority, value: f64, threshold: f64) -> Self {
        let overshoot = (value - threshold).abs() / threshold.abs().max(f64::EPSILON);

        if overshoot >= 0.5 || priority == RulePriority::High {
            Severity::Error
        } else if overshoot >= 0.2 || priority == RulePriority::Medium {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// 告警消息
///
/// 身份由去重键（分类 + 指标 + 级别）决定，不使用随机 ID。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMessage {
    /// 触发时间
    pub timestamp: DateTime<Utc>,

    /// 告警级别
    pub level: Severity,

    /// 告警分类
    pub category: String,

    /// 可读消息
    pub message: String,

    /// 指标名称
    pub metric: String,

    /// 当前值
    pub value: f64,

    /// 阈值
    pub threshold: f64,

    /// 是否恢复通知
    pub recovery: bool,

    /// 是否已解决
    pub resolved: bool,

    /// 解决时间
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertMessage {
    pub fn new(
        level: Severity,
        category: String,
        message: String,
        metric: String,
        value: f64,
        threshold: f64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            category,
            message,
            metric,
            value,
            threshold,
            recovery: false,
            resolved: false,
            resolved_at: None,
        }
    }

    /// 去重键：分类 + 指标 + 级别
    pub fn dedup_key(&self) -> String {
        format!("{}:{}:{}", self.category, self.metric, self.level)
    }

    /// 是否为恢复通知（显式标记或消息携带恢复标记）
    pub fn is_recovery(&self) -> bool {
        self.recovery || self.message.contains(RECOVERY_MARKER)
    }

    /// 标记为已解决
    pub fn resolve(&mut self) {
        self.resolved = true;
        self.resolved_at = Some(Utc::now());
    }

    pub fn into_recovery(mut self) -> Self {
        self.recovery = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_alert() -> AlertMessage {
        AlertMessage::new(
            Severity::Warning,
            "system".to_string(),
            "cpu high".to_string(),
            "cpu".to_string(),
            92.0,
            80.0,
        )
    }

    #[test]
    fn test_dedup_key_identity() {
        let a = sample_alert();
        let b = sample_alert();
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_eq!(a.dedup_key(), "system:cpu:WARNING");
    }

    #[test]
    fn test_recovery_marker() {
        let mut alert = sample_alert();
        assert!(!alert.is_recovery());

        alert.message = format!("cpu back to normal {}", RECOVERY_MARKER);
        assert!(alert.is_recovery());

        let flagged = sample_alert().into_recovery();
        assert!(flagged.is_recovery());
    }

    #[test]
    fn test_severity_classify() {
        // 超限 >= 50% => Error
        assert_eq!(
            Severity::classify(RulePriority::Low, 130.0, 80.0),
            Severity::Error
        );
        // 高优先级直接 Error
        assert_eq!(
            Severity::classify(RulePriority::High, 81.0, 80.0),
            Severity::Error
        );
        // 超限 >= 20% => Warning
        assert_eq!(
            Severity::classify(RulePriority::Low, 100.0, 80.0),
            Severity::Warning
        );
        // 中优先级小幅超限 => Warning
        assert_eq!(
            Severity::classify(RulePriority::Medium, 81.0, 80.0),
            Severity::Warning
        );
        // 低优先级小幅超限 => Info
        assert_eq!(
            Severity::classify(RulePriority::Low, 81.0, 80.0),
            Severity::Info
        );
    }

    #[test]
    fn test_resolve_sets_timestamp() {
        let mut alert = sample_alert();
        alert.resolve();
        assert!(alert.resolved);
        assert!(alert.resolved_at.is_some());
    }
}
