use crate::error::MonitorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// 浮点相等比较的容差
pub const FLOAT_EPSILON: f64 = 1e-3;

/// 比较操作符（封闭枚举，加载规则时解析，拒绝未知操作符）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CompareOp {
    /// 按操作符比较指标值与阈值，等值比较使用 1e-3 容差
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            CompareOp::Gt => value > threshold,
            CompareOp::Ge => value >= threshold,
            CompareOp::Lt => value < threshold,
            CompareOp::Le => value <= threshold,
            CompareOp::Eq => (value - threshold).abs() < FLOAT_EPSILON,
            CompareOp::Ne => (value - threshold).abs() >= FLOAT_EPSILON,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompareOp {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(CompareOp::Gt),
            ">=" => Ok(CompareOp::Ge),
            "<" => Ok(CompareOp::Lt),
            "<=" => Ok(CompareOp::Le),
            "==" => Ok(CompareOp::Eq),
            "!=" => Ok(CompareOp::Ne),
            other => Err(MonitorError::Config(format!(
                "Unknown comparison operator: {}",
                other
            ))),
        }
    }
}

/// 规则优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePriority {
    High,
    Medium,
    Low,
}

/// 告警规则定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// 规则 ID（跨重载保持稳定）
    pub id: i64,

    /// 规则名称
    pub name: String,

    /// 规则分类
    pub category: String,

    /// 是否启用
    pub enabled: bool,

    /// 监控的指标名称
    pub metric: String,

    /// 比较操作符
    pub operator: CompareOp,

    /// 阈值
    pub threshold: f64,

    /// 阈值单位
    pub unit: String,

    /// 最小持续触发时长（秒），0 表示单次命中即触发
    pub duration_secs: u64,

    /// 检查间隔（秒）
    pub check_interval_secs: u64,

    /// 静默期（秒）
    pub silence_secs: u64,

    /// 单个窗口内最多告警次数，0 表示不限制
    pub max_alerts_per_window: u32,

    /// 优先级
    pub priority: RulePriority,

    /// 邮件通知
    pub notify_email: bool,

    /// 短信通知
    pub notify_sms: bool,

    /// 告警消息模板
    pub message_template: String,

    /// 最后修改时间
    pub updated_at: DateTime<Utc>,
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            category: "system".to_string(),
            enabled: true,
            metric: String::new(),
            operator: CompareOp::Gt,
            threshold: 0.0,
            unit: String::new(),
            duration_secs: 0,
            check_interval_secs: 30,
            silence_secs: 300,
            max_alerts_per_window: 0,
            priority: RulePriority::Medium,
            notify_email: false,
            notify_sms: false,
            message_template: String::new(),
            updated_at: Utc::now(),
        }
    }
}

impl Rule {
    /// 计算规则内容哈希（仅覆盖热重载关注的可变字段）
    ///
    /// 不纳入哈希的字段（如消息模板）变化不会触发重载。
    pub fn content_hash(&self) -> String {
        let payload = format!(
            "{}|{}|{}|{}|{}|{}",
            self.name,
            self.metric,
            self.operator,
            self.threshold,
            self.enabled,
            self.updated_at.to_rfc3339()
        );
        let digest = Sha256::digest(payload.as_bytes());
        format!("{:x}", digest)
    }

    /// 渲染告警消息（模板为空时生成默认消息）
    pub fn render_message(&self, value: f64) -> String {
        if self.message_template.is_empty() {
            return format!(
                "{}: {} = {:.2}{} (threshold {} {:.2}{})",
                self.name, self.metric, value, self.unit, self.operator, self.threshold, self.unit
            );
        }

        self.message_template
            .replace("{name}", &self.name)
            .replace("{metric}", &self.metric)
            .replace("{value}", &format!("{:.2}", value))
            .replace("{threshold}", &format!("{:.2}", self.threshold))
            .replace("{unit}", &self.unit)
    }
}
