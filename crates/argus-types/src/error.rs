use thiserror::Error;

/// 核心错误分类
///
/// 所有错误均不会中断后台循环：单规则求值失败只标记该规则，
/// 存储失败保留最近一次成功快照，下发失败只计数。
#[derive(Debug, Error)]
pub enum MonitorError {
    /// 单规则求值失败（可恢复，规则标记为 ERROR）
    #[error("Rule {rule_id} evaluation failed: {message}")]
    Evaluation { rule_id: i64, message: String },

    /// 规则存储不可达（下一轮重试）
    #[error("Rule store error: {0}")]
    Store(String),

    /// 告警下发失败（告警仍被计数与去重）
    #[error("Alert dispatch error: {0}")]
    Dispatch(String),

    /// 规则配置非法（例如未知操作符）
    #[error("Rule config error: {0}")]
    Config(String),
}

impl MonitorError {
    pub fn evaluation(rule_id: i64, message: impl Into<String>) -> Self {
        Self::Evaluation {
            rule_id,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MonitorError::evaluation(7, "metric fetch timed out");
        assert_eq!(
            err.to_string(),
            "Rule 7 evaluation failed: metric fetch timed out"
        );

        let err = MonitorError::Config("Unknown comparison operator: ~=".to_string());
        assert!(err.to_string().contains("~="));
    }
}
