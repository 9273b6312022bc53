use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 规则运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleState {
    /// 重载后尚未求值
    Loading,
    /// 启用且正常求值
    Active,
    /// 已禁用
    Inactive,
    /// 最近一次求值失败
    Error,
}

/// 单规则执行上下文（按规则 id 懒创建）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleExecContext {
    /// 规则 id
    pub rule_id: i64,

    /// 最近一次求值时间
    pub last_eval: DateTime<Utc>,

    /// 最近一次触发时间
    pub last_trigger: Option<DateTime<Utc>>,

    /// 累计触发次数
    pub trigger_count: u64,

    /// 连续命中次数（未命中即归零）
    pub consecutive_triggers: u32,

    /// 当前是否处于静默期
    pub silenced: bool,
}

impl RuleExecContext {
    pub fn new(rule_id: i64) -> Self {
        Self {
            rule_id,
            last_eval: Utc::now(),
            last_trigger: None,
            trigger_count: 0,
            consecutive_triggers: 0,
            silenced: false,
        }
    }

    /// 距最近触发是否仍在静默期内
    pub fn in_silence(&self, now: DateTime<Utc>, silence_secs: u64) -> bool {
        match self.last_trigger {
            Some(last) => now - last < chrono::Duration::seconds(silence_secs as i64),
            None => false,
        }
    }

    /// 连续命中时长是否满足规则的最小持续要求
    ///
    /// 近似判定：连续命中次数 × 检查间隔 >= duration，
    /// duration 不超过一个检查间隔时单次命中即满足。
    pub fn duration_satisfied(&self, duration_secs: u64, check_interval_secs: u64) -> bool {
        if duration_secs == 0 {
            return self.consecutive_triggers >= 1;
        }
        let interval = check_interval_secs.max(1);
        u64::from(self.consecutive_triggers) * interval >= duration_secs
    }

    /// 上下文是否已闲置过期
    pub fn is_stale(&self, now: DateTime<Utc>, expiry_secs: u64) -> bool {
        now - self.last_eval > chrono::Duration::seconds(expiry_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_window() {
        let mut ctx = RuleExecContext::new(1);
        let now = Utc::now();

        assert!(!ctx.in_silence(now, 300));

        ctx.last_trigger = Some(now - chrono::Duration::seconds(10));
        assert!(ctx.in_silence(now, 300));
        assert!(!ctx.in_silence(now, 5));
    }

    #[test]
    fn test_duration_zero_single_hit() {
        let mut ctx = RuleExecContext::new(1);
        ctx.consecutive_triggers = 1;
        assert!(ctx.duration_satisfied(0, 30));
    }

    #[test]
    fn test_duration_requires_consecutive_ticks() {
        let mut ctx = RuleExecContext::new(1);

        // duration 60s / interval 30s => 需要 2 次连续命中
        ctx.consecutive_triggers = 1;
        assert!(!ctx.duration_satisfied(60, 30));

        ctx.consecutive_triggers = 2;
        assert!(ctx.duration_satisfied(60, 30));

        // duration 不超过间隔 => 1 次即可
        ctx.consecutive_triggers = 1;
        assert!(ctx.duration_satisfied(20, 30));
    }

    #[test]
    fn test_stale_context() {
        let mut ctx = RuleExecContext::new(1);
        let now = Utc::now();

        assert!(!ctx.is_stale(now, 3600));

        ctx.last_eval = now - chrono::Duration::seconds(7200);
        assert!(ctx.is_stale(now, 3600));
    }
}
