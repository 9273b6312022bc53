use argus_types::{MonitorError, Rule, RuleRepository};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 规则仓库（内存实现，供测试与演示使用）
pub struct MemoryRuleRepository {
    rules: Arc<RwLock<HashMap<i64, Rule>>>,
    next_id: Arc<RwLock<i64>>,
}

impl MemoryRuleRepository {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(RwLock::new(1)),
        }
    }

    pub async fn len(&self) -> usize {
        self.rules.read().await.len()
    }
}

#[async_trait]
impl RuleRepository for MemoryRuleRepository {
    async fn load_rules(&self) -> Result<Vec<Rule>, MonitorError> {
        let rules = self.rules.read().await;
        Ok(rules.values().cloned().collect())
    }

    async fn save_rule(&self, mut rule: Rule) -> Result<i64, MonitorError> {
        let mut rules = self.rules.write().await;

        if rule.id <= 0 {
            let mut next_id = self.next_id.write().await;
            rule.id = *next_id;
            *next_id += 1;
        }

        rule.updated_at = Utc::now();
        let id = rule.id;
        rules.insert(id, rule);
        Ok(id)
    }

    async fn delete_rule(&self, id: i64) -> Result<bool, MonitorError> {
        let mut rules = self.rules.write().await;
        Ok(rules.remove(&id).is_some())
    }
}

impl Default for MemoryRuleRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_assigns_id() {
        let repo = MemoryRuleRepository::new();

        let id = repo.save_rule(Rule::default()).await.unwrap();
        assert_eq!(id, 1);

        let id = repo.save_rule(Rule::default()).await.unwrap();
        assert_eq!(id, 2);

        assert_eq!(repo.load_rules().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_keeps_id() {
        let repo = MemoryRuleRepository::new();

        let id = repo.save_rule(Rule::default()).await.unwrap();

        let mut rule = repo.load_rules().await.unwrap().remove(0);
        rule.name = "renamed".to_string();
        let saved = repo.save_rule(rule).await.unwrap();

        assert_eq!(saved, id);
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = MemoryRuleRepository::new();

        let id = repo.save_rule(Rule::default()).await.unwrap();
        assert!(repo.delete_rule(id).await.unwrap());
        assert!(!repo.delete_rule(id).await.unwrap());
    }
}
