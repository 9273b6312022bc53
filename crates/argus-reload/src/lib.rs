pub mod loader;
pub mod repository;

pub use loader::{diff_rules, HotLoader, RuleDiff};
pub use repository::MemoryRuleRepository;
