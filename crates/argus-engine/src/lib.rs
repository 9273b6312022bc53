pub mod cache;
pub mod context;
pub mod engine;

pub use cache::MetricCache;
pub use context::{RuleExecContext, RuleState};
pub use engine::{EngineConfig, EngineCounters, RuleEngine};
