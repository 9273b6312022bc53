pub mod alert;
pub mod error;
pub mod metric;
pub mod model;
pub mod traits;

pub use alert::{AlertMessage, Severity, RECOVERY_MARKER};
pub use error::MonitorError;
pub use metric::MetricValue;
pub use model::{CompareOp, Rule, RulePriority, FLOAT_EPSILON};
pub use traits::{AlertSink, MetricSource, RuleRepository};
