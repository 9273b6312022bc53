pub mod monitor;

pub use monitor::{AlertMonitor, MonitorConfig, MonitorStats, MonitorStatus};
