pub mod dedup;

pub use dedup::{DedupConfig, DedupStats, Deduplicator};
