//! In-Memory Structures - 内存结构

mod hot_index;
mod warmup_tracker;

pub use hot_index::{FuzzyMatch, HotIndex};
pub use warmup_tracker::WarmupTracker;
