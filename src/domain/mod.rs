//! Domain Layer
//!
//! 纯函数领域逻辑：文本规范化与模糊打分

pub mod normalizer;
pub mod scorer;

pub use normalizer::{normalize, NormalizeConfig};
pub use scorer::{resolve_scorer, ScorerFn};
