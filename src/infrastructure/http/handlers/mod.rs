//! HTTP Handlers

mod cache_admin;
mod fillers;
mod health;
mod speech;

pub use cache_admin::{cache_clear, cache_stats};
pub use fillers::{download_filler, generate_fillers, list_filler_files, list_fillers};
pub use health::health;
pub use speech::speech;
