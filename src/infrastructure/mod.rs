//! Infrastructure Layer
//!
//! 端口的具体实现：HTTP、内存结构、文件存储、SQLite、上游适配器

pub mod adapters;
pub mod http;
pub mod memory;
pub mod persistence;
pub mod storage;
