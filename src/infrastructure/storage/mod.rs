//! Storage - 音频文件存储

mod audio_store;

pub use audio_store::{AudioStore, AudioStoreError};
