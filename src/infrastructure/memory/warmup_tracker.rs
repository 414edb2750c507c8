//! Warmup Tracker - 预热任务去重集合
//!
//! 同一 (text_normalized, voice_id) 在任意时刻至多一个后台合成任务。
//! 任务结束（成功或失败）后移除键

use dashmap::DashSet;

/// 在途预热键集合
#[derive(Default)]
pub struct WarmupTracker {
    in_flight: DashSet<(String, String)>,
}

impl WarmupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试占据键；已在途返回 false，调用方跳过调度
    pub fn try_begin(&self, text_normalized: &str, voice_id: &str) -> bool {
        self.in_flight
            .insert((text_normalized.to_string(), voice_id.to_string()))
    }

    /// 任务完成后释放键
    pub fn finish(&self, text_normalized: &str, voice_id: &str) {
        self.in_flight
            .remove(&(text_normalized.to_string(), voice_id.to_string()));
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
