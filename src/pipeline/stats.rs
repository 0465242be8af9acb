// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 服务统计: 工作线程写, 编排器/监控读

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct ServiceStats {
    received: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    forwarded: AtomicU64,
    dropped: AtomicU64,
    busy_micros: AtomicU64,
}

impl ServiceStats {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self, elapsed: Duration) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.busy_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, name: &str) -> StatsSnapshot {
        let processed = self.processed.load(Ordering::Relaxed);
        let busy_micros = self.busy_micros.load(Ordering::Relaxed);
        StatsSnapshot {
            name: name.to_string(),
            received: self.received.load(Ordering::Relaxed),
            processed,
            failed: self.failed.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            avg_process_ms: if processed == 0 {
                0.0
            } else {
                busy_micros as f64 / processed as f64 / 1000.0
            },
        }
    }
}

/// 某一时刻的统计快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub name: String,
    /// 从输入取出的帧数
    pub received: u64,
    pub processed: u64,
    /// 处理失败被丢弃的帧数
    pub failed: u64,
    pub forwarded: u64,
    /// 停止时仍卡在输出上、被放弃的帧数
    pub dropped: u64,
    pub avg_process_ms: f64,
}

/// 滑动窗口 FPS 计数
#[derive(Debug)]
pub struct FpsMeter {
    count: u64,
    last: Instant,
    current_fps: f64,
}

impl FpsMeter {
    /// 每多少帧刷新一次
    const WINDOW: u64 = 30;

    pub fn new() -> Self {
        Self {
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
        }
    }

    /// 记一帧, 窗口满时返回最新 FPS
    pub fn tick(&mut self) -> Option<f64> {
        self.count += 1;
        if self.count % Self::WINDOW != 0 {
            return None;
        }
        let elapsed = self.last.elapsed().as_secs_f64();
        self.last = Instant::now();
        if elapsed > 0.0 {
            self.current_fps = Self::WINDOW as f64 / elapsed;
        }
        Some(self.current_fps)
    }

    pub fn fps(&self) -> f64 {
        self.current_fps
    }
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new()
    }
}
