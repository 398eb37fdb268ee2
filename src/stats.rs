//! 프레임 통계
//!
//! 수신 루프와 전송 경로에서 잠금 없이 갱신되는 카운터

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::codec::Rejection;

/// 프레임 도착률 측정 윈도우 (프레임 수)
pub const RATE_WINDOW: usize = 100;

/// 최근 도착 시각 기반 초당 프레임 계산
#[derive(Debug)]
pub struct RateWindow {
    arrivals: VecDeque<Instant>,
    window_size: usize,
}

impl RateWindow {
    pub fn new(window_size: usize) -> Self {
        Self {
            arrivals: VecDeque::with_capacity(window_size),
            window_size: window_size.max(2),
        }
    }

    pub fn record(&mut self, at: Instant) {
        if self.arrivals.len() >= self.window_size {
            self.arrivals.pop_front();
        }
        self.arrivals.push_back(at);
    }

    /// 초당 프레임 (샘플 2개 미만이면 0)
    pub fn rate(&self) -> f64 {
        let (Some(first), Some(last)) = (self.arrivals.front(), self.arrivals.back()) else {
            return 0.0;
        };
        let duration = last.duration_since(*first);
        if duration.is_zero() {
            return 0.0;
        }
        (self.arrivals.len() - 1) as f64 / duration.as_secs_f64()
    }
}

/// 수신 측 통계
#[derive(Debug)]
pub struct ReceiverStats {
    started: Instant,
    datagrams: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    foreign_universe: AtomicU64,
    /// 싱크 없음 / 소비 전 교체로 버린 프레임
    dropped: AtomicU64,
    polls_answered: AtomicU64,
    rate: Mutex<RateWindow>,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            datagrams: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            foreign_universe: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            polls_answered: AtomicU64::new(0),
            rate: Mutex::new(RateWindow::new(RATE_WINDOW)),
        }
    }

    pub fn record_datagram(&self) {
        self.datagrams.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.rate.lock().record(Instant::now());
    }

    pub fn record_rejected(&self, reason: Rejection) {
        // 다른 유니버스 트래픽은 정상 상황이므로 따로 센다
        if matches!(reason, Rejection::UniverseMismatch { .. }) {
            self.foreign_universe.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll_answered(&self) {
        self.polls_answered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReceiverSnapshot {
        ReceiverSnapshot {
            elapsed: self.started.elapsed(),
            datagrams: self.datagrams.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            foreign_universe: self.foreign_universe.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            polls_answered: self.polls_answered.load(Ordering::Relaxed),
            frame_rate: self.rate.lock().rate(),
        }
    }
}

impl Default for ReceiverStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 수신 통계 스냅샷
#[derive(Debug, Clone, Default)]
pub struct ReceiverSnapshot {
    pub elapsed: Duration,
    pub datagrams: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub foreign_universe: u64,
    pub dropped: u64,
    pub polls_answered: u64,
    /// 최근 윈도우 기준 초당 프레임
    pub frame_rate: f64,
}

impl ReceiverSnapshot {
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.1}s | Datagrams: {} | Accepted: {} ({:.1} fps) | Rejected: {} | Other universes: {} | Dropped: {} | Polls: {}",
            self.elapsed.as_secs_f64(),
            self.datagrams,
            self.accepted,
            self.frame_rate,
            self.rejected,
            self.foreign_universe,
            self.dropped,
            self.polls_answered,
        )
    }
}

/// 전송 측 통계
#[derive(Debug, Default)]
pub struct ForwardStats {
    forwarded: AtomicU64,
    short_windows: AtomicU64,
    send_failures: AtomicU64,
    throttled: AtomicU64,
}

impl ForwardStats {
    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_short_window(&self) {
        self.short_windows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_throttled(&self) {
        self.throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ForwardSnapshot {
        ForwardSnapshot {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            short_windows: self.short_windows.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
        }
    }
}

/// 전송 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardSnapshot {
    pub forwarded: u64,
    pub short_windows: u64,
    pub send_failures: u64,
    pub throttled: u64,
}

impl ForwardSnapshot {
    pub fn summary(&self) -> String {
        format!(
            "Forwarded: {} | Short: {} | Send failures: {} | Throttled: {}",
            self.forwarded, self.short_windows, self.send_failures, self.throttled,
        )
    }
}
