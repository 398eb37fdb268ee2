//! 브리지 오케스트레이터
//!
//! 수신자의 채널 윈도우 → 조명별 RGB 상태 → 스트리밍 세션.
//! 프레임은 서로 독립적이며 실패한 프레임은 버퍼링하지 않음

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::CHANNELS_PER_LIGHT;
use crate::receiver::FrameStream;
use crate::session::StreamSession;
use crate::stats::{ForwardSnapshot, ForwardStats};
use crate::stream_packet::LightState;
use crate::{Config, Result};

/// 채널 윈도우를 조명 상태로 분할 (윈도우가 짧으면 None)
pub fn lights_from_window(window: &[u8], count: usize) -> Option<Vec<LightState>> {
    if window.len() < CHANNELS_PER_LIGHT * count {
        return None;
    }

    Some(
        window
            .chunks_exact(CHANNELS_PER_LIGHT)
            .take(count)
            .map(|rgb| LightState::new(rgb[0], rgb[1], rgb[2]))
            .collect(),
    )
}

/// 프레임 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Forwarded,
    /// 윈도우 길이 부족
    Short,
    /// max_fps 제한으로 버림
    Throttled,
    /// 전송 실패로 버림
    Failed,
}

/// 수신자와 세션을 잇는 오케스트레이터
pub struct Bridge {
    config: Arc<Config>,
    session: Arc<StreamSession>,
    stats: ForwardStats,
    last_forward: Mutex<Option<Instant>>,
}

impl Bridge {
    pub fn new(config: Arc<Config>, session: Arc<StreamSession>) -> Self {
        Self {
            config,
            session,
            stats: ForwardStats::default(),
            last_forward: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Arc<StreamSession> {
        &self.session
    }

    /// 세션 수립 (identity = 허브 애플리케이션 ID)
    pub async fn connect(&self, application_id: &str) -> Result<()> {
        self.session.connect(&self.config, application_id).await
    }

    /// 윈도우 하나 처리
    ///
    /// 짧은 윈도우는 부분 전송 없이 버리고, 전송 실패는 로그만 남김
    pub async fn handle_window(&self, window: &[u8]) -> Outcome {
        if self.config.debug() {
            debug!("DMX values: {:?}", window);
        }

        let Some(lights) = lights_from_window(window, self.config.lights()) else {
            debug!(
                "Received fewer values than expected for {} lights: {} values received",
                self.config.lights(),
                window.len()
            );
            self.stats.record_short_window();
            return Outcome::Short;
        };

        if !self.admit(Instant::now()) {
            self.stats.record_throttled();
            return Outcome::Throttled;
        }

        match self.session.send(&self.config, &lights).await {
            Ok(()) => {
                self.stats.record_forwarded();
                Outcome::Forwarded
            }
            Err(e) => {
                debug!("Failed to stream to Hue: {}", e);
                self.stats.record_send_failure();
                Outcome::Failed
            }
        }
    }

    /// 스트림이 닫힐 때까지 순서대로 전달
    pub async fn run(&self, mut frames: FrameStream) {
        info!(
            "Bridging universe {} → zone {} ({} lights)",
            self.config.universe(),
            self.config.entertainment_zone(),
            self.config.lights()
        );

        while let Some(window) = frames.recv().await {
            self.handle_window(&window).await;
        }

        info!("Frame stream closed: {}", self.stats.snapshot().summary());
    }

    pub fn stats(&self) -> ForwardSnapshot {
        self.stats.snapshot()
    }

    /// 프레임 간격 제한 확인 후 통과 시각 기록
    fn admit(&self, now: Instant) -> bool {
        let Some(interval) = self.config.min_frame_interval() else {
            return true;
        };

        let mut last = self.last_forward.lock();
        match *last {
            Some(prev) if now.duration_since(prev) < interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::config::test_raw_config;
    use crate::session::{Connector, Transport};
    use crate::stream_packet::{HEADER_LEN, ZONE_ID_LEN};
    use crate::RawConfig;

    struct Capture(Arc<Mutex<Vec<Bytes>>>);

    #[async_trait]
    impl Connector for Capture {
        async fn connect(&self, _: SocketAddr, _: &[u8], _: Vec<u8>) -> Result<Box<dyn Transport>> {
            Ok(Box::new(Capture(self.0.clone())))
        }
    }

    #[async_trait]
    impl Transport for Capture {
        async fn write(&self, packet: &[u8]) -> Result<usize> {
            self.0.lock().push(Bytes::copy_from_slice(packet));
            Ok(packet.len())
        }
    }

    async fn bridge(raw: RawConfig) -> (Bridge, Arc<Mutex<Vec<Bytes>>>) {
        let packets = Arc::new(Mutex::new(Vec::new()));
        let session = Arc::new(StreamSession::new(Capture(packets.clone())));
        let bridge = Bridge::new(Arc::new(Config::new(raw).unwrap()), session);
        bridge.connect("app-id").await.unwrap();
        (bridge, packets)
    }

    #[test]
    fn test_lights_from_window() {
        let lights = lights_from_window(&[10, 20, 30, 40, 50, 60], 2).unwrap();
        assert_eq!(lights, vec![LightState::new(10, 20, 30), LightState::new(40, 50, 60)]);

        // 남는 채널은 무시
        let lights = lights_from_window(&[1, 2, 3, 4], 1).unwrap();
        assert_eq!(lights, vec![LightState::new(1, 2, 3)]);

        assert!(lights_from_window(&[1, 2, 3, 4, 5], 2).is_none());
    }

    #[tokio::test]
    async fn test_forwards_window() {
        let (bridge, packets) = bridge(test_raw_config()).await;

        let outcome = bridge.handle_window(&[10, 20, 30, 40, 50, 60]).await;
        assert_eq!(outcome, Outcome::Forwarded);

        let packets = packets.lock();
        assert_eq!(packets.len(), 1);
        assert_eq!(
            &packets[0][HEADER_LEN + ZONE_ID_LEN..],
            &[0, 10, 10, 20, 20, 30, 30, 1, 40, 40, 50, 50, 60, 60]
        );
    }

    #[tokio::test]
    async fn test_short_window_dropped() {
        let (bridge, packets) = bridge(test_raw_config()).await;

        assert_eq!(bridge.handle_window(&[1, 2, 3, 4, 5]).await, Outcome::Short);
        assert!(packets.lock().is_empty());
        assert_eq!(bridge.stats().short_windows, 1);
    }

    #[tokio::test]
    async fn test_send_failure_is_dropped() {
        let session = Arc::new(StreamSession::dtls());
        let bridge = Bridge::new(Arc::new(Config::new(test_raw_config()).unwrap()), session);

        // 연결 전 전송 → 실패, 재연결 시도 없음
        assert_eq!(bridge.handle_window(&[0; 6]).await, Outcome::Failed);
        assert_eq!(bridge.handle_window(&[0; 6]).await, Outcome::Failed);
        assert_eq!(bridge.stats().send_failures, 2);
    }

    #[tokio::test]
    async fn test_throttle() {
        let (bridge, packets) = bridge(RawConfig {
            max_fps: Some(1),
            ..test_raw_config()
        })
        .await;

        assert_eq!(bridge.handle_window(&[1; 6]).await, Outcome::Forwarded);
        assert_eq!(bridge.handle_window(&[2; 6]).await, Outcome::Throttled);
        assert_eq!(packets.lock().len(), 1);
        assert_eq!(bridge.stats().throttled, 1);
    }

    #[test]
    fn test_admit_interval() {
        let config = Config::new(RawConfig {
            max_fps: Some(50),
            ..test_raw_config()
        })
        .unwrap();
        let bridge = Bridge::new(Arc::new(config), Arc::new(StreamSession::dtls()));

        let t0 = Instant::now();
        assert!(bridge.admit(t0));
        assert!(!bridge.admit(t0 + Duration::from_millis(10)));
        assert!(bridge.admit(t0 + Duration::from_millis(20)));
        assert!(!bridge.admit(t0 + Duration::from_millis(39)));
    }

    #[tokio::test]
    async fn test_run_forwards_latest_window() {
        let (bridge, packets) = bridge(test_raw_config()).await;
        let (sink, frames) = crate::receiver::frame_channel();

        // 소비 전에 쌓인 윈도우는 마지막 것만 남음
        for i in 0..5u8 {
            sink.publish(Bytes::from(vec![i; 6]));
        }
        drop(sink);
        bridge.run(frames).await;

        let packets = packets.lock();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0][HEADER_LEN + ZONE_ID_LEN + 1], 4);
    }

    #[tokio::test]
    async fn test_run_preserves_order() {
        let (bridge, packets) = bridge(test_raw_config()).await;
        let bridge = Arc::new(bridge);
        let (sink, frames) = crate::receiver::frame_channel();

        let runner = bridge.clone();
        let task = tokio::spawn(async move { runner.run(frames).await });

        for i in 0..5u8 {
            sink.publish(Bytes::from(vec![i; 6]));
            // 하나씩 소비될 때까지 대기
            for _ in 0..200 {
                if packets.lock().len() > i as usize {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        drop(sink);
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();

        let packets = packets.lock();
        assert_eq!(packets.len(), 5);
        for (i, packet) in packets.iter().enumerate() {
            assert_eq!(packet[HEADER_LEN + ZONE_ID_LEN + 1] as usize, i);
        }
        assert_eq!(bridge.stats().forwarded, 5);
    }
}
