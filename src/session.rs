//! 스트리밍 세션 - DTLS 1.2 PSK 클라이언트
//!
//! 흐름:
//! 1. 설정의 hex 클라이언트 키 디코딩
//! 2. 브리지:2100으로 PSK 핸드쉐이크 (identity = 애플리케이션 ID)
//! 3. 프레임마다 HueStream 패킷 하나를 단일 레코드로 전송
//!
//! 상태: Disconnected → Handshaking → Connected.
//! 전송 실패 시 자동 재연결 없음 (에러만 반환)

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use webrtc_dtls::cipher_suite::CipherSuiteId;
use webrtc_dtls::config::Config as DtlsConfig;
use webrtc_dtls::conn::DTLSConn;
use webrtc_util::conn::Conn;

use crate::stream_packet::{build_packet, LightState};
use crate::{Config, Error, Result};

/// 핸드쉐이크 flight 재전송 간격
pub const FLIGHT_INTERVAL: Duration = Duration::from_millis(500);

/// 보안 채널 쓰기 측
#[async_trait]
pub trait Transport: Send + Sync {
    /// 패킷 하나를 레코드 하나로 기록
    async fn write(&self, packet: &[u8]) -> Result<usize>;
}

/// 보안 채널 수립기
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        addr: SocketAddr,
        identity: &[u8],
        psk: Vec<u8>,
    ) -> Result<Box<dyn Transport>>;
}

/// webrtc-dtls 기반 연결기
#[derive(Debug, Clone)]
pub struct DtlsConnector {
    pub flight_interval: Duration,
}

impl Default for DtlsConnector {
    fn default() -> Self {
        Self {
            flight_interval: FLIGHT_INTERVAL,
        }
    }
}

#[async_trait]
impl Connector for DtlsConnector {
    async fn connect(
        &self,
        addr: SocketAddr,
        identity: &[u8],
        psk: Vec<u8>,
    ) -> Result<Box<dyn Transport>> {
        let local = match addr.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        // 시도마다 새 임시 포트. 타임아웃으로 드롭된 이전 시도의 소켓과 겹치지 않음
        let socket = UdpSocket::bind(local).await?;
        socket.connect(addr).await?;

        let config = DtlsConfig {
            psk: Some(Arc::new(move |_hint: &[u8]| {
                Ok::<Vec<u8>, webrtc_dtls::Error>(psk.clone())
            })),
            psk_identity_hint: Some(identity.to_vec()),
            cipher_suites: vec![CipherSuiteId::Tls_Psk_With_Aes_128_Gcm_Sha256],
            insecure_skip_verify: true,
            flight_interval: self.flight_interval,
            ..Default::default()
        };

        let conn: Arc<dyn Conn + Send + Sync> = Arc::new(socket);
        let conn = DTLSConn::new(conn, config, true, None).await?;

        Ok(Box::new(DtlsTransport { conn }))
    }
}

struct DtlsTransport {
    conn: DTLSConn,
}

#[async_trait]
impl Transport for DtlsTransport {
    async fn write(&self, packet: &[u8]) -> Result<usize> {
        Ok(self.conn.write(packet, None).await?)
    }
}

/// 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Handshaking,
    Connected,
}

/// 스트리밍 세션 (실행당 하나)
pub struct StreamSession {
    connector: Box<dyn Connector>,

    state: Mutex<SessionState>,

    /// 수립된 채널 - 쓰기 동안 잠금 유지 (레코드 섞임 방지)
    transport: tokio::sync::Mutex<Option<Box<dyn Transport>>>,
}

impl StreamSession {
    /// 연결기를 지정해 생성
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            state: Mutex::new(SessionState::Disconnected),
            transport: tokio::sync::Mutex::new(None),
        }
    }

    /// DTLS 연결기로 생성
    pub fn dtls() -> Self {
        Self::new(DtlsConnector::default())
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// 세션 수립 (이미 연결됐으면 아무것도 하지 않음)
    pub async fn connect(&self, config: &Config, identity: &str) -> Result<()> {
        let mut transport = self.transport.lock().await;
        if transport.is_some() {
            return Ok(());
        }

        let psk = hex::decode(config.client_key())?;
        let addr = config.streaming_addr();
        let timeout = config.handshake_timeout();

        *self.state.lock() = SessionState::Handshaking;
        info!("DTLS handshake with {} (identity {})", addr, identity);

        let result =
            tokio::time::timeout(timeout, self.connector.connect(addr, identity.as_bytes(), psk))
                .await;

        match result {
            Ok(Ok(established)) => {
                *transport = Some(established);
                *self.state.lock() = SessionState::Connected;
                info!("Streaming session established with {}", addr);
                Ok(())
            }
            Ok(Err(e)) => {
                *self.state.lock() = SessionState::Disconnected;
                warn!("DTLS 핸드쉐이크 실패: {}", e);
                Err(e)
            }
            Err(_) => {
                // connect 퓨처는 여기서 드롭됨. 진행 중이던 핸드쉐이크는 폐기되고
                // webrtc-dtls 내부 태스크가 끝나면 그 소켓도 닫힘. 세션에는 아무것도 남지 않음
                *self.state.lock() = SessionState::Disconnected;
                warn!("DTLS 핸드쉐이크 타임아웃: {:?}", timeout);
                Err(Error::HandshakeTimeout(timeout.as_millis() as u64))
            }
        }
    }

    /// 조명 상태 전송 - 재시도 없음, 전송 에러는 그대로 반환
    pub async fn send(&self, config: &Config, lights: &[LightState]) -> Result<()> {
        let transport = self.transport.lock().await;
        let Some(transport) = transport.as_ref() else {
            return Err(Error::NotConnected);
        };

        let packet = build_packet(config.entertainment_zone(), lights);
        let written = transport.write(&packet).await?;
        debug!("HueStream packet sent: {} bytes, {} lights", written, lights.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use bytes::Bytes;

    use crate::config::test_raw_config;
    use crate::stream_packet::{packet_len, HEADER_LEN, ZONE_ID_LEN};
    use crate::RawConfig;

    #[derive(Default)]
    struct Recorder {
        handshakes: AtomicUsize,
        identity: Mutex<Vec<u8>>,
        psk: Mutex<Vec<u8>>,
        packets: Mutex<Vec<Bytes>>,
        fail_writes: bool,
    }

    struct MockConnector(Arc<Recorder>);

    struct MockTransport(Arc<Recorder>);

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(
            &self,
            _addr: SocketAddr,
            identity: &[u8],
            psk: Vec<u8>,
        ) -> Result<Box<dyn Transport>> {
            self.0.handshakes.fetch_add(1, Ordering::SeqCst);
            *self.0.identity.lock() = identity.to_vec();
            *self.0.psk.lock() = psk;
            Ok(Box::new(MockTransport(self.0.clone())))
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn write(&self, packet: &[u8]) -> Result<usize> {
            if self.0.fail_writes {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                )));
            }
            self.0.packets.lock().push(Bytes::copy_from_slice(packet));
            Ok(packet.len())
        }
    }

    struct SlowConnector;

    #[async_trait]
    impl Connector for SlowConnector {
        async fn connect(&self, _: SocketAddr, _: &[u8], _: Vec<u8>) -> Result<Box<dyn Transport>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(Error::NotConnected)
        }
    }

    /// 첫 시도는 멈추고 이후 시도는 바로 성공
    struct StallOnce {
        attempts: AtomicUsize,
        abandoned: Arc<AtomicBool>,
        recorder: Arc<Recorder>,
    }

    /// 드롭 시 표시 (완료 전 드롭된 시도 감지)
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Connector for StallOnce {
        async fn connect(&self, addr: SocketAddr, identity: &[u8], psk: Vec<u8>) -> Result<Box<dyn Transport>> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                let flag = DropFlag(self.abandoned.clone());
                tokio::time::sleep(Duration::from_secs(30)).await;
                std::mem::forget(flag);
            }
            MockConnector(self.recorder.clone()).connect(addr, identity, psk).await
        }
    }

    fn config() -> Config {
        Config::new(test_raw_config()).unwrap()
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let recorder = Arc::new(Recorder::default());
        let session = StreamSession::new(MockConnector(recorder.clone()));
        assert_eq!(session.state(), SessionState::Disconnected);

        session.connect(&config(), "app-id").await.unwrap();
        session.connect(&config(), "app-id").await.unwrap();

        assert_eq!(recorder.handshakes.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(&recorder.identity.lock()[..], b"app-id");
        assert_eq!(recorder.psk.lock()[0], 0x00);
        assert_eq!(recorder.psk.lock()[15], 0xff);
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let recorder = Arc::new(Recorder::default());
        let session = StreamSession::new(MockConnector(recorder.clone()));

        let err = session.send(&config(), &[LightState::default()]).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert!(recorder.packets.lock().is_empty());
    }

    #[tokio::test]
    async fn test_send_writes_single_packet() {
        let recorder = Arc::new(Recorder::default());
        let session = StreamSession::new(MockConnector(recorder.clone()));
        session.connect(&config(), "app-id").await.unwrap();

        let lights = [LightState::new(1, 2, 3), LightState::new(4, 5, 6)];
        session.send(&config(), &lights).await.unwrap();

        let packets = recorder.packets.lock();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), packet_len(2));
        assert_eq!(&packets[0][HEADER_LEN..HEADER_LEN + 4], b"zone");
        assert_eq!(packets[0][HEADER_LEN + ZONE_ID_LEN + 7], 1);
    }

    #[tokio::test]
    async fn test_send_surfaces_transport_error() {
        let recorder = Arc::new(Recorder {
            fail_writes: true,
            ..Recorder::default()
        });
        let session = StreamSession::new(MockConnector(recorder.clone()));
        session.connect(&config(), "app-id").await.unwrap();

        let err = session.send(&config(), &[LightState::default()]).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        // 구조적으로는 연결 상태 유지
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let session = StreamSession::new(SlowConnector);
        let config = Config::new(RawConfig {
            handshake_timeout_ms: 50,
            ..test_raw_config()
        })
        .unwrap();

        let err = session.connect(&config, "app-id").await.unwrap_err();
        assert!(matches!(err, Error::HandshakeTimeout(50)));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_dtls_handshake_to_silent_peer_times_out() {
        // 응답하지 않는 UDP 피어
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let connector = DtlsConnector {
            flight_interval: Duration::from_millis(20),
        };

        let result = tokio::time::timeout(
            Duration::from_millis(300),
            connector.connect(silent.local_addr().unwrap(), b"app-id", vec![0u8; 16]),
        )
        .await;
        assert!(!matches!(result, Ok(Ok(_))));
    }

    #[tokio::test]
    async fn test_timeout_discards_attempt_and_allows_retry() {
        let abandoned = Arc::new(AtomicBool::new(false));
        let recorder = Arc::new(Recorder::default());
        let connector = StallOnce {
            attempts: AtomicUsize::new(0),
            abandoned: abandoned.clone(),
            recorder: recorder.clone(),
        };
        let session = StreamSession::new(connector);
        let config = Config::new(RawConfig {
            handshake_timeout_ms: 50,
            ..test_raw_config()
        })
        .unwrap();

        let err = session.connect(&config, "app-id").await.unwrap_err();
        assert!(matches!(err, Error::HandshakeTimeout(50)));
        // 멈춘 시도는 타임아웃과 함께 드롭됨
        assert!(abandoned.load(Ordering::SeqCst));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.send(&config, &[LightState::default()]).await.is_err());

        session.connect(&config, "app-id").await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(recorder.handshakes.load(Ordering::SeqCst), 1);

        session.send(&config, &[LightState::default()]).await.unwrap();
        assert_eq!(recorder.packets.lock().len(), 1);
    }
}
