//! 루프백 UDP로 수신자 → 브리지 → 기록용 전송 계층까지 전체 경로 검증

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use tokio::net::UdpSocket;

use artnet_hue::codec::{self, POLL_REPLY_LEN};
use artnet_hue::stream_packet::packet_len;
use artnet_hue::{Bridge, Config, Connector, RawConfig, Receiver, Result, StreamSession, Transport};

#[derive(Clone, Default)]
struct Recording(Arc<Mutex<Vec<Bytes>>>);

#[async_trait]
impl Connector for Recording {
    async fn connect(&self, _: SocketAddr, _: &[u8], _: Vec<u8>) -> Result<Box<dyn Transport>> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl Transport for Recording {
    async fn write(&self, packet: &[u8]) -> Result<usize> {
        self.0.lock().push(Bytes::copy_from_slice(packet));
        Ok(packet.len())
    }
}

impl Recording {
    /// 패킷 n개가 기록될 때까지 대기
    async fn wait_for(&self, n: usize) -> Vec<Bytes> {
        for _ in 0..200 {
            if self.0.lock().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.0.lock().clone()
    }
}

fn config() -> Arc<Config> {
    Arc::new(
        Config::new(RawConfig {
            bridge_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2)),
            username: "user".into(),
            client_key: "00112233445566778899aabbccddeeff".into(),
            entertainment_zone: "1a8d99cc-967b-44f2-9202-43f976c0fa6b".into(),
            lights: 2,
            universe: 1,
            start_channel: 1,
            ..RawConfig::default()
        })
        .unwrap(),
    )
}

struct Harness {
    receiver: Receiver,
    console: UdpSocket,
    recording: Recording,
    bridge: Arc<Bridge>,
}

async fn harness() -> Harness {
    let config = config();
    let receiver = Receiver::open_on(config.clone(), "127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();

    let recording = Recording::default();
    let bridge = Arc::new(Bridge::new(
        config,
        Arc::new(StreamSession::new(recording.clone())),
    ));
    bridge.connect("app-id").await.unwrap();

    let frames = receiver.subscribe();
    let runner = bridge.clone();
    tokio::spawn(async move { runner.run(frames).await });

    let console = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    console.connect(receiver.local_addr()).await.unwrap();

    Harness {
        receiver,
        console,
        recording,
        bridge,
    }
}

#[tokio::test]
async fn test_artdmx_becomes_huestream_packet() {
    let h = harness().await;

    h.console
        .send(&codec::build_dmx(1, 1, &[10, 20, 30, 40, 50, 60, 70, 80]))
        .await
        .unwrap();

    let packets = h.recording.wait_for(1).await;
    assert_eq!(packets.len(), 1);

    let mut expected = b"HueStream".to_vec();
    expected.extend_from_slice(&[0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
    expected.extend_from_slice(b"1a8d99cc-967b-44f2-9202-43f976c0fa6b");
    expected.extend_from_slice(&[0x00, 10, 10, 20, 20, 30, 30]);
    expected.extend_from_slice(&[0x01, 40, 40, 50, 50, 60, 60]);

    assert_eq!(packets[0].len(), packet_len(2));
    assert_eq!(&packets[0][..], &expected[..]);
    assert_eq!(h.bridge.stats().forwarded, 1);
}

#[tokio::test]
async fn test_other_universes_never_reach_the_bridge() {
    let h = harness().await;

    h.console.send(&codec::build_dmx(0, 0, &[1; 6])).await.unwrap();
    h.console.send(&codec::build_dmx(2, 0, &[2; 6])).await.unwrap();
    h.console.send(&codec::build_dmx(1, 0, &[3; 6])).await.unwrap();

    let packets = h.recording.wait_for(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0][packet_len(0) + 1], 3);
    assert_eq!(h.receiver.stats().foreign_universe, 2);
}

#[tokio::test]
async fn test_random_datagrams_do_not_stop_the_pipeline() {
    let h = harness().await;
    let mut rng = rand::thread_rng();

    for _ in 0..200 {
        let len = rng.gen_range(0..1500);
        let mut datagram = vec![0u8; len];
        rng.fill(&mut datagram[..]);
        // 일부는 올바른 시그니처로 시작
        if len >= 8 && rng.gen_bool(0.5) {
            datagram[..8].copy_from_slice(codec::ARTNET_ID);
        }
        let _ = h.console.send(&datagram).await;
    }

    // 잡음 처리 후 유효 프레임
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.console.send(&codec::build_dmx(1, 9, &[9; 6])).await.unwrap();

    let packets = h.recording.wait_for(1).await;
    let last = packets.last().unwrap();
    assert_eq!(&last[packet_len(0)..], &[0, 9, 9, 9, 9, 9, 9, 1, 9, 9, 9, 9, 9, 9]);
}

#[tokio::test]
async fn test_poll_is_answered_while_streaming() {
    let h = harness().await;

    h.console.send(&codec::build_dmx(1, 0, &[5; 6])).await.unwrap();
    h.console.send(&codec::build_poll()).await.unwrap();

    let mut buf = [0u8; 512];
    let len = tokio::time::timeout(Duration::from_secs(2), h.console.recv(&mut buf))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(len, POLL_REPLY_LEN);
    assert_eq!(&buf[..8], codec::ARTNET_ID);
    assert_eq!(&buf[190..192], &[1, 0]);
    assert!(h.receiver.is_answering_polls());

    // 폴 응답과 무관하게 프레임도 전달됨
    assert_eq!(h.recording.wait_for(1).await.len(), 1);
}
