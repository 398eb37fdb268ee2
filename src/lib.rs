//! # artnet-hue
//!
//! Art-Net(DMX over UDP) → Hue Entertainment(DTLS HueStream) 브리지
//!
//! ## 데이터 경로
//! - **수신**: UDP 6454 + 유니버스별 멀티캐스트 그룹, ArtDmx 필터링 후 채널 윈도우 추출
//! - **탐색 응답**: ArtPoll에 239바이트 ArtPollReply로 응답
//! - **변환**: 윈도우 → 조명별 RGB 상태
//! - **송신**: DTLS 1.2 PSK 세션으로 프레임당 HueStream 패킷 하나
//!
//! 프레임 단위 에러는 버리고 다음 프레임으로 진행 (재전송/버퍼링 없음)

pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod hue_api;
pub mod interfaces;
pub mod receiver;
pub mod session;
pub mod stats;
pub mod stream_packet;

pub use bridge::{lights_from_window, Bridge, Outcome};
pub use codec::{DmxFrame, Rejection};
pub use config::{Config, RawConfig};
pub use error::{Error, Result};
pub use hue_api::{Credentials, EntertainmentZone, HueApi};
pub use interfaces::NicInfo;
pub use receiver::{frame_channel, FrameSink, FrameStream, Publish, Receiver};
pub use session::{Connector, DtlsConnector, SessionState, StreamSession, Transport};
pub use stats::{ForwardSnapshot, ReceiverSnapshot};
pub use stream_packet::LightState;

/// Art-Net UDP 포트
pub const ARTNET_PORT: u16 = 6454;

/// Hue Entertainment 스트리밍 포트 (DTLS)
pub const HUE_STREAMING_PORT: u16 = 2100;

/// 유니버스당 DMX 채널 수
pub const DMX_CHANNELS: usize = 512;
