//! HueStream 패킷 빌더
//!
//! 레이아웃: 헤더(16) + 존 ID(36) + 조명당 7 bytes
//! - 헤더: "HueStream" + version 2.0 + sequence + reserved + color space(RGB) + reserved
//! - 채널 블록: 조명 인덱스 + R/G/B 각 16비트 (8비트 값을 두 번 기록)

use bytes::{BufMut, Bytes, BytesMut};

/// 프로토콜 이름
pub const PROTOCOL_NAME: &[u8; 9] = b"HueStream";

/// 이름 뒤의 고정 헤더: version(2) + sequence + reserved(2) + color space + reserved
pub const STREAM_HEADER: [u8; 7] = [0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];

/// 전체 헤더 길이
pub const HEADER_LEN: usize = PROTOCOL_NAME.len() + STREAM_HEADER.len();

/// 엔터테인먼트 존 ID 필드 길이 (UUID 문자열)
pub const ZONE_ID_LEN: usize = 36;

/// 조명당 채널 블록 길이
pub const CHANNEL_BLOCK_LEN: usize = 7;

/// 조명 하나의 RGB 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightState {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl LightState {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

impl From<[u8; 3]> for LightState {
    fn from([red, green, blue]: [u8; 3]) -> Self {
        Self { red, green, blue }
    }
}

/// N개 조명에 대한 패킷 길이
pub const fn packet_len(lights: usize) -> usize {
    HEADER_LEN + ZONE_ID_LEN + CHANNEL_BLOCK_LEN * lights
}

/// 패킷 직렬화
///
/// 채널 ID는 입력 순서의 인덱스 (0부터), 존 ID는 36 bytes로 NUL 패딩 / 절단
pub fn build_packet(zone_id: &str, lights: &[LightState]) -> Bytes {
    let mut buf = BytesMut::with_capacity(packet_len(lights.len()));
    buf.put_slice(PROTOCOL_NAME);
    buf.put_slice(&STREAM_HEADER);

    let zone = zone_id.as_bytes();
    let n = zone.len().min(ZONE_ID_LEN);
    buf.put_slice(&zone[..n]);
    buf.put_bytes(0, ZONE_ID_LEN - n);

    for (index, light) in lights.iter().enumerate() {
        buf.put_u8(index as u8);
        for value in [light.red, light.green, light.blue] {
            buf.put_u8(value);
            buf.put_u8(value);
        }
    }

    buf.freeze()
}
