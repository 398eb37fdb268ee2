//! Art-Net 프레임 코덱
//!
//! I/O 없는 순수 함수만 존재
//! - ArtDmx 파싱 / 거부
//! - ArtPoll 판별
//! - ArtPollReply 직렬화 (239 bytes, 콘솔이 기대하는 바이트 레이아웃 그대로)

use std::net::Ipv4Addr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{ARTNET_PORT, DMX_CHANNELS};

/// 패킷 식별자 "Art-Net\0"
pub const ARTNET_ID: &[u8; 8] = b"Art-Net\0";

/// OpDmx (채널 데이터)
pub const OP_DMX: u16 = 0x5000;

/// OpPoll (노드 탐색)
pub const OP_POLL: u16 = 0x2000;

/// OpPollReply
pub const OP_POLL_REPLY: u16 = 0x2100;

/// 공통 헤더 길이: ID(8) + OpCode(2)
pub const HEADER_LEN: usize = 10;

/// ArtDmx 헤더 길이: 공통 헤더 + ProtVer(2) + Sequence + Physical + Universe(2) + Length(2)
pub const DMX_HEADER_LEN: usize = 18;

/// ArtPollReply 고정 길이
pub const POLL_REPLY_LEN: usize = 239;

/// Art-Net 프로토콜 리비전 (송신용)
pub const PROTOCOL_REVISION: u16 = 14;

const SHORT_NAME_OFFSET: usize = 26;
const SHORT_NAME_LEN: usize = 18;
const LONG_NAME_OFFSET: usize = 44;
const LONG_NAME_LEN: usize = 64;
const NODE_REPORT_OFFSET: usize = 108;
const NODE_REPORT: &[u8] = b"#0001 [OK]";

/// 데이터그램 거부 사유
///
/// 네트워크상의 잡음이므로 `Error`로 전파하지 않음
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// 헤더보다 짧음
    TooShort,

    /// "Art-Net\0" 불일치
    BadSignature,

    /// OpDmx가 아님
    WrongOpcode(u16),

    /// 구독 중인 유니버스가 아님
    UniverseMismatch { expected: u16, got: u16 },

    /// 선언된 길이가 실제 버퍼를 초과
    LengthOverflow { declared: usize, available: usize },

    /// 채널 데이터가 설정된 윈도우보다 짧음
    WindowTooShort { needed: usize, available: usize },
}

/// 수신된 ArtDmx 프레임
#[derive(Debug, Clone)]
pub struct DmxFrame {
    pub universe: u16,

    /// 0이면 시퀀스 비활성
    pub sequence: u8,

    pub physical: u8,

    /// 채널 데이터 (선언된 길이로 잘림, 0부터 인덱싱)
    pub data: Bytes,
}

impl DmxFrame {
    /// 선언된 채널 수
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `[start_channel-1, start_channel-1+len)` 윈도우 추출
    pub fn window(&self, start_channel: u16, len: usize) -> Result<Bytes, Rejection> {
        let start = (start_channel as usize).saturating_sub(1);
        let end = start + len;
        if end > self.data.len() {
            return Err(Rejection::WindowTooShort {
                needed: end,
                available: self.data.len(),
            });
        }
        Ok(self.data.slice(start..end))
    }
}

/// 시그니처가 맞으면 OpCode 반환
pub fn opcode(datagram: &[u8]) -> Result<u16, Rejection> {
    if datagram.len() < HEADER_LEN {
        return Err(Rejection::TooShort);
    }
    if &datagram[..8] != ARTNET_ID {
        return Err(Rejection::BadSignature);
    }
    Ok(u16::from_le_bytes([datagram[8], datagram[9]]))
}

/// ArtDmx 파싱
///
/// 설정된 유니버스가 아니거나 길이가 맞지 않으면 거부
pub fn parse_frame(datagram: &[u8], universe: u16) -> Result<DmxFrame, Rejection> {
    let op = opcode(datagram)?;
    if op != OP_DMX {
        return Err(Rejection::WrongOpcode(op));
    }
    if datagram.len() < DMX_HEADER_LEN {
        return Err(Rejection::TooShort);
    }

    let got = u16::from_le_bytes([datagram[14], datagram[15]]);
    if got != universe {
        return Err(Rejection::UniverseMismatch {
            expected: universe,
            got,
        });
    }

    let declared = u16::from_be_bytes([datagram[16], datagram[17]]) as usize;
    let available = datagram.len() - DMX_HEADER_LEN;
    if declared > available || declared > DMX_CHANNELS {
        return Err(Rejection::LengthOverflow {
            declared,
            available: available.min(DMX_CHANNELS),
        });
    }

    Ok(DmxFrame {
        universe: got,
        sequence: datagram[12],
        physical: datagram[13],
        data: Bytes::copy_from_slice(&datagram[DMX_HEADER_LEN..DMX_HEADER_LEN + declared]),
    })
}

/// ArtPoll 여부
pub fn parse_poll(datagram: &[u8]) -> bool {
    matches!(opcode(datagram), Ok(OP_POLL))
}

/// ArtPollReply 생성 (항상 239 bytes, 미사용 바이트는 0)
pub fn build_poll_reply(
    local_ip: Ipv4Addr,
    short_name: &str,
    long_name: &str,
    universe: u16,
) -> Bytes {
    let mut b = BytesMut::zeroed(POLL_REPLY_LEN);

    b[..8].copy_from_slice(ARTNET_ID);
    b[8..10].copy_from_slice(&OP_POLL_REPLY.to_le_bytes());
    b[10..14].copy_from_slice(&local_ip.octets());
    b[14..16].copy_from_slice(&ARTNET_PORT.to_be_bytes());
    b[16] = 0x00; // VersInfo
    b[17] = 0x01;
    b[18] = 0x00; // NetSwitch
    b[19] = 0x00; // SubSwitch
    b[20] = 0x01; // Oem
    b[21] = 0x23;
    put_name(&mut b, SHORT_NAME_OFFSET, SHORT_NAME_LEN, short_name);
    put_name(&mut b, LONG_NAME_OFFSET, LONG_NAME_LEN, long_name);
    b[NODE_REPORT_OFFSET..NODE_REPORT_OFFSET + NODE_REPORT.len()].copy_from_slice(NODE_REPORT);
    b[172] = 0x01; // NumPorts
    b[190] = (universe & 0xFF) as u8;
    b[191] = (universe >> 8) as u8;

    b.freeze()
}

/// 이름 필드 기록 - 마지막 바이트는 항상 NUL
fn put_name(buf: &mut [u8], offset: usize, slot: usize, name: &str) {
    let bytes = name.as_bytes();
    let n = bytes.len().min(slot - 1);
    buf[offset..offset + n].copy_from_slice(&bytes[..n]);
}

/// ArtDmx 생성 (콘솔 시뮬레이터 / 테스트용)
///
/// 채널은 512개까지만 기록, 길이는 짝수로 패딩
pub fn build_dmx(universe: u16, sequence: u8, channels: &[u8]) -> Bytes {
    let channels = &channels[..channels.len().min(DMX_CHANNELS)];
    let length = channels.len() + channels.len() % 2;

    let mut buf = BytesMut::with_capacity(DMX_HEADER_LEN + length);
    buf.put_slice(ARTNET_ID);
    buf.put_u16_le(OP_DMX);
    buf.put_u16(PROTOCOL_REVISION);
    buf.put_u8(sequence);
    buf.put_u8(0);
    buf.put_u16_le(universe);
    buf.put_u16(length as u16);
    buf.put_slice(channels);
    if length > channels.len() {
        buf.put_u8(0);
    }
    buf.freeze()
}

/// ArtPoll 생성
pub fn build_poll() -> Bytes {
    let mut buf = BytesMut::with_capacity(14);
    buf.put_slice(ARTNET_ID);
    buf.put_u16_le(OP_POLL);
    buf.put_u16(PROTOCOL_REVISION);
    buf.put_u8(0); // Flags
    buf.put_u8(0); // DiagPriority
    buf.freeze()
}

/// 유니버스별 멀티캐스트 그룹 239.255.<hi>.<lo>
pub fn multicast_group(universe: u16) -> Ipv4Addr {
    let [hi, lo] = universe.to_be_bytes();
    Ipv4Addr::new(239, 255, hi, lo)
}
