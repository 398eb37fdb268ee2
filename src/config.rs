//! 브리지 설정
//!
//! - `RawConfig`: CLI 플래그 / TOML 파일에서 채워지는 버전 있는 입력 형태
//! - `Config`: 생성 시 한 번 검증된 불변 설정 (`Arc<Config>`로 공유)

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, DMX_CHANNELS, HUE_STREAMING_PORT};

/// 현재 설정 포맷 버전
pub const CONFIG_VERSION: u32 = 1;

/// 엔터테인먼트 존 최대 조명 수
pub const MAX_LIGHTS: usize = 10;

/// 조명 하나가 차지하는 DMX 채널 수 (R, G, B)
pub const CHANNELS_PER_LIGHT: usize = 3;

/// Art-Net 15비트 포트 주소 상한
pub const MAX_UNIVERSE: u16 = 0x7FFF;

/// ArtPollReply 기본 short name
pub const DEFAULT_SHORT_NAME: &str = "artnet-to-hue";

/// ArtPollReply 기본 long name
pub const DEFAULT_LONG_NAME: &str = "Artnet to Hue Bridge";

/// 기본 핸드쉐이크 타임아웃 (밀리초)
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// 검증 전 입력 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    /// 설정 포맷 버전
    pub version: u32,

    /// Hue 브리지 주소
    pub bridge_ip: IpAddr,

    /// 애플리케이션 키 (pair 명령으로 발급)
    pub username: String,

    /// DTLS PSK (hex 문자열)
    pub client_key: String,

    /// 엔터테인먼트 존 ID
    pub entertainment_zone: String,

    /// 존 내 조명 수 (1~10)
    pub lights: usize,

    /// Art-Net 유니버스
    pub universe: u16,

    /// DMX 시작 채널 (1부터)
    pub start_channel: u16,

    /// 디버그 로깅
    pub debug: bool,

    pub short_name: String,

    pub long_name: String,

    /// 초당 최대 전송 프레임 수 (None이면 제한 없음)
    pub max_fps: Option<u32>,

    pub handshake_timeout_ms: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            bridge_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            username: String::new(),
            client_key: String::new(),
            entertainment_zone: String::new(),
            lights: MAX_LIGHTS,
            universe: 0,
            start_channel: 1,
            debug: false,
            short_name: DEFAULT_SHORT_NAME.to_string(),
            long_name: DEFAULT_LONG_NAME.to_string(),
            max_fps: None,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
        }
    }
}

impl RawConfig {
    /// TOML 문자열에서 로드 (누락된 필드는 기본값)
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// TOML 파일에서 로드
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// 검증된 실행 설정
#[derive(Debug, Clone)]
pub struct Config {
    bridge_ip: IpAddr,
    username: String,
    client_key: String,
    entertainment_zone: String,
    lights: usize,
    universe: u16,
    start_channel: u16,
    debug: bool,
    short_name: String,
    long_name: String,
    max_fps: Option<u32>,
    handshake_timeout: Duration,
}

impl Config {
    /// 입력 검증 후 설정 생성
    ///
    /// 부분적으로 유효한 설정은 만들어지지 않음
    pub fn new(raw: RawConfig) -> Result<Self> {
        if raw.version != CONFIG_VERSION {
            return Err(Error::UnsupportedConfigVersion(raw.version));
        }
        if raw.bridge_ip.is_unspecified() {
            return Err(Error::EmptyField("bridge_ip"));
        }
        if raw.username.is_empty() {
            return Err(Error::EmptyField("username"));
        }
        if raw.client_key.is_empty() {
            return Err(Error::EmptyField("client_key"));
        }
        if raw.entertainment_zone.is_empty() {
            return Err(Error::EmptyField("entertainment_zone"));
        }
        if raw.lights == 0 || raw.lights > MAX_LIGHTS {
            return Err(Error::InvalidLightCount {
                got: raw.lights,
                max: MAX_LIGHTS,
            });
        }
        if raw.universe > MAX_UNIVERSE {
            return Err(Error::InvalidUniverse(raw.universe));
        }
        if raw.start_channel == 0 || raw.start_channel as usize > DMX_CHANNELS {
            return Err(Error::InvalidStartChannel(raw.start_channel));
        }
        if raw.start_channel as usize + CHANNELS_PER_LIGHT * raw.lights - 1 > DMX_CHANNELS {
            return Err(Error::ChannelRangeExceeded {
                start: raw.start_channel,
                lights: raw.lights,
            });
        }
        hex::decode(&raw.client_key)?;

        Ok(Self {
            bridge_ip: raw.bridge_ip,
            username: raw.username,
            client_key: raw.client_key,
            entertainment_zone: raw.entertainment_zone,
            lights: raw.lights,
            universe: raw.universe,
            start_channel: raw.start_channel,
            debug: raw.debug,
            short_name: raw.short_name,
            long_name: raw.long_name,
            max_fps: raw.max_fps.filter(|&fps| fps > 0),
            handshake_timeout: Duration::from_millis(raw.handshake_timeout_ms),
        })
    }

    pub fn bridge_ip(&self) -> IpAddr {
        self.bridge_ip
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// hex 인코딩된 클라이언트 키
    pub fn client_key(&self) -> &str {
        &self.client_key
    }

    pub fn entertainment_zone(&self) -> &str {
        &self.entertainment_zone
    }

    pub fn lights(&self) -> usize {
        self.lights
    }

    pub fn universe(&self) -> u16 {
        self.universe
    }

    /// 1부터 시작하는 DMX 시작 채널
    pub fn start_channel(&self) -> u16 {
        self.start_channel
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn long_name(&self) -> &str {
        &self.long_name
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// 필요한 채널 윈도우 길이 (3 * lights)
    pub fn window_len(&self) -> usize {
        CHANNELS_PER_LIGHT * self.lights
    }

    /// 스트리밍 엔드포인트 (브리지:2100)
    pub fn streaming_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bridge_ip, HUE_STREAMING_PORT)
    }

    /// 전송 간 최소 간격 (max_fps 미설정 시 None)
    pub fn min_frame_interval(&self) -> Option<Duration> {
        self.max_fps
            .map(|fps| Duration::from_nanos(1_000_000_000 / fps as u64))
    }
}

/// 다른 모듈 테스트용 설정 (universe 3, 시작 채널 1, 조명 2개)
#[cfg(test)]
pub(crate) fn test_raw_config() -> RawConfig {
    RawConfig {
        bridge_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2)),
        username: "user".into(),
        client_key: "00112233445566778899aabbccddeeff".into(),
        entertainment_zone: "zone".into(),
        lights: 2,
        universe: 3,
        start_channel: 1,
        ..RawConfig::default()
    }
}
