//! 에러 타입 정의

use thiserror::Error;

/// 브리지 에러 타입
///
/// 데이터그램 단위의 거부는 여기에 포함되지 않음 (`codec::Rejection` 참고)
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("조명 개수는 1~{max} 사이여야 함: got {got}")]
    InvalidLightCount { got: usize, max: usize },

    #[error("DMX 시작 채널은 1~512 사이여야 함: got {0}")]
    InvalidStartChannel(u16),

    #[error("DMX 범위 초과: start_channel {start} + 3 * {lights} lights - 1 > 512")]
    ChannelRangeExceeded { start: u16, lights: usize },

    #[error("Art-Net 유니버스는 0~32767 사이여야 함: got {0}")]
    InvalidUniverse(u16),

    #[error("필수 설정 누락: {0}")]
    EmptyField(&'static str),

    #[error("지원하지 않는 설정 버전: {0}")]
    UnsupportedConfigVersion(u32),

    #[error("설정 파일 파싱 실패: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("클라이언트 키 디코딩 실패: {0}")]
    KeyDecode(#[from] hex::FromHexError),

    #[error("DTLS 핸드쉐이크 타임아웃 ({0}ms)")]
    HandshakeTimeout(u64),

    #[error("DTLS 에러: {0}")]
    Dtls(#[from] webrtc_dtls::Error),

    #[error("스트리밍 세션이 연결되지 않음")]
    NotConnected,

    #[error("HTTP 에러: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Hue 브리지 응답 에러: {0}")]
    HueApi(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
