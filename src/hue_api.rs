//! 허브 HTTP API
//!
//! 스트리밍 경로 밖의 단순 요청/응답 래퍼:
//! - 브리지 탐색 (공개 디렉터리)
//! - 페어링 (username + client key 발급)
//! - 애플리케이션 ID 조회 (DTLS PSK identity)
//! - 엔터테인먼트 영역 목록 / 스트리밍 시작·중지
//!
//! 허브는 자체 서명 인증서를 쓰므로 인증서 검증 생략

use std::net::IpAddr;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{Config, Error, Result};

/// 공개 브리지 디렉터리
pub const DISCOVERY_URL: &str = "https://discovery.meethue.com/";

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub const APPLICATION_KEY_HEADER: &str = "hue-application-key";
pub const APPLICATION_ID_HEADER: &str = "hue-application-id";

/// 탐색된 브리지
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BridgeInfo {
    pub id: String,

    #[serde(rename = "internalipaddress")]
    pub internal_ip: String,

    #[serde(default)]
    pub port: u16,
}

/// 페어링 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub client_key: String,
}

/// 엔터테인먼트 영역
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntertainmentZone {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub status: String,
}

#[derive(Deserialize)]
struct ZonesResponse {
    #[serde(default)]
    errors: Vec<Value>,

    #[serde(default)]
    data: Vec<EntertainmentZone>,
}

/// 탐색 응답 파싱
pub fn parse_bridges(body: &str) -> Result<Vec<BridgeInfo>> {
    serde_json::from_str(body)
        .map_err(|e| Error::HueApi(format!("failed to decode discovery response: {}", e)))
}

/// 페어링 응답 파싱
///
/// `[{"success":{"username":…,"clientkey":…}}]` 또는
/// `[{"error":{"type":101,"description":"link button not pressed"}}]`
pub fn parse_pair_response(body: &str) -> Result<Credentials> {
    let items: Vec<Value> = serde_json::from_str(body)
        .map_err(|e| Error::HueApi(format!("failed to decode pairing response: {}", e)))?;

    for item in &items {
        if let Some(success) = item.get("success") {
            let Some(username) = success.get("username").and_then(Value::as_str) else {
                continue;
            };
            let client_key = success
                .get("clientkey")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::HueApi("clientkey not found in response".into()))?;

            return Ok(Credentials {
                username: username.to_string(),
                client_key: client_key.to_string(),
            });
        }

        if let Some(error) = item.get("error") {
            let description = error
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(Error::HueApi(format!("error from bridge: {}", description)));
        }
    }

    Err(Error::HueApi("unexpected response from bridge".into()))
}

/// 엔터테인먼트 영역 목록 파싱 (빈 목록은 에러)
pub fn parse_zones(body: &str) -> Result<Vec<EntertainmentZone>> {
    let response: ZonesResponse = serde_json::from_str(body)
        .map_err(|e| Error::HueApi(format!("failed to decode zone list: {}", e)))?;

    if response.data.is_empty() {
        if let Some(first) = response.errors.first() {
            return Err(Error::HueApi(format!("error from bridge: {}", first)));
        }
        return Err(Error::HueApi("no entertainment configuration found".into()));
    }

    Ok(response.data)
}

/// 스트리밍 시작/중지 요청 본문
pub fn streaming_action(active: bool) -> Value {
    serde_json::json!({ "action": if active { "start" } else { "stop" } })
}

/// 공개 디렉터리에서 브리지 탐색 (인증서 검증함)
pub async fn discover_bridges() -> Result<Vec<BridgeInfo>> {
    let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;

    debug!("Bridge discovery: {}", DISCOVERY_URL);
    let body = client.get(DISCOVERY_URL).send().await?.text().await?;
    parse_bridges(&body)
}

/// 브리지 하나에 대한 API 클라이언트
pub struct HueApi {
    client: Client,
    bridge_ip: IpAddr,
    username: String,
}

impl HueApi {
    /// 페어링 전이면 username은 빈 문자열
    pub fn new(bridge_ip: IpAddr, username: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            bridge_ip,
            username: username.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.bridge_ip(), config.username())
    }

    pub fn bridge_ip(&self) -> IpAddr {
        self.bridge_ip
    }

    /// 새 사용자 등록 (브리지 링크 버튼을 먼저 눌러야 함)
    pub async fn pair(&self, device_type: &str) -> Result<Credentials> {
        let url = format!("http://{}/api", self.host());
        let body = serde_json::json!({
            "devicetype": device_type,
            "generateclientkey": true,
        });

        debug!("Pairing request: {}", url);
        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(Error::HueApi(format!(
                "unexpected response from bridge: {}",
                response.status()
            )));
        }

        parse_pair_response(&response.text().await?)
    }

    /// DTLS identity로 쓰는 애플리케이션 ID
    pub async fn application_id(&self) -> Result<String> {
        let url = format!("https://{}/auth/v1", self.host());

        let response = self
            .client
            .get(&url)
            .header(APPLICATION_KEY_HEADER, &self.username)
            .send()
            .await?;

        response
            .headers()
            .get(APPLICATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::HueApi(format!("{} not found in response headers", APPLICATION_ID_HEADER))
            })
    }

    pub async fn entertainment_zones(&self) -> Result<Vec<EntertainmentZone>> {
        let url = format!(
            "https://{}/clip/v2/resource/entertainment_configuration",
            self.host()
        );

        let body = self
            .client
            .get(&url)
            .header(APPLICATION_KEY_HEADER, &self.username)
            .send()
            .await?
            .text()
            .await?;

        parse_zones(&body)
    }

    /// 엔터테인먼트 영역 스트리밍 시작/중지
    pub async fn set_streaming(&self, zone: &str, active: bool) -> Result<()> {
        let url = format!(
            "https://{}/clip/v2/resource/entertainment_configuration/{}",
            self.host(),
            zone
        );

        let response = self
            .client
            .put(&url)
            .header(APPLICATION_KEY_HEADER, &self.username)
            .json(&streaming_action(active))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::HueApi(format!(
                "failed to {} entertainment area: {}",
                if active { "start" } else { "stop" },
                response.status()
            )));
        }
        Ok(())
    }

    fn host(&self) -> String {
        match self.bridge_ip {
            IpAddr::V4(ip) => ip.to_string(),
            IpAddr::V6(ip) => format!("[{}]", ip),
        }
    }
}
