//! artnet-to-hue - Art-Net → Hue Entertainment 브리지
//!
//! 사용법:
//!   artnet-to-hue discover
//!   artnet-to-hue pair -i <BRIDGE_IP>
//!   artnet-to-hue bridge-info -i <BRIDGE_IP> -u <USERNAME>
//!   artnet-to-hue server -i <BRIDGE_IP> -u <USERNAME> -c <CLIENT_KEY> -e <ZONE_ID> [OPTIONS]
//!
//! 예시:
//!   # 유니버스 1, 채널 10부터 조명 4개
//!   artnet-to-hue server -i 192.168.1.2 -u abc -c 0011.. -e 1a8d.. -l 4 -n 1 -a 10
//!
//!   # 설정 파일 + 디버그 (플래그가 파일 값을 덮어씀)
//!   artnet-to-hue server --config bridge.toml -d

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use artnet_hue::hue_api::{self, HueApi};
use artnet_hue::{Bridge, Config, RawConfig, Receiver, StreamSession};

/// 디버그 모드 통계 출력 주기
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// artnet-to-hue is a bridge between Art-Net and Philips Hue.
#[derive(Parser, Debug)]
#[command(name = "artnet-to-hue")]
#[command(about = "Control Philips Hue lights in an entertainment zone using Art-Net packets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the Art-Net to Hue bridge server
    Server(ServerArgs),

    /// Create a new user on the hue bridge
    Pair {
        /// IP address of the hue bridge
        #[arg(short = 'i', long)]
        hue_bridge_ip: IpAddr,
    },

    /// Discover Hue bridges on the network
    Discover,

    /// Get information about entertainment zones on the bridge
    BridgeInfo {
        /// IP address of the hue bridge
        #[arg(short = 'i', long)]
        hue_bridge_ip: IpAddr,

        /// Username for the hue bridge
        #[arg(short, long)]
        username: String,
    },
}

#[derive(Args, Debug)]
struct ServerArgs {
    /// TOML configuration file (flags override its values)
    #[arg(long)]
    config: Option<PathBuf>,

    /// IP address of the hue bridge
    #[arg(short = 'i', long)]
    hue_bridge_ip: Option<IpAddr>,

    /// Username for the hue bridge
    #[arg(short, long)]
    username: Option<String>,

    /// Client key for the hue bridge (used for DTLS authentication)
    #[arg(short, long)]
    client_key: Option<String>,

    /// Entertainment zone ID for the hue bridge
    #[arg(short, long)]
    entertainment_zone: Option<String>,

    /// Number of lights in the entertainment zone [default: 10]
    #[arg(short, long)]
    lights: Option<usize>,

    /// Art-Net universe to listen on [default: 0]
    #[arg(short = 'n', long)]
    artnet_universe: Option<u16>,

    /// Art-Net DMX start channel [default: 1]
    #[arg(short = 'a', long)]
    artnet_dmx_start: Option<u16>,

    /// Maximum frames per second sent to the bridge
    #[arg(long)]
    max_fps: Option<u32>,

    /// Debug mode
    #[arg(short, long)]
    debug: bool,
}

impl ServerArgs {
    /// 설정 파일(있으면) 위에 플래그 적용
    fn into_raw(self) -> artnet_hue::Result<RawConfig> {
        let mut raw = match &self.config {
            Some(path) => RawConfig::from_toml_file(path)?,
            None => RawConfig::default(),
        };

        if let Some(ip) = self.hue_bridge_ip {
            raw.bridge_ip = ip;
        }
        if let Some(username) = self.username {
            raw.username = username;
        }
        if let Some(client_key) = self.client_key {
            raw.client_key = client_key;
        }
        if let Some(zone) = self.entertainment_zone {
            raw.entertainment_zone = zone;
        }
        if let Some(lights) = self.lights {
            raw.lights = lights;
        }
        if let Some(universe) = self.artnet_universe {
            raw.universe = universe;
        }
        if let Some(start) = self.artnet_dmx_start {
            raw.start_channel = start;
        }
        if self.max_fps.is_some() {
            raw.max_fps = self.max_fps;
        }
        if self.debug {
            raw.debug = true;
        }

        Ok(raw)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Server(args) => {
            // 로그 레벨은 설정 파일까지 반영한 값으로 결정
            let raw = args.into_raw()?;
            init_logging(raw.debug)?;
            if let Err(e) = run_server(raw).await {
                error!("Server stopped: {}", e);
                std::process::exit(1);
            }
        }
        Command::Pair { hue_bridge_ip } => {
            init_logging(false)?;
            run_pair(hue_bridge_ip).await?
        }
        Command::Discover => {
            init_logging(false)?;
            run_discover().await?
        }
        Command::BridgeInfo {
            hue_bridge_ip,
            username,
        } => {
            init_logging(false)?;
            run_bridge_info(hue_bridge_ip, username).await?
        }
    }

    Ok(())
}

/// RUST_LOG가 없을 때 쓰는 필터
fn default_filter(debug: bool) -> &'static str {
    if debug {
        "info,artnet_hue=debug,artnet_to_hue=debug"
    } else {
        "info"
    }
}

/// 로깅 설정 - RUST_LOG가 있으면 우선
fn init_logging(debug: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run_server(raw: RawConfig) -> artnet_hue::Result<()> {
    let config = Arc::new(Config::new(raw)?);

    if config.debug() {
        info!("Debug mode is enabled");
    }
    info!(
        "Starting server with Hue Bridge IP: {}, Username: {}, Entertainment Zone: {}, Art-Net Universe: {}, Art-Net DMX Start: {}",
        config.bridge_ip(),
        config.username(),
        config.entertainment_zone(),
        config.universe(),
        config.start_channel()
    );

    let receiver = Receiver::open(config.clone()).await?;

    let api = HueApi::from_config(&config)?;
    let application_id = api.application_id().await?;
    api.set_streaming(config.entertainment_zone(), true).await?;
    info!("Entertainment zone {} started", config.entertainment_zone());

    let bridge = Bridge::new(config.clone(), Arc::new(StreamSession::dtls()));
    if let Err(e) = bridge.connect(&application_id).await {
        stop_zone(&api, &config).await;
        return Err(e);
    }

    let frames = receiver.subscribe();

    let report = async {
        if !config.debug() {
            return std::future::pending::<()>().await;
        }
        let mut ticker = tokio::time::interval(STATS_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!("[Art-Net] {}", receiver.stats().summary());
            info!("[Hue] {}", bridge.stats().summary());
        }
    };

    tokio::select! {
        _ = bridge.run(frames) => {
            warn!("Frame stream ended unexpectedly");
        }
        _ = report => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Ctrl-C 핸들러 실패: {}", e);
            }
            info!("Shutting down...");
        }
    }

    receiver.stop();
    stop_zone(&api, &config).await;

    info!("[Art-Net] {}", receiver.stats().summary());
    info!("[Hue] {}", bridge.stats().summary());
    Ok(())
}

/// 엔터테인먼트 영역 중지 (실패는 로그만)
async fn stop_zone(api: &HueApi, config: &Config) {
    match api.set_streaming(config.entertainment_zone(), false).await {
        Ok(()) => info!("Entertainment zone {} stopped", config.entertainment_zone()),
        Err(e) => warn!("Failed to stop entertainment area: {}", e),
    }
}

async fn run_pair(bridge_ip: IpAddr) -> Result<(), Box<dyn std::error::Error>> {
    if bridge_ip.is_unspecified() {
        return Err("Hue bridge IP address is required".into());
    }

    let device_type = format!("artnet-to-hue#{}", hostname());
    info!("Press the link button on the bridge, then wait for pairing ({})", device_type);

    let api = HueApi::new(bridge_ip, "")?;
    let credentials = api.pair(&device_type).await?;

    println!("Be sure to read the help for server. You can now use this username to run the server with the following command:");
    println!(
        "artnet-to-hue server -i {} -u {} -c {} -e zone",
        bridge_ip, credentials.username, credentials.client_key
    );
    println!(
        "To get the entertainment zone ID's use: artnet-to-hue bridge-info -i {} -u {}",
        bridge_ip, credentials.username
    );
    Ok(())
}

async fn run_discover() -> Result<(), Box<dyn std::error::Error>> {
    println!("Running discovery of Hue bridges...");

    let bridges = hue_api::discover_bridges().await?;
    if bridges.is_empty() {
        println!("No Hue bridges found");
    }
    for bridge in bridges {
        println!(
            "Found Hue bridge ({}), to use this run: artnet-to-hue pair -i {}",
            bridge.id, bridge.internal_ip
        );
    }
    Ok(())
}

async fn run_bridge_info(bridge_ip: IpAddr, username: String) -> Result<(), Box<dyn std::error::Error>> {
    if bridge_ip.is_unspecified() {
        return Err("Hue bridge IP address is required".into());
    }
    if username.is_empty() {
        return Err("Username for the Hue bridge is required".into());
    }

    let api = HueApi::new(bridge_ip, username)?;
    for zone in api.entertainment_zones().await? {
        println!("ID: {}, Name: {}, Status: {}", zone.id, zone.name, zone.status);
    }
    Ok(())
}

/// 페어링 device type에 넣을 호스트 이름
fn hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|e| {
            warn!("Error getting hostname, fallback: unknown ({})", e);
            "unknown".into()
        })
}
