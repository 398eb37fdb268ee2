//! artnet-console - 테스트용 Art-Net 콘솔
//!
//! 브리지를 실제 조명 콘솔 없이 구동:
//! - chase: 조명별 색상 체이스를 ArtDmx로 전송
//! - poll: ArtPoll 전송 후 ArtPollReply 출력
//!
//! 예시:
//!   # 로컬 브리지에 유니버스 0, 조명 4개, 30fps로 10초간
//!   artnet-console chase -t 127.0.0.1:6454 -l 4 --fps 30 --seconds 10
//!
//!   # 브로드캐스트 탐색
//!   artnet-console poll -t 255.255.255.255:6454

use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use artnet_hue::codec::{self, OP_POLL_REPLY, POLL_REPLY_LEN};
use artnet_hue::DMX_CHANNELS;

#[derive(Parser, Debug)]
#[command(name = "artnet-console")]
#[command(about = "Minimal Art-Net console for exercising artnet-to-hue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a colour chase as ArtDmx
    Chase {
        /// Target address
        #[arg(short, long, default_value = "127.0.0.1:6454")]
        target: SocketAddr,

        /// Art-Net universe
        #[arg(short = 'n', long, default_value_t = 0)]
        universe: u16,

        /// Number of RGB lights
        #[arg(short, long, default_value_t = 10)]
        lights: usize,

        /// First DMX channel (1-based)
        #[arg(short = 'a', long, default_value_t = 1)]
        start: u16,

        /// Frames per second
        #[arg(long, default_value_t = 40)]
        fps: u32,

        /// Run time in seconds (0 = until Ctrl-C)
        #[arg(long, default_value_t = 0)]
        seconds: u64,
    },

    /// Send one ArtPoll and print the replies
    Poll {
        /// Target address (broadcast by default)
        #[arg(short, long, default_value = "255.255.255.255:6454")]
        target: SocketAddr,

        /// How long to wait for replies, in milliseconds
        #[arg(long, default_value_t = 2000)]
        wait_ms: u64,
    },
}

/// ArtPollReply 요약
struct Node {
    ip: Ipv4Addr,
    short_name: String,
    long_name: String,
    universe: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match Cli::parse().command {
        Command::Chase {
            target,
            universe,
            lights,
            start,
            fps,
            seconds,
        } => run_chase(target, universe, lights, start, fps, seconds).await,
        Command::Poll { target, wait_ms } => run_poll(target, Duration::from_millis(wait_ms)).await,
    }
}

async fn run_chase(
    target: SocketAddr,
    universe: u16,
    lights: usize,
    start: u16,
    fps: u32,
    seconds: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let first = start.max(1) as usize - 1;
    let channels = first + lights * 3;
    if channels > DMX_CHANNELS {
        return Err(format!("{} lights from channel {} exceed one universe", lights, start).into());
    }

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;

    info!(
        "Chase → {} (universe {}, {} lights from channel {}, {} fps)",
        target, universe, lights, start, fps
    );

    let started = Instant::now();
    let deadline = (seconds > 0).then(|| Duration::from_secs(seconds));
    let mut ticker = tokio::time::interval(Duration::from_secs(1) / fps.max(1));
    let mut data = vec![0u8; channels];
    let mut frame: u32 = 0;
    let mut sent: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }
        if deadline.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }

        for light in 0..lights {
            let hue = (frame * 6 + (light as u32 * 360 / lights.max(1) as u32)) % 360;
            let offset = first + light * 3;
            data[offset..offset + 3].copy_from_slice(&hue_to_rgb(hue));
        }

        // 시퀀스 0은 "순서 없음"이므로 1..=255 순환
        let sequence = (frame % 255 + 1) as u8;
        let packet = codec::build_dmx(universe, sequence, &data);
        if let Err(e) = socket.send_to(&packet, target).await {
            warn!("Send failed: {}", e);
        } else {
            sent += 1;
        }
        frame = frame.wrapping_add(1);
    }

    info!("Sent {} frames in {:.1}s", sent, started.elapsed().as_secs_f64());
    Ok(())
}

async fn run_poll(target: SocketAddr, wait: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;

    socket.send_to(&codec::build_poll(), target).await?;
    info!("ArtPoll sent to {}, waiting {:?}", target, wait);

    let mut buf = vec![0u8; 1024];
    let deadline = tokio::time::Instant::now() + wait;
    let mut found = 0;

    loop {
        let (len, peer) = match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(result) => result?,
            Err(_) => break,
        };

        match parse_reply(&buf[..len]) {
            Some(node) => {
                found += 1;
                println!(
                    "{} ({}) - {} / {} - universe {}",
                    node.ip, peer, node.short_name, node.long_name, node.universe
                );
            }
            None => debug!("Ignoring {} bytes from {}", len, peer),
        }
    }

    println!("{} node(s) replied", found);
    Ok(())
}

fn parse_reply(datagram: &[u8]) -> Option<Node> {
    if datagram.len() < POLL_REPLY_LEN || codec::opcode(datagram).ok()? != OP_POLL_REPLY {
        return None;
    }

    Some(Node {
        ip: Ipv4Addr::new(datagram[10], datagram[11], datagram[12], datagram[13]),
        short_name: nul_terminated(&datagram[26..44]),
        long_name: nul_terminated(&datagram[44..108]),
        universe: u16::from_le_bytes([datagram[190], datagram[191]]),
    })
}

fn nul_terminated(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// 채도/명도 최대인 HSV → RGB
fn hue_to_rgb(hue: u32) -> [u8; 3] {
    let sector = (hue % 360) / 60;
    let rising = ((hue % 60) * 255 / 60) as u8;
    let falling = 255 - rising;

    match sector {
        0 => [255, rising, 0],
        1 => [falling, 255, 0],
        2 => [0, 255, rising],
        3 => [0, falling, 255],
        4 => [rising, 0, 255],
        _ => [255, 0, falling],
    }
}
