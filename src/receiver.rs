//! Art-Net 수신자
//!
//! - 6454 포트 바인드 + 유니버스별 멀티캐스트 가입 (NIC별, 실패는 무시)
//! - 프레임 루프: 데이터그램 분류 → ArtDmx 검증 → 채널 윈도우 추출 → 싱크로 전달
//! - 폴 루프: ArtPoll에 ArtPollReply 유니캐스트 응답
//!
//! 두 루프는 같은 소켓을 공유하므로 읽기는 프레임 루프만 수행하고,
//! ArtPoll은 채널로 폴 루프에 넘긴다.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::codec;
use crate::interfaces::{self, NicInfo};
use crate::stats::{ReceiverSnapshot, ReceiverStats};
use crate::{Config, Result, ARTNET_PORT};

/// 대기 중인 ArtPoll 최대 수
const POLL_QUEUE_DEPTH: usize = 16;

/// 수신 버퍼 (ArtDmx 최대 530 bytes)
const RECV_BUFFER_SIZE: usize = 2048;

/// 싱크와 스트림이 공유하는 단일 슬롯
#[derive(Default)]
struct Slot {
    /// 아직 소비되지 않은 최신 윈도우
    pending: Mutex<Option<Bytes>>,
    notify: Notify,
    sink_closed: AtomicBool,
    stream_closed: AtomicBool,
}

/// 슬롯 기록 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    Stored,
    /// 소비되지 않은 이전 윈도우를 덮어씀
    Replaced,
    /// 스트림이 이미 닫힘
    Closed,
}

/// 윈도우 생산자 - 항상 최신 윈도우 하나만 남김
pub struct FrameSink {
    slot: Arc<Slot>,
}

impl FrameSink {
    pub fn publish(&self, window: Bytes) -> Publish {
        if self.slot.stream_closed.load(Ordering::Acquire) {
            return Publish::Closed;
        }

        let previous = self.slot.pending.lock().replace(window);
        self.slot.notify.notify_one();
        if previous.is_some() {
            Publish::Replaced
        } else {
            Publish::Stored
        }
    }
}

impl Drop for FrameSink {
    fn drop(&mut self) {
        self.slot.sink_closed.store(true, Ordering::Release);
        self.slot.notify.notify_one();
    }
}

/// 수락된 채널 윈도우 스트림
///
/// 소비자가 늦으면 중간 윈도우는 건너뛰고 가장 최근 것만 받음.
/// 받는 윈도우는 항상 도착 순서를 따름
pub struct FrameStream {
    slot: Arc<Slot>,
}

impl FrameStream {
    /// 다음 윈도우 대기 (싱크가 닫히고 남은 윈도우가 없으면 None)
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            let pending = self.slot.pending.lock().take();
            if pending.is_some() {
                return pending;
            }
            if self.slot.sink_closed.load(Ordering::Acquire) {
                return None;
            }
            self.slot.notify.notified().await;
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.slot.stream_closed.store(true, Ordering::Release);
    }
}

/// 최신 윈도우 슬롯 생성
pub fn frame_channel() -> (FrameSink, FrameStream) {
    let slot = Arc::new(Slot::default());
    (FrameSink { slot: slot.clone() }, FrameStream { slot })
}

/// 수신 태스크 간 공유 상태
struct Shared {
    config: Arc<Config>,

    /// 현재 등록된 싱크 (최대 1개)
    sink: Mutex<Option<FrameSink>>,

    stats: ReceiverStats,
}

impl Shared {
    /// 데이터그램 하나 처리 - 어떤 입력에도 패닉하거나 블록하지 않음
    fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr, poll_tx: &mpsc::Sender<SocketAddr>) {
        self.stats.record_datagram();

        if codec::parse_poll(datagram) {
            if self.config.debug() {
                debug!("Received ArtPoll from {}", peer);
            }
            if let Err(TrySendError::Full(_)) = poll_tx.try_send(peer) {
                debug!("ArtPoll 대기열 가득 참, 무시: {}", peer);
            }
            return;
        }

        let frame = match codec::parse_frame(datagram, self.config.universe()) {
            Ok(frame) => frame,
            Err(reason) => {
                trace!("데이터그램 거부 ({}): {:?}", peer, reason);
                self.stats.record_rejected(reason);
                return;
            }
        };

        let window = match frame.window(self.config.start_channel(), self.config.window_len()) {
            Ok(window) => window,
            Err(reason) => {
                if self.config.debug() {
                    debug!("프레임 거부 ({}): {:?}", peer, reason);
                }
                self.stats.record_rejected(reason);
                return;
            }
        };

        self.stats.record_accepted();
        self.deliver(window);
    }

    /// 싱크로 전달 - 소비되지 않은 이전 윈도우는 새 윈도우로 교체
    fn deliver(&self, window: Bytes) {
        let mut sink = self.sink.lock();
        let Some(frames) = sink.as_ref() else {
            self.stats.record_dropped();
            return;
        };

        match frames.publish(window) {
            Publish::Stored => {}
            Publish::Replaced => {
                trace!("소비되지 않은 윈도우 교체");
                self.stats.record_dropped();
            }
            Publish::Closed => {
                debug!("싱크 닫힘, 등록 해제");
                *sink = None;
                self.stats.record_dropped();
            }
        }
    }

    /// 싱크 교체 - 이후 모든 프레임은 새 싱크로 감
    fn replace_sink(&self) -> FrameStream {
        let (sink, frames) = frame_channel();
        *self.sink.lock() = Some(sink);
        frames
    }
}

/// 수신자 핸들
pub struct Receiver {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    joined: Vec<NicInfo>,
    runtime: Handle,
    frame_task: JoinHandle<()>,
    poll_task: JoinHandle<()>,
}

impl Receiver {
    /// 0.0.0.0:6454에 바인드하고 수신 시작
    pub async fn open(config: Arc<Config>) -> Result<Self> {
        Self::open_on(config, SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), ARTNET_PORT)).await
    }

    /// 지정 주소에 바인드하고 수신 시작
    ///
    /// 바인드 실패는 치명적, 멀티캐스트 가입 실패는 NIC별로 무시
    pub async fn open_on(config: Arc<Config>, bind_addr: SocketAddr) -> Result<Self> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let local_addr = socket.local_addr()?;

        let joined = join_universe_group(&socket, config.universe());

        info!(
            "Art-Net receiver listening on {}, universe {}, channels {}..{}",
            local_addr,
            config.universe(),
            config.start_channel(),
            config.start_channel() as usize + config.window_len() - 1
        );

        let shared = Arc::new(Shared {
            config: config.clone(),
            sink: Mutex::new(None),
            stats: ReceiverStats::new(),
        });

        let (poll_tx, poll_rx) = mpsc::channel::<SocketAddr>(POLL_QUEUE_DEPTH);

        // 폴 응답 태스크
        let poll_task = tokio::spawn(poll_loop(
            socket.clone(),
            shared.clone(),
            local_addr,
            poll_rx,
        ));

        // 프레임 수신 태스크
        let frame_task = tokio::spawn(frame_loop(socket, shared.clone(), poll_tx));

        Ok(Self {
            shared,
            local_addr,
            joined,
            runtime: Handle::current(),
            frame_task,
            poll_task,
        })
    }

    /// 최신 윈도우 스트림 구독
    ///
    /// 기존 싱크(콜백 포함)는 즉시 교체됨
    pub fn subscribe(&self) -> FrameStream {
        self.shared.replace_sink()
    }

    /// 콜백 등록 (기존 싱크 교체)
    ///
    /// 콜백은 전용 태스크에서 프레임 순서대로 하나씩 호출됨.
    /// 이미 이전 싱크에 들어간 프레임은 이전 콜백이 처리
    pub fn on_update<F>(&self, callback: F)
    where
        F: Fn(Bytes) + Send + 'static,
    {
        let mut frames = self.subscribe();
        self.runtime.spawn(async move {
            while let Some(window) = frames.recv().await {
                callback(window);
            }
        });
    }

    /// 실제 바인드된 주소
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 멀티캐스트 가입에 성공한 인터페이스
    pub fn joined_interfaces(&self) -> &[NicInfo] {
        &self.joined
    }

    /// 통계 반환
    pub fn stats(&self) -> ReceiverSnapshot {
        self.shared.stats.snapshot()
    }

    /// 폴 루프 실행 중 여부 (응답 전송 실패 시 종료됨)
    pub fn is_answering_polls(&self) -> bool {
        !self.poll_task.is_finished()
    }

    /// 정지
    pub fn stop(&self) {
        self.frame_task.abort();
        self.poll_task.abort();
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// UP + MULTICAST 인터페이스마다 239.255.<hi>.<lo> 가입
fn join_universe_group(socket: &UdpSocket, universe: u16) -> Vec<NicInfo> {
    let group = codec::multicast_group(universe);
    let nics = interfaces::list_ipv4();
    let mut joined = Vec::new();

    for nic in interfaces::multicast_capable(&nics) {
        match socket.join_multicast_v4(group, nic.addr) {
            Ok(()) => {
                debug!("멀티캐스트 {} 가입: {} ({})", group, nic.name, nic.addr);
                joined.push(nic.clone());
            }
            Err(e) => {
                debug!("멀티캐스트 {} 가입 실패: {} ({}): {}", group, nic.name, nic.addr, e);
            }
        }
    }

    if nics.is_empty() {
        // 인터페이스 나열 불가 → 기본 인터페이스로 시도
        if let Err(e) = socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED) {
            debug!("멀티캐스트 {} 가입 실패 (default): {}", group, e);
        }
    } else if joined.is_empty() {
        warn!("멀티캐스트 {} 가입한 인터페이스 없음, 브로드캐스트/유니캐스트만 수신", group);
    } else {
        info!("Joined multicast group {} on {} interface(s)", group, joined.len());
    }

    joined
}

/// 프레임 루프 - 읽기 에러는 무시하고 계속
async fn frame_loop(socket: Arc<UdpSocket>, shared: Arc<Shared>, poll_tx: mpsc::Sender<SocketAddr>) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, peer)) => {
                shared.handle_datagram(&buf[..len], peer, &poll_tx);
            }
            Err(e) => {
                debug!("수신 에러: {}", e);
                tokio::task::yield_now().await;
            }
        }
    }
}

/// 폴 루프 - 응답 전송 실패 시 종료
async fn poll_loop(
    socket: Arc<UdpSocket>,
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    mut poll_rx: mpsc::Receiver<SocketAddr>,
) {
    while let Some(peer) = poll_rx.recv().await {
        let advertised = advertised_ip(local_addr, peer);
        let reply = codec::build_poll_reply(
            advertised,
            shared.config.short_name(),
            shared.config.long_name(),
            shared.config.universe(),
        );

        if let Err(e) = socket.send_to(&reply, peer).await {
            error!("ArtPollReply 전송 실패 ({}): {}, 폴 응답 중단", peer, e);
            return;
        }

        shared.stats.record_poll_answered();
        if shared.config.debug() {
            debug!("Sent ArtPollReply to {} advertising {}", peer, advertised);
        }
    }
}

/// ArtPollReply에 넣을 주소
///
/// 특정 주소에 바인드했다면 그 주소, 아니면 poller 기준으로 인터페이스 선택
fn advertised_ip(local_addr: SocketAddr, peer: SocketAddr) -> Ipv4Addr {
    if let IpAddr::V4(bound) = local_addr.ip() {
        if !bound.is_unspecified() {
            return bound;
        }
    }

    let peer = match peer.ip() {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(v6) => v6.to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
    };
    interfaces::reply_addr_for(&interfaces::list_ipv4(), peer)
}
