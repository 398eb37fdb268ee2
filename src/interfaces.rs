//! 로컬 네트워크 인터페이스
//!
//! - 멀티캐스트 가입 대상 NIC 선택 (UP + MULTICAST)
//! - ArtPollReply에 넣을 로컬 주소 선택

use std::net::Ipv4Addr;

/// IPv4 인터페이스 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicInfo {
    /// 인터페이스 이름
    pub name: String,

    pub addr: Ipv4Addr,

    pub netmask: Ipv4Addr,

    /// 링크 활성 상태
    pub up: bool,

    /// 멀티캐스트 지원 여부
    pub multicast: bool,

    pub loopback: bool,
}

impl NicInfo {
    /// 멀티캐스트 가입 가능 여부
    pub fn joinable(&self) -> bool {
        self.up && self.multicast
    }

    /// peer가 같은 서브넷에 있는지
    pub fn contains(&self, peer: Ipv4Addr) -> bool {
        let mask = u32::from(self.netmask);
        mask != 0 && u32::from(self.addr) & mask == u32::from(peer) & mask
    }
}

/// 모든 IPv4 인터페이스 나열 (실패 시 빈 목록)
#[cfg(unix)]
pub fn list_ipv4() -> Vec<NicInfo> {
    use std::ffi::CStr;

    let mut nics = Vec::new();

    unsafe {
        let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();
        if libc::getifaddrs(&mut ifaddrs) != 0 {
            return nics;
        }

        let mut current = ifaddrs;
        while !current.is_null() {
            let ifa = &*current;

            if !ifa.ifa_addr.is_null() && (*ifa.ifa_addr).sa_family as i32 == libc::AF_INET {
                let addr = ipv4_from_sockaddr(ifa.ifa_addr);
                let netmask = if ifa.ifa_netmask.is_null() {
                    Ipv4Addr::UNSPECIFIED
                } else {
                    ipv4_from_sockaddr(ifa.ifa_netmask)
                };
                let flags = ifa.ifa_flags as libc::c_int;

                nics.push(NicInfo {
                    name: CStr::from_ptr(ifa.ifa_name).to_string_lossy().into_owned(),
                    addr,
                    netmask,
                    up: flags & libc::IFF_UP != 0,
                    multicast: flags & libc::IFF_MULTICAST != 0,
                    loopback: flags & libc::IFF_LOOPBACK != 0,
                });
            }

            current = ifa.ifa_next;
        }

        libc::freeifaddrs(ifaddrs);
    }

    nics
}

#[cfg(unix)]
unsafe fn ipv4_from_sockaddr(sa: *const libc::sockaddr) -> Ipv4Addr {
    let sockaddr_in = sa as *const libc::sockaddr_in;
    Ipv4Addr::from((*sockaddr_in).sin_addr.s_addr.to_ne_bytes())
}

/// 비 unix 플랫폼: 나열 불가, 기본 인터페이스로 가입
#[cfg(not(unix))]
pub fn list_ipv4() -> Vec<NicInfo> {
    Vec::new()
}

/// 멀티캐스트 가입 대상 인터페이스
pub fn multicast_capable(nics: &[NicInfo]) -> Vec<&NicInfo> {
    nics.iter().filter(|nic| nic.joinable()).collect()
}

/// poller에게 알릴 로컬 주소
///
/// 같은 서브넷 인터페이스 → 첫 번째 비 루프백 UP 인터페이스 → 127.0.0.1
pub fn reply_addr_for(nics: &[NicInfo], peer: Ipv4Addr) -> Ipv4Addr {
    nics.iter()
        .filter(|nic| nic.up)
        .find(|nic| nic.contains(peer))
        .or_else(|| nics.iter().find(|nic| nic.up && !nic.loopback))
        .map(|nic| nic.addr)
        .unwrap_or(Ipv4Addr::LOCALHOST)
}
