//! Utility functions for socket operations

use super::IpVersion;
use anyhow::Result;
use socket2::Socket;
use std::io;

// Common POSIX error codes
const EPERM: i32 = 1; // Operation not permitted
const EACCES: i32 = 13; // Permission denied

/// Check if running as root
pub fn is_root() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// True when socket creation failed for lack of privileges
pub fn is_permission_error(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
        || err
            .raw_os_error()
            .map(|code| code == EPERM || code == EACCES)
            .unwrap_or(false)
}

/// True when the kernel refused to send because the datagram exceeds the path MTU
pub fn is_message_too_long(err: &io::Error) -> bool {
    #[cfg(unix)]
    let emsgsize = libc::EMSGSIZE;
    #[cfg(not(unix))]
    let emsgsize = 10040; // WSAEMSGSIZE

    err.raw_os_error() == Some(emsgsize)
}

/// Human-readable remedy for a failed ICMP socket open
pub fn permission_hint() -> (&'static str, &'static str) {
    if cfg!(target_os = "linux") {
        (
            "root or CAP_NET_RAW",
            "Run with sudo, grant CAP_NET_RAW, or allow datagram ICMP with: sudo sysctl -w net.ipv4.ping_group_range=\"0 2147483647\"",
        )
    } else if cfg!(windows) {
        (
            "Administrator",
            "Run the terminal as Administrator",
        )
    } else {
        ("root", "Run with sudo")
    }
}

/// Set the don't-fragment behaviour for outgoing datagrams
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn set_dont_fragment(socket: &Socket, version: IpVersion) -> Result<()> {
    match version {
        IpVersion::V4 => setsockopt_int(
            socket,
            libc::IPPROTO_IP,
            libc::IP_MTU_DISCOVER,
            libc::IP_PMTUDISC_DO,
        ),
        IpVersion::V6 => setsockopt_int(
            socket,
            libc::IPPROTO_IPV6,
            libc::IPV6_MTU_DISCOVER,
            libc::IPV6_PMTUDISC_DO,
        ),
    }
}

/// Set the don't-fragment behaviour for outgoing datagrams
#[cfg(any(target_os = "macos", target_os = "freebsd"))]
pub fn set_dont_fragment(socket: &Socket, version: IpVersion) -> Result<()> {
    // IP_DONTFRAG = 28 on macOS and FreeBSD, IPV6_DONTFRAG = 62 on both
    const IP_DONTFRAG: libc::c_int = 28;
    const IPV6_DONTFRAG: libc::c_int = 62;

    match version {
        IpVersion::V4 => setsockopt_int(socket, libc::IPPROTO_IP, IP_DONTFRAG, 1),
        IpVersion::V6 => setsockopt_int(socket, libc::IPPROTO_IPV6, IPV6_DONTFRAG, 1),
    }
}

/// Set the don't-fragment behaviour for outgoing datagrams
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "freebsd"
)))]
pub fn set_dont_fragment(_socket: &Socket, version: IpVersion) -> Result<()> {
    Err(anyhow::anyhow!(
        "Don't-fragment is not supported for {version} on this platform"
    ))
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "freebsd"
))]
fn setsockopt_int(
    socket: &Socket,
    level: libc::c_int,
    name: libc::c_int,
    value: libc::c_int,
) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the pointer and length describe a live c_int for the duration of the call
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            level,
            name,
            &value as *const _ as *const libc::c_void,
            std::mem::size_of_val(&value) as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(())
}
