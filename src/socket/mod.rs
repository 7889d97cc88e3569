//! Socket abstraction layer for dual-stack ICMP echo probing
//!
//! IPv4 and IPv6 differ only in address type, socket domain, wire format and
//! a handful of socket options. Those differences live behind
//! [`AddressFamily`]; everything above this module is written once and
//! parameterized over [`Icmpv4`] or [`Icmpv6`].

use crate::probe::ProbeOptions;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, SockAddr, Socket};
use std::fmt;
use std::hash::Hash;
use std::net::{IpAddr, SocketAddr};

pub mod factory;
pub mod icmp_v4;
pub mod icmp_v6;
pub mod utils;

pub use icmp_v4::Icmpv4;
pub use icmp_v6::Icmpv6;

/// IP version used for probing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpVersion {
    /// IPv4 addressing
    V4,
    /// IPv6 addressing
    V6,
}

impl IpVersion {
    /// Socket domain for this version
    pub fn domain(self) -> Domain {
        match self {
            IpVersion::V4 => Domain::IPV4,
            IpVersion::V6 => Domain::IPV6,
        }
    }

    /// ICMP protocol number for this version
    pub fn icmp_protocol(self) -> Protocol {
        match self {
            IpVersion::V4 => Protocol::ICMPV4,
            IpVersion::V6 => Protocol::ICMPV6,
        }
    }

    /// Version of a concrete address
    pub fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => write!(f, "IPv4"),
            IpVersion::V6 => write!(f, "IPv6"),
        }
    }
}

/// Socket mode (affects permissions required)
///
/// - **Raw**: full control, requires root/CAP_NET_RAW (or Administrator)
/// - **Dgram**: ICMP datagram sockets, unprivileged on macOS and on Linux
///   when `net.ipv4.ping_group_range` allows it. Linux does not deliver
///   time-exceeded errors to these sockets, so intermediate hops time out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketMode {
    /// Raw socket
    Raw,
    /// Datagram socket for ICMP
    Dgram,
}

impl SocketMode {
    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            SocketMode::Raw => "Raw",
            SocketMode::Dgram => "Datagram",
        }
    }
}

/// Combined socket configuration actually used for a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeMode {
    /// IP version (IPv4 or IPv6)
    pub ip_version: IpVersion,
    /// Socket mode that determines permissions required
    pub socket_mode: SocketMode,
}

impl ProbeMode {
    /// Get a human-readable description of this mode
    pub fn description(&self) -> String {
        let protocol = match self.ip_version {
            IpVersion::V4 => "ICMP",
            IpVersion::V6 => "ICMPv6",
        };
        format!(
            "{} {} {}",
            self.socket_mode.description(),
            protocol,
            self.ip_version
        )
    }
}

/// Protocol-level status of a reply to one echo request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    /// Echo reply from the probed address
    Success,
    /// Hop limit reached zero in transit
    TtlExpired,
    /// Fragment reassembly time exceeded
    ReassemblyTimeExpired,
    /// No route to the destination network
    NetUnreachable,
    /// Destination host (or address) unreachable
    HostUnreachable,
    /// Destination protocol unreachable
    ProtocolUnreachable,
    /// Destination port unreachable
    PortUnreachable,
    /// Packet too big for the next hop and fragmentation is not allowed
    FragmentationNeeded {
        /// Next-hop MTU reported by the router, if any
        mtu: Option<u32>,
    },
    /// Communication administratively prohibited
    AdministrativelyProhibited,
    /// Parameter problem in the request header
    ParameterProblem,
    /// Source quench
    SourceQuench,
    /// Any other ICMP message addressed to our probe
    Other {
        /// ICMP type
        icmp_type: u8,
        /// ICMP code
        code: u8,
    },
}

impl ReplyStatus {
    /// True when the probed address itself answered the echo request
    pub fn is_success(&self) -> bool {
        matches!(self, ReplyStatus::Success)
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyStatus::Success => write!(f, "Success."),
            ReplyStatus::TtlExpired => write!(f, "TTL expired in transit."),
            ReplyStatus::ReassemblyTimeExpired => write!(f, "TTL expired during reassembly."),
            ReplyStatus::NetUnreachable => write!(f, "Destination net unreachable."),
            ReplyStatus::HostUnreachable => write!(f, "Destination host unreachable."),
            ReplyStatus::ProtocolUnreachable => write!(f, "Destination protocol unreachable."),
            ReplyStatus::PortUnreachable => write!(f, "Destination port unreachable."),
            ReplyStatus::FragmentationNeeded { mtu: Some(mtu) } => {
                write!(f, "Packet needs to be fragmented but DF set (MTU {mtu}).")
            }
            ReplyStatus::FragmentationNeeded { mtu: None } => {
                write!(f, "Packet needs to be fragmented but DF set.")
            }
            ReplyStatus::AdministrativelyProhibited => {
                write!(f, "Communication administratively prohibited.")
            }
            ReplyStatus::ParameterProblem => write!(f, "Parameter problem."),
            ReplyStatus::SourceQuench => write!(f, "Source quench received."),
            ReplyStatus::Other { icmp_type, code } => {
                write!(f, "Unexpected ICMP reply (type {icmp_type}, code {code}).")
            }
        }
    }
}

/// Identity of the echo request a reply must belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoMatch {
    /// Echo identifier, `None` when the kernel owns it (Linux datagram sockets)
    pub identifier: Option<u16>,
    /// Echo sequence number
    pub sequence: u16,
}

impl EchoMatch {
    /// Check an identifier/sequence pair taken from a reply
    pub fn matches(&self, identifier: u16, sequence: u16) -> bool {
        sequence == self.sequence && self.identifier.is_none_or(|id| id == identifier)
    }
}

/// A reply recognized as belonging to our probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedReply {
    /// What the reply says about the probe
    pub status: ReplyStatus,
    /// Hop limit of the reply packet when the IP header was available
    pub reply_ttl: Option<u8>,
}

/// Address-family capability: everything that differs between ICMPv4 and ICMPv6
pub trait AddressFamily: Send + Sync + 'static {
    /// Concrete address type (`Ipv4Addr` or `Ipv6Addr`)
    type Addr: Copy
        + Eq
        + Hash
        + fmt::Debug
        + fmt::Display
        + Into<IpAddr>
        + Serialize
        + Send
        + Sync
        + 'static;

    /// IP version served by this family
    const VERSION: IpVersion;

    /// Narrow a generic address to this family
    fn from_ip(ip: IpAddr) -> Option<Self::Addr>;

    /// Socket address for sending to `addr`
    fn sock_addr(addr: Self::Addr) -> SockAddr {
        SockAddr::from(SocketAddr::new(addr.into(), 0))
    }

    /// Extract the responder address from a received socket address
    fn responder(addr: &SockAddr) -> Option<Self::Addr> {
        addr.as_socket().and_then(|s| Self::from_ip(s.ip()))
    }

    /// Apply hop limit, type of service and don't-fragment to a fresh socket
    fn configure(socket: &Socket, options: &ProbeOptions) -> Result<()>;

    /// Build an echo request message
    fn echo_request(identifier: u16, sequence: u16, payload: &[u8]) -> Option<Vec<u8>>;

    /// Recognize a received datagram as a reply to the expected request
    fn parse_reply(packet: &[u8], expected: &EchoMatch) -> Option<ParsedReply>;
}
