//! pingtrace - ICMP echo probing and route discovery
//!
//! This library provides a blocking ping and traceroute engine over the
//! operating system's raw or datagram ICMP sockets, for IPv4 and IPv6.
//!
//! - [`probe`] sends one echo request at a given hop limit and waits for the
//!   matching reply or ICMP error.
//! - [`traceroute`] probes a destination with increasing hop limits and
//!   aggregates per-hop round-trip statistics.
//! - [`ping`] repeats echo requests against one host and keeps reply
//!   statistics.
//! - [`report`] renders results as human-readable lines.
//!
//! # Examples
//!
//! ```no_run
//! use pingtrace::{Icmpv4, RouteTracer, TracerouteConfig};
//!
//! let config = TracerouteConfig::builder().max_hops(20).build()?;
//! let result = RouteTracer::<Icmpv4>::new(config).trace("example.com", &mut ())?;
//! for hop in &result.hops {
//!     println!("{}", pingtrace::report::trace_hop(hop, None));
//! }
//! # Ok::<(), pingtrace::Error>(())
//! ```

pub mod dns;
pub mod error;
pub mod ping;
pub mod probe;
pub mod report;
pub mod socket;
pub mod traceroute;

// Re-export core types for library users
pub use error::{Error, Result};
pub use ping::{PingConfig, PingObserver, PingStatistics, Pinger};
pub use probe::{EchoProbe, EchoProbeResult, IcmpEchoProbe, ProbeOptions, SingleHopProbe};
pub use socket::{AddressFamily, Icmpv4, Icmpv6, IpVersion, ProbeMode, ReplyStatus, SocketMode};
pub use traceroute::{
    HopSummary, RouteTracer, TraceObserver, TraceResult, TraceStatus, TracerouteConfig,
    TracerouteConfigBuilder,
};

#[cfg(feature = "async")]
pub use traceroute::{spawn_trace, TraceHandle};
