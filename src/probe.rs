//! Single ICMP echo probe
//!
//! [`EchoProbe`] is the seam between the route tracer / pinger and the
//! network: one call sends one echo request at a given hop limit and blocks
//! until a matching reply, a matching ICMP error, or the timeout.

use crate::dns;
use crate::error::{Error, Result};
use crate::socket::factory::{self, ProbeSocket};
use crate::socket::{
    utils, AddressFamily, EchoMatch, IpVersion, ParsedReply, ProbeMode, ReplyStatus, SocketMode,
};
use serde::{Deserialize, Serialize};
use socket2::SockAddr;
use std::io;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

/// Largest accepted echo payload in bytes
pub const MAX_PAYLOAD_SIZE: usize = 65500;

/// Filler cycled through the echo payload
const PAYLOAD_FILLER: &[u8] = b"abcdefghijklmnopqrstuvw";

/// Receive buffer size; large enough for a maximal echo reply
const RECV_BUFFER_SIZE: usize = 65536;

/// Shortest read timeout handed to the socket
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Process-wide echo sequence counter
static NEXT_SEQUENCE: AtomicU16 = AtomicU16::new(1);

/// Options for one echo request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOptions {
    /// Hop limit the request is sent with
    pub ttl: u8,
    /// How long to wait for a reply
    pub timeout: Duration,
    /// Number of data bytes after the ICMP header
    pub payload_size: usize,
    /// IPv4 type of service byte; ignored for IPv6
    pub tos: u8,
    /// Forbid fragmentation along the path
    pub dont_fragment: bool,
    /// Ask for the reverse route to be recorded
    ///
    /// ICMP sockets offer no portable way to request this, so it is carried
    /// for reporting and otherwise ignored.
    pub reverse_route: bool,
    /// Source address to bind; must belong to the probing family
    pub local_address: Option<IpAddr>,
    /// Force a socket mode instead of trying raw then datagram
    pub socket_mode: Option<SocketMode>,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            ttl: 128,
            timeout: Duration::from_millis(5000),
            payload_size: 32,
            tos: 0,
            dont_fragment: false,
            reverse_route: false,
            local_address: None,
            socket_mode: None,
        }
    }
}

impl ProbeOptions {
    /// Check the options against family `F` without touching the network
    pub fn validate<F: AddressFamily>(&self) -> Result<()> {
        if self.ttl == 0 {
            return Err(Error::invalid("ttl must be at least 1"));
        }
        if self.timeout.is_zero() {
            return Err(Error::invalid("timeout must be greater than 0"));
        }
        if self.payload_size > MAX_PAYLOAD_SIZE {
            return Err(Error::invalid(format!(
                "payload size {} exceeds the maximum of {MAX_PAYLOAD_SIZE} bytes",
                self.payload_size
            )));
        }
        if let Some(local) = self.local_address {
            if IpVersion::of(local) != F::VERSION {
                return Err(Error::invalid(format!(
                    "local address {local} is not an {} address",
                    F::VERSION
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of one echo probe that received a matching reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EchoProbeResult<A> {
    /// Address that sent the reply (router or destination)
    pub responder: A,
    /// Round-trip time in milliseconds; 0 means under one millisecond
    pub rtt_ms: u32,
    /// What the reply says about the probe
    pub status: ReplyStatus,
    /// Hop limit the request was sent with
    pub ttl: u8,
    /// Hop limit of the reply packet, when the socket exposes it
    pub reply_ttl: Option<u8>,
    /// Number of data bytes sent
    pub payload_size: usize,
    /// Bytes returned by the socket
    #[serde(skip)]
    pub raw_reply: Vec<u8>,
}

impl<A: Copy> EchoProbeResult<A> {
    /// The responder/RTT pair reported to trace observers
    pub fn as_single_hop(&self) -> SingleHopProbe<A> {
        SingleHopProbe {
            responder: self.responder,
            rtt_ms: self.rtt_ms,
        }
    }
}

/// One successful attempt inside one hop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SingleHopProbe<A> {
    /// Address that answered this attempt
    pub responder: A,
    /// Round-trip time in milliseconds
    pub rtt_ms: u32,
}

/// Sends one echo request and waits for its answer
///
/// Implementations block the calling thread for at most `options.timeout`
/// after sending.
///
/// # Errors
///
/// - [`Error::InvalidParameter`] for options that fail validation
/// - [`Error::InsufficientPermissions`] when no ICMP socket can be opened
/// - [`Error::ProbeTimeout`] when no matching reply arrives in time
/// - [`Error::FragmentationNeeded`] when the request cannot leave the host unfragmented
/// - [`Error::ProbeFailed`] for other transport failures
pub trait EchoProbe<F: AddressFamily>: Send + Sync {
    /// Probe `target` once
    fn probe(&self, target: F::Addr, options: &ProbeOptions) -> Result<EchoProbeResult<F::Addr>>;
}

impl<F: AddressFamily, P: EchoProbe<F> + ?Sized> EchoProbe<F> for &P {
    fn probe(&self, target: F::Addr, options: &ProbeOptions) -> Result<EchoProbeResult<F::Addr>> {
        (**self).probe(target, options)
    }
}

impl<F: AddressFamily, P: EchoProbe<F> + ?Sized> EchoProbe<F> for std::sync::Arc<P> {
    fn probe(&self, target: F::Addr, options: &ProbeOptions) -> Result<EchoProbeResult<F::Addr>> {
        (**self).probe(target, options)
    }
}

/// Echo probe over the operating system's ICMP sockets
///
/// Every call opens its own socket and closes it before returning.
pub struct IcmpEchoProbe<F> {
    _family: PhantomData<fn() -> F>,
}

impl<F> IcmpEchoProbe<F> {
    /// Create a probe for family `F`
    pub fn new() -> Self {
        Self {
            _family: PhantomData,
        }
    }
}

impl<F> Default for IcmpEchoProbe<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> Clone for IcmpEchoProbe<F> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<F> std::fmt::Debug for IcmpEchoProbe<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcmpEchoProbe").finish()
    }
}

impl<F: AddressFamily> EchoProbe<F> for IcmpEchoProbe<F> {
    fn probe(&self, target: F::Addr, options: &ProbeOptions) -> Result<EchoProbeResult<F::Addr>> {
        options.validate::<F>()?;
        if options.reverse_route {
            log::debug!("Reverse route recording is not available on ICMP sockets; ignored");
        }

        let ProbeSocket { socket, mode } = factory::open_probe_socket::<F>(options)?;

        let identifier = rand::random::<u16>();
        let sequence = next_sequence();
        let expected = EchoMatch {
            identifier: (!kernel_owns_identifier(mode)).then_some(identifier),
            sequence,
        };

        let payload = fill_payload(options.payload_size);
        let request = F::echo_request(identifier, sequence, &payload)
            .ok_or_else(|| Error::ProbeFailed("Failed to create ICMP packet".to_string()))?;

        log::debug!(
            "Echo request to {target} ttl={} id={identifier:#06x} seq={sequence} size={}",
            options.ttl,
            payload.len()
        );

        let sent_at = Instant::now();
        if let Err(e) = socket.send_to(&request, &F::sock_addr(target)) {
            return Err(send_error(&e, options));
        }

        let deadline = sent_at + options.timeout;
        let received = receive_reply::<F, _>(&expected, deadline, |buf, timeout| {
            socket.set_read_timeout(Some(timeout))?;
            socket.recv_from(buf)
        })?;
        let Some((responder, parsed, raw_reply)) = received else {
            log::debug!("No reply from {target} for seq={sequence}");
            return Err(Error::ProbeTimeout(options.timeout));
        };

        let rtt_ms = u32::try_from(sent_at.elapsed().as_millis()).unwrap_or(u32::MAX);
        log::debug!(
            "Reply from {responder} seq={sequence}: {} in {rtt_ms}ms",
            parsed.status
        );
        Ok(EchoProbeResult {
            responder,
            rtt_ms,
            status: parsed.status,
            ttl: options.ttl,
            reply_ttl: parsed.reply_ttl,
            payload_size: options.payload_size,
            raw_reply,
        })
    }
}

/// Read from `recv` until a packet matches `expected`; `None` once `deadline` passes
///
/// `recv` is handed the read timeout for each attempt. Packets from other
/// families or for other probes are skipped.
fn receive_reply<F, R>(
    expected: &EchoMatch,
    deadline: Instant,
    mut recv: R,
) -> Result<Option<(F::Addr, ParsedReply, Vec<u8>)>>
where
    F: AddressFamily,
    R: FnMut(&mut [MaybeUninit<u8>], Duration) -> io::Result<(usize, SockAddr)>,
{
    let mut recv_buf = vec![MaybeUninit::<u8>::uninit(); RECV_BUFFER_SIZE];

    loop {
        let Some(timeout) = read_timeout(deadline, Instant::now()) else {
            return Ok(None);
        };

        match recv(&mut recv_buf, timeout) {
            Ok((size, socket_addr)) => {
                let Some(responder) = F::responder(&socket_addr) else {
                    continue;
                };

                let initialized_part: &[MaybeUninit<u8>] = &recv_buf[..size];
                // SAFETY: recv_from initialized the first `size` bytes
                let packet_data: &[u8] =
                    unsafe { &*(initialized_part as *const [MaybeUninit<u8>] as *const [u8]) };

                match F::parse_reply(packet_data, expected) {
                    Some(parsed) => return Ok(Some((responder, parsed, packet_data.to_vec()))),
                    None => log::trace!("Ignoring {size} byte packet from {responder}"),
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => {
                return Err(Error::ProbeFailed(format!(
                    "Failed to receive ICMP reply: {e}"
                )))
            }
        }
    }
}

/// Read timeout for the next receive, `None` when the deadline is too close
///
/// The socket layer truncates to whole microseconds and a zero timeout
/// means "block forever", so anything under [`MIN_READ_TIMEOUT`] counts as
/// expired.
fn read_timeout(deadline: Instant, now: Instant) -> Option<Duration> {
    let remaining = deadline.saturating_duration_since(now);
    (remaining >= MIN_READ_TIMEOUT).then_some(remaining)
}

/// Resolve `host` and probe it once with the system ICMP implementation
///
/// # Examples
///
/// ```no_run
/// use pingtrace::probe::{probe, ProbeOptions};
/// use pingtrace::socket::Icmpv4;
///
/// let reply = probe::<Icmpv4>("192.0.2.1", &ProbeOptions::default())?;
/// println!("{} answered in {}ms: {}", reply.responder, reply.rtt_ms, reply.status);
/// # Ok::<(), pingtrace::Error>(())
/// ```
pub fn probe<F: AddressFamily>(
    host: &str,
    options: &ProbeOptions,
) -> Result<EchoProbeResult<F::Addr>> {
    let target = dns::resolve::<F>(host)?;
    IcmpEchoProbe::<F>::new().probe(target, options)
}

/// Next process-wide echo sequence number
pub fn next_sequence() -> u16 {
    NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// Echo payload of `size` bytes cycling through the filler alphabet
pub fn fill_payload(size: usize) -> Vec<u8> {
    PAYLOAD_FILLER.iter().copied().cycle().take(size).collect()
}

/// Linux datagram ICMP sockets rewrite the identifier to the socket's port
fn kernel_owns_identifier(mode: ProbeMode) -> bool {
    cfg!(any(target_os = "linux", target_os = "android")) && mode.socket_mode == SocketMode::Dgram
}

fn send_error(err: &io::Error, options: &ProbeOptions) -> Error {
    if options.dont_fragment && utils::is_message_too_long(err) {
        Error::FragmentationNeeded { mtu: None }
    } else {
        Error::ProbeFailed(format!("Failed to send ICMP packet: {err}"))
    }
}
