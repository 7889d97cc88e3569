//! Repeated echo requests against one host
//!
//! A [`Pinger`] sends `count` requests (or keeps going until stopped) at a
//! fixed hop limit and keeps reply statistics for the session.

use crate::dns;
use crate::error::{Error, Result};
use crate::probe::{EchoProbe, EchoProbeResult, IcmpEchoProbe, ProbeOptions, MAX_PAYLOAD_SIZE};
use crate::socket::{AddressFamily, SocketMode};
use crate::traceroute::CancelOnToken;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::net::IpAddr;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep while waiting between requests
const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Configuration for a ping session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingConfig {
    /// Hop limit for every request (default: 128)
    pub ttl: u8,
    /// Per-request timeout (default: 5000ms)
    pub timeout: Duration,
    /// Echo payload size in bytes (default: 32)
    pub payload_size: usize,
    /// IPv4 type of service
    pub tos: u8,
    /// Set don't-fragment on every request
    pub dont_fragment: bool,
    /// Number of requests to send (default: 4)
    pub count: u32,
    /// Ignore `count` and ping until stopped
    pub continuous: bool,
    /// Pause between requests (default: 1000ms)
    pub interval: Duration,
    /// Source address to bind
    pub local_address: Option<IpAddr>,
    /// Preferred socket mode
    pub socket_mode: Option<SocketMode>,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            ttl: 128,
            timeout: Duration::from_millis(5000),
            payload_size: 32,
            tos: 0,
            dont_fragment: false,
            count: 4,
            continuous: false,
            interval: Duration::from_millis(1000),
            local_address: None,
            socket_mode: None,
        }
    }
}

impl PingConfig {
    /// Create a new PingConfig builder
    pub fn builder() -> PingConfigBuilder {
        PingConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 && !self.continuous {
            return Err(Error::invalid("count must be at least 1"));
        }
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
        Ok(())
    }

    /// Options for each request of the session
    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            ttl: self.ttl,
            timeout: self.timeout,
            payload_size: self.payload_size,
            tos: self.tos,
            dont_fragment: self.dont_fragment,
            reverse_route: false,
            local_address: self.local_address,
            socket_mode: self.socket_mode,
        }
    }
}

/// Builder for PingConfig
#[derive(Default)]
pub struct PingConfigBuilder {
    config: PingConfig,
}

impl PingConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hop limit
    pub fn ttl(mut self, ttl: u8) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the echo payload size
    pub fn payload_size(mut self, size: usize) -> Self {
        self.config.payload_size = size;
        self
    }

    /// Set the IPv4 type of service
    pub fn tos(mut self, tos: u8) -> Self {
        self.config.tos = tos;
        self
    }

    /// Enable or disable don't-fragment
    pub fn dont_fragment(mut self, enable: bool) -> Self {
        self.config.dont_fragment = enable;
        self
    }

    /// Set the number of requests
    pub fn count(mut self, count: u32) -> Self {
        self.config.count = count;
        self
    }

    /// Ping until stopped
    pub fn continuous(mut self, enable: bool) -> Self {
        self.config.continuous = enable;
        self
    }

    /// Set the pause between requests
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Bind requests to a source address
    pub fn local_address(mut self, addr: IpAddr) -> Self {
        self.config.local_address = Some(addr);
        self
    }

    /// Set the preferred socket mode
    pub fn socket_mode(mut self, mode: SocketMode) -> Self {
        self.config.socket_mode = Some(mode);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<PingConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Receives each request's outcome; `Break` ends the session early
pub trait PingObserver<A> {
    /// Called once per request with its 1-based sequence in the session
    fn on_reply(&mut self, seq: u32, outcome: &Result<EchoProbeResult<A>>) -> ControlFlow<()>;

    /// Polled before each request and while pausing between requests;
    /// `false` ends the session without sending anything more
    fn should_continue(&self) -> bool {
        true
    }
}

impl<A> PingObserver<A> for () {
    fn on_reply(&mut self, _seq: u32, _outcome: &Result<EchoProbeResult<A>>) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

impl<A, O: PingObserver<A> + ?Sized> PingObserver<A> for &mut O {
    fn on_reply(&mut self, seq: u32, outcome: &Result<EchoProbeResult<A>>) -> ControlFlow<()> {
        (**self).on_reply(seq, outcome)
    }

    fn should_continue(&self) -> bool {
        (**self).should_continue()
    }
}

impl<A, O: PingObserver<A>> PingObserver<A> for CancelOnToken<O> {
    fn on_reply(&mut self, seq: u32, outcome: &Result<EchoProbeResult<A>>) -> ControlFlow<()> {
        if self.is_cancelled() {
            return ControlFlow::Break(());
        }
        self.inner_mut().on_reply(seq, outcome)
    }

    fn should_continue(&self) -> bool {
        !self.is_cancelled() && self.inner().should_continue()
    }
}

/// Ping observer from a closure
pub struct FnPingObserver<C>(pub C);

impl<A, C> PingObserver<A> for FnPingObserver<C>
where
    C: FnMut(u32, &Result<EchoProbeResult<A>>) -> ControlFlow<()>,
{
    fn on_reply(&mut self, seq: u32, outcome: &Result<EchoProbeResult<A>>) -> ControlFlow<()> {
        (self.0)(seq, outcome)
    }
}

/// Reply statistics for a ping session
///
/// Only echo replies count as received. Timeouts, local failures and ICMP
/// errors such as "destination unreachable" count as lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingStatistics<A> {
    /// Host as given by the caller
    pub target: String,
    /// Resolved address
    pub destination: A,
    /// Requests sent
    pub sent: u32,
    /// Echo replies received
    pub received: u32,
    /// Requests without an echo reply
    pub lost: u32,
    /// Fastest reply
    pub min_rtt_ms: Option<u32>,
    /// Slowest reply
    pub max_rtt_ms: Option<u32>,
    /// Mean over received replies
    pub avg_rtt_ms: Option<u32>,
    #[serde(skip)]
    rtt_sum_ms: u64,
}

impl<A> PingStatistics<A> {
    /// Empty statistics for `target`
    pub fn new(target: &str, destination: A) -> Self {
        Self {
            target: target.to_string(),
            destination,
            sent: 0,
            received: 0,
            lost: 0,
            min_rtt_ms: None,
            max_rtt_ms: None,
            avg_rtt_ms: None,
            rtt_sum_ms: 0,
        }
    }

    /// Count one request and its outcome
    pub fn record(&mut self, outcome: &Result<EchoProbeResult<A>>) {
        self.sent += 1;
        let reply = match outcome {
            Ok(reply) if reply.status.is_success() => reply,
            _ => {
                self.lost += 1;
                return;
            }
        };

        self.received += 1;
        self.rtt_sum_ms += u64::from(reply.rtt_ms);
        self.min_rtt_ms = Some(self.min_rtt_ms.map_or(reply.rtt_ms, |m| m.min(reply.rtt_ms)));
        self.max_rtt_ms = Some(self.max_rtt_ms.map_or(reply.rtt_ms, |m| m.max(reply.rtt_ms)));
        self.avg_rtt_ms = Some((self.rtt_sum_ms / u64::from(self.received)) as u32);
    }

    /// Percentage of requests lost, 0 when nothing was sent
    pub fn loss_percent(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            f64::from(self.lost) * 100.0 / f64::from(self.sent)
        }
    }
}

/// Ping session driver
pub struct Pinger<F: AddressFamily, P = IcmpEchoProbe<F>> {
    config: PingConfig,
    probe: P,
    _family: PhantomData<fn() -> F>,
}

impl<F: AddressFamily> Pinger<F> {
    /// Pinger using the system ICMP probe
    pub fn new(config: PingConfig) -> Self {
        Self::with_probe(config, IcmpEchoProbe::new())
    }
}

impl<F: AddressFamily, P: EchoProbe<F>> Pinger<F, P> {
    /// Pinger using a caller-supplied probe
    pub fn with_probe(config: PingConfig, probe: P) -> Self {
        Self {
            config,
            probe,
            _family: PhantomData,
        }
    }

    /// The configuration this pinger runs with
    pub fn config(&self) -> &PingConfig {
        &self.config
    }

    /// Ping `host` until the configured count is reached or `observer` stops
    ///
    /// Per-request failures are reported to the observer and counted as
    /// lost. Stopping through the observer is not an error: the statistics
    /// gathered so far are returned. [`PingObserver::should_continue`] is
    /// polled during the pause between requests, so a stop request is seen
    /// within 50ms unless a request is in flight.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] and [`Error::AddressResolution`] before
    /// any request is sent; [`Error::InsufficientPermissions`] or any other
    /// unrecoverable probe error ends the session.
    pub fn run<O>(&self, host: &str, observer: &mut O) -> Result<PingStatistics<F::Addr>>
    where
        O: PingObserver<F::Addr> + ?Sized,
    {
        self.config.validate()?;
        let options = self.config.probe_options();
        options.validate::<F>()?;

        let destination = dns::resolve::<F>(host)?;
        let mut stats = PingStatistics::new(host, destination);
        log::debug!(
            "Pinging {host} [{destination}] with {} bytes of data",
            self.config.payload_size
        );

        let mut seq: u32 = 0;
        while self.config.continuous || seq < self.config.count {
            let pause = if seq == 0 { Duration::ZERO } else { self.config.interval };
            if !wait_between_requests::<F::Addr, O>(pause, observer) {
                log::debug!("Ping session to {host} stopped after {seq} requests");
                break;
            }
            seq = seq.wrapping_add(1);

            let outcome = self.probe.probe(destination, &options);
            if let Err(e) = &outcome {
                if !e.is_probe_error() {
                    return Err(e.clone());
                }
                log::debug!("Request {seq} to {destination}: {e}");
            }

            stats.record(&outcome);
            if observer.on_reply(seq, &outcome).is_break() {
                log::debug!("Ping session to {host} stopped after {seq} requests");
                break;
            }
        }

        Ok(stats)
    }
}

/// Sleep for `pause` in short slices; `false` as soon as `observer` stops
fn wait_between_requests<A, O>(pause: Duration, observer: &O) -> bool
where
    O: PingObserver<A> + ?Sized,
{
    let deadline = Instant::now() + pause;
    loop {
        if !observer.should_continue() {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(PAUSE_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::{Icmpv4, ReplyStatus};
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicU32, Ordering};

    const TARGET: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 20);

    struct SeqProbe<S> {
        script: S,
        calls: AtomicU32,
    }

    impl<S> SeqProbe<S> {
        fn new(script: S) -> Self {
            Self {
                script,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl<S> EchoProbe<Icmpv4> for SeqProbe<S>
    where
        S: Fn(u32, &ProbeOptions) -> Result<EchoProbeResult<Ipv4Addr>> + Send + Sync,
    {
        fn probe(&self, target: Ipv4Addr, options: &ProbeOptions) -> Result<EchoProbeResult<Ipv4Addr>> {
            assert_eq!(target, TARGET);
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.script)(n, options)
        }
    }

    fn echo(rtt_ms: u32, status: ReplyStatus) -> Result<EchoProbeResult<Ipv4Addr>> {
        Ok(EchoProbeResult {
            responder: TARGET,
            rtt_ms,
            status,
            ttl: 128,
            reply_ttl: Some(57),
            payload_size: 32,
            raw_reply: Vec::new(),
        })
    }

    fn quick() -> PingConfig {
        PingConfig {
            interval: Duration::ZERO,
            ..PingConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = PingConfig::default();
        assert_eq!(config.ttl, 128);
        assert_eq!(config.count, 4);
        assert_eq!(config.timeout, Duration::from_millis(5000));
        assert_eq!(config.interval, Duration::from_millis(1000));
        assert!(!config.continuous);
    }

    #[test]
    fn test_config_validation() {
        assert!(matches!(
            PingConfig::builder().count(0).build(),
            Err(Error::InvalidParameter(_))
        ));
        assert!(PingConfig::builder().count(0).continuous(true).build().is_ok());
        assert!(PingConfig::builder().ttl(0).build().is_err());
        assert!(PingConfig::builder().timeout(Duration::ZERO).build().is_err());
        assert!(PingConfig::builder()
            .payload_size(MAX_PAYLOAD_SIZE + 1)
            .build()
            .is_err());
    }

    #[test]
    fn test_counted_session() {
        let probe = SeqProbe::new(|n, options: &ProbeOptions| {
            assert_eq!(options.ttl, 128);
            echo([4, 0, 9, 3][n as usize], ReplyStatus::Success)
        });
        let mut seen = Vec::new();
        let mut observer = FnPingObserver(|seq: u32, outcome: &Result<EchoProbeResult<Ipv4Addr>>| {
            seen.push((seq, outcome.is_ok()));
            ControlFlow::Continue(())
        });

        let stats = Pinger::<Icmpv4, _>::with_probe(quick(), &probe)
            .run("192.0.2.20", &mut observer)
            .unwrap();

        assert_eq!(stats.sent, 4);
        assert_eq!(stats.received, 4);
        assert_eq!(stats.lost, 0);
        assert_eq!(stats.min_rtt_ms, Some(0));
        assert_eq!(stats.max_rtt_ms, Some(9));
        assert_eq!(stats.avg_rtt_ms, Some(4));
        assert_eq!(seen, vec![(1, true), (2, true), (3, true), (4, true)]);
    }

    #[test]
    fn test_losses_are_counted() {
        let probe = SeqProbe::new(|n, _: &ProbeOptions| match n {
            0 => Err(Error::ProbeTimeout(Duration::from_secs(5))),
            1 => echo(2, ReplyStatus::HostUnreachable),
            _ => echo(6, ReplyStatus::Success),
        });
        let stats = Pinger::<Icmpv4, _>::with_probe(quick(), &probe)
            .run("192.0.2.20", &mut ())
            .unwrap();

        assert_eq!(stats.sent, 4);
        assert_eq!(stats.received, 2);
        assert_eq!(stats.lost, 2);
        assert!((stats.loss_percent() - 50.0).abs() < f64::EPSILON);
        assert_eq!(stats.min_rtt_ms, Some(6));
    }

    #[test]
    fn test_continuous_until_stopped() {
        let probe = SeqProbe::new(|_, _: &ProbeOptions| echo(1, ReplyStatus::Success));
        let config = PingConfig {
            continuous: true,
            count: 0,
            ..quick()
        };
        let mut observer = FnPingObserver(|seq: u32, _: &Result<EchoProbeResult<Ipv4Addr>>| {
            if seq == 10 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        let stats = Pinger::<Icmpv4, _>::with_probe(config, &probe)
            .run("192.0.2.20", &mut observer)
            .unwrap();

        assert_eq!(stats.sent, 10);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_cancelled_token_sends_nothing() {
        let probe = SeqProbe::new(|_, _: &ProbeOptions| echo(1, ReplyStatus::Success));
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let mut observer = CancelOnToken::new(token, ());
        let config = PingConfig {
            continuous: true,
            ..quick()
        };
        let stats = Pinger::<Icmpv4, _>::with_probe(config, &probe)
            .run("192.0.2.20", &mut observer)
            .unwrap();
        assert_eq!(stats.sent, 0);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_during_interval_stops_promptly() {
        let token = tokio_util::sync::CancellationToken::new();
        let canceller = token.clone();
        // Ctrl-C arrives while the first reply is being handled
        let probe = SeqProbe::new(move |_, _: &ProbeOptions| {
            canceller.cancel();
            echo(1, ReplyStatus::Success)
        });
        let config = PingConfig {
            continuous: true,
            interval: Duration::from_secs(30),
            ..PingConfig::default()
        };
        let mut seen = 0;
        let mut observer = CancelOnToken::new(
            token,
            FnPingObserver(|_: u32, _: &Result<EchoProbeResult<Ipv4Addr>>| {
                seen += 1;
                ControlFlow::Continue(())
            }),
        );

        let started = Instant::now();
        let stats = Pinger::<Icmpv4, _>::with_probe(config, &probe)
            .run("192.0.2.20", &mut observer)
            .unwrap();
        drop(observer);

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(stats.sent, 1);
        // The token is checked before the wrapped observer
        assert_eq!(seen, 0);
    }

    #[test]
    fn test_pause_polls_observer() {
        struct StopAfter(std::cell::Cell<u32>);
        impl PingObserver<Ipv4Addr> for StopAfter {
            fn on_reply(&mut self, _: u32, _: &Result<EchoProbeResult<Ipv4Addr>>) -> ControlFlow<()> {
                ControlFlow::Continue(())
            }
            fn should_continue(&self) -> bool {
                let polls = self.0.get() + 1;
                self.0.set(polls);
                polls < 3
            }
        }

        let observer = StopAfter(std::cell::Cell::new(0));
        let started = Instant::now();
        assert!(!wait_between_requests::<Ipv4Addr, _>(Duration::from_secs(30), &observer));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(observer.0.get(), 3);

        assert!(wait_between_requests::<Ipv4Addr, _>(Duration::ZERO, &()));
    }

    #[test]
    fn test_permission_error_ends_session() {
        let probe = SeqProbe::new(|_, _: &ProbeOptions| {
            Err(Error::InsufficientPermissions {
                required: "root".into(),
                suggestion: "sudo".into(),
            })
        });
        let err = Pinger::<Icmpv4, _>::with_probe(quick(), &probe)
            .run("192.0.2.20", &mut ())
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientPermissions { .. }));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_config_sends_nothing() {
        let probe = SeqProbe::new(|_, _: &ProbeOptions| echo(1, ReplyStatus::Success));
        let config = PingConfig {
            count: 0,
            ..quick()
        };
        let err = Pinger::<Icmpv4, _>::with_probe(config, &probe)
            .run("192.0.2.20", &mut ())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_statistics_serialize() {
        let mut stats = PingStatistics::new("host", TARGET);
        stats.record(&echo(3, ReplyStatus::Success));
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["destination"], "192.0.2.20");
        assert_eq!(json["received"], 1);
        assert!(json.get("rtt_sum_ms").is_none());
    }
}
