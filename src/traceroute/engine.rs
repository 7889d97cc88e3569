//! Core traceroute engine implementation

use crate::dns;
use crate::error::{Error, Result};
use crate::probe::{EchoProbe, IcmpEchoProbe, SingleHopProbe};
use crate::socket::AddressFamily;
use crate::traceroute::observer::TraceObserver;
use crate::traceroute::{HopSummary, TraceResult, TraceStatus, TracerouteConfig};
use std::marker::PhantomData;
use std::ops::ControlFlow;

/// Running statistics for the probes of one hop
///
/// Only the probes before the first failure contribute; once an error is
/// recorded the hop reports zeroed round-trip figures.
#[derive(Debug, Clone)]
pub struct HopAggregator<A> {
    responder: Option<A>,
    sum_ms: u64,
    min_ms: u32,
    max_ms: u32,
    successes: u32,
    error: Option<Error>,
}

impl<A> Default for HopAggregator<A> {
    fn default() -> Self {
        Self {
            responder: None,
            sum_ms: 0,
            min_ms: u32::MAX,
            max_ms: 0,
            successes: 0,
            error: None,
        }
    }
}

impl<A: Copy> HopAggregator<A> {
    /// Empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one answered probe
    pub fn record(&mut self, probe: &SingleHopProbe<A>) {
        if self.responder.is_none() {
            self.responder = Some(probe.responder);
        }
        self.sum_ms += u64::from(probe.rtt_ms);
        self.min_ms = self.min_ms.min(probe.rtt_ms);
        self.max_ms = self.max_ms.max(probe.rtt_ms);
        self.successes += 1;
    }

    /// Record a failed probe; the first error wins
    pub fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Number of answered probes so far
    pub fn successes(&self) -> u32 {
        self.successes
    }

    /// Produce the summary row for `hop`
    pub fn finish(self, hop: u8) -> HopSummary<A> {
        let (min_rtt_ms, avg_rtt_ms, max_rtt_ms) = if self.error.is_some() || self.successes == 0 {
            (0, 0, 0)
        } else {
            // Divides by the probes that answered, which is the configured
            // count whenever the hop has no error
            let avg = self.sum_ms / u64::from(self.successes);
            (self.min_ms, avg as u32, self.max_ms)
        };

        HopSummary {
            hop,
            error: self.error,
            responder: self.responder,
            min_rtt_ms,
            avg_rtt_ms,
            max_rtt_ms,
        }
    }
}

/// Multi-hop route discovery over an [`EchoProbe`]
///
/// Probes the destination with hop limits 1, 2, ... up to
/// [`TracerouteConfig::max_hops`], sending `probes_per_hop` requests per hop
/// and stopping once a hop is answered by the destination itself.
///
/// # Examples
///
/// ```no_run
/// use pingtrace::socket::Icmpv4;
/// use pingtrace::traceroute::{RouteTracer, TracerouteConfig};
///
/// let tracer = RouteTracer::<Icmpv4>::new(TracerouteConfig::default());
/// let result = tracer.trace("192.0.2.1", &mut ())?;
/// for hop in &result.hops {
///     println!("{:?}", hop);
/// }
/// # Ok::<(), pingtrace::Error>(())
/// ```
pub struct RouteTracer<F: AddressFamily, P = IcmpEchoProbe<F>> {
    config: TracerouteConfig,
    probe: P,
    _family: PhantomData<fn() -> F>,
}

impl<F: AddressFamily> RouteTracer<F> {
    /// Tracer using the system ICMP probe
    pub fn new(config: TracerouteConfig) -> Self {
        Self::with_probe(config, IcmpEchoProbe::new())
    }
}

impl<F: AddressFamily, P: EchoProbe<F>> RouteTracer<F, P> {
    /// Tracer using a caller-supplied probe
    pub fn with_probe(config: TracerouteConfig, probe: P) -> Self {
        Self {
            config,
            probe,
            _family: PhantomData,
        }
    }

    /// The configuration this tracer runs with
    pub fn config(&self) -> &TracerouteConfig {
        &self.config
    }

    /// The underlying probe
    pub fn prober(&self) -> &P {
        &self.probe
    }

    /// Trace the route to `host`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] or [`Error::AddressResolution`]
    /// before any probe is sent, [`Error::Cancelled`] when the observer
    /// breaks, and [`Error::InsufficientPermissions`] when probing is not
    /// possible. Use [`RouteTracer::trace_into`] to keep the hops gathered
    /// before such a stop.
    pub fn trace<O>(&self, host: &str, observer: &mut O) -> Result<TraceResult<F::Addr>>
    where
        O: TraceObserver<F::Addr> + ?Sized,
    {
        let mut result = TraceResult::new(host);
        self.trace_into(host, &mut result, observer)?;
        Ok(result)
    }

    /// Trace the route to `host`, filling a caller-owned result
    ///
    /// `result` is cleared first. On every return it holds the hops completed
    /// so far and a final [`TraceStatus`].
    pub fn trace_into<O>(
        &self,
        host: &str,
        result: &mut TraceResult<F::Addr>,
        observer: &mut O,
    ) -> Result<()>
    where
        O: TraceObserver<F::Addr> + ?Sized,
    {
        result.reset(host);

        let outcome = self.run(host, result, observer);
        result.status = match &outcome {
            Ok(status) => *status,
            Err(Error::Cancelled) => TraceStatus::Cancelled,
            Err(_) => TraceStatus::Failed,
        };

        match outcome {
            Ok(status) => {
                log::debug!(
                    "Trace to {host} finished: {status:?} after {} hops",
                    result.hops.len()
                );
                Ok(())
            }
            Err(e) => {
                log::debug!("Trace to {host} stopped: {e}");
                Err(e)
            }
        }
    }

    fn run<O>(
        &self,
        host: &str,
        result: &mut TraceResult<F::Addr>,
        observer: &mut O,
    ) -> Result<TraceStatus>
    where
        O: TraceObserver<F::Addr> + ?Sized,
    {
        self.config.validate()?;
        self.config.probe_options(1).validate::<F>()?;

        let destination = dns::resolve::<F>(host)?;
        result.destination = Some(destination);
        log::debug!(
            "Tracing route to {host} [{destination}] over a maximum of {} hops",
            self.config.max_hops
        );

        for ttl in 1..=self.config.max_hops {
            let summary = self.probe_hop(ttl, destination, observer)?;

            if observer.on_hop(&summary).is_break() {
                return Err(Error::Cancelled);
            }

            let reached = summary.is_destination(&destination);
            result.hops.push(summary);
            if reached {
                return Ok(TraceStatus::Completed);
            }
        }

        Ok(TraceStatus::Exhausted)
    }

    fn probe_hop<O>(
        &self,
        ttl: u8,
        destination: F::Addr,
        observer: &mut O,
    ) -> Result<HopSummary<F::Addr>>
    where
        O: TraceObserver<F::Addr> + ?Sized,
    {
        let options = self.config.probe_options(ttl);
        let mut hop = HopAggregator::new();

        for index in 1..=self.config.probes_per_hop {
            match self.probe.probe(destination, &options) {
                Ok(reply) => {
                    let single = reply.as_single_hop();
                    hop.record(&single);
                    if let ControlFlow::Break(()) = observer.on_probe(ttl, index, &single) {
                        return Err(Error::Cancelled);
                    }
                }
                Err(e) if e.is_probe_error() => {
                    log::debug!("Hop {ttl} probe {index}: {e}");
                    hop.fail(e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(hop.finish(ttl))
    }
}
