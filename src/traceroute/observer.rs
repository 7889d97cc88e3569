//! Progress reporting and cancellation for a running trace

use crate::probe::SingleHopProbe;
use crate::traceroute::types::HopSummary;
use serde::Serialize;
use std::ops::ControlFlow;
use tokio_util::sync::CancellationToken;

/// Receives trace progress; returning `ControlFlow::Break(())` cancels the trace
///
/// Both methods default to continuing, so implementors only override what
/// they need. The hop being probed when a `Break` is returned is discarded.
pub trait TraceObserver<A> {
    /// Called after each successful probe inside a hop (`index` is 1-based)
    fn on_probe(&mut self, hop: u8, index: u8, probe: &SingleHopProbe<A>) -> ControlFlow<()> {
        let _ = (hop, index, probe);
        ControlFlow::Continue(())
    }

    /// Called once per hop, before the summary is appended to the result
    fn on_hop(&mut self, summary: &HopSummary<A>) -> ControlFlow<()> {
        let _ = summary;
        ControlFlow::Continue(())
    }
}

/// The silent observer
impl<A> TraceObserver<A> for () {}

impl<A, O: TraceObserver<A> + ?Sized> TraceObserver<A> for &mut O {
    fn on_probe(&mut self, hop: u8, index: u8, probe: &SingleHopProbe<A>) -> ControlFlow<()> {
        (**self).on_probe(hop, index, probe)
    }

    fn on_hop(&mut self, summary: &HopSummary<A>) -> ControlFlow<()> {
        (**self).on_hop(summary)
    }
}

/// Observer built from a pair of closures
///
/// # Examples
///
/// ```
/// use pingtrace::probe::SingleHopProbe;
/// use pingtrace::traceroute::observer::{FnObserver, TraceObserver};
/// use pingtrace::traceroute::HopSummary;
/// use std::net::Ipv4Addr;
/// use std::ops::ControlFlow;
///
/// let mut seen = Vec::new();
/// let mut observer = FnObserver::new(
///     |_hop: u8, _index: u8, _probe: &SingleHopProbe<Ipv4Addr>| ControlFlow::Continue(()),
///     |summary: &HopSummary<Ipv4Addr>| {
///         seen.push(summary.hop);
///         ControlFlow::Continue(())
///     },
/// );
///
/// let hop = HopSummary {
///     hop: 1,
///     error: None,
///     responder: Some(Ipv4Addr::new(10, 0, 0, 1)),
///     min_rtt_ms: 1,
///     avg_rtt_ms: 1,
///     max_rtt_ms: 1,
/// };
/// assert!(observer.on_hop(&hop).is_continue());
/// drop(observer);
/// assert_eq!(seen, vec![1]);
/// ```
pub struct FnObserver<P, H> {
    on_probe: P,
    on_hop: H,
}

impl<P, H> FnObserver<P, H> {
    /// Wrap a per-probe and a per-hop callback
    pub fn new(on_probe: P, on_hop: H) -> Self {
        Self { on_probe, on_hop }
    }
}

impl<A, P, H> TraceObserver<A> for FnObserver<P, H>
where
    P: FnMut(u8, u8, &SingleHopProbe<A>) -> ControlFlow<()>,
    H: FnMut(&HopSummary<A>) -> ControlFlow<()>,
{
    fn on_probe(&mut self, hop: u8, index: u8, probe: &SingleHopProbe<A>) -> ControlFlow<()> {
        (self.on_probe)(hop, index, probe)
    }

    fn on_hop(&mut self, summary: &HopSummary<A>) -> ControlFlow<()> {
        (self.on_hop)(summary)
    }
}

/// Observer wrapper that breaks once a cancellation token fires
///
/// The token is checked before forwarding each callback, so cancellation
/// takes effect at the next probe or hop boundary.
pub struct CancelOnToken<O> {
    token: CancellationToken,
    inner: O,
}

impl<O> CancelOnToken<O> {
    /// Wrap `inner`, cancelling when `token` is cancelled
    pub fn new(token: CancellationToken, inner: O) -> Self {
        Self { token, inner }
    }

    /// Unwrap the inner observer
    pub fn into_inner(self) -> O {
        self.inner
    }

    /// The wrapped observer
    pub fn inner(&self) -> &O {
        &self.inner
    }

    /// The wrapped observer, mutably
    pub fn inner_mut(&mut self) -> &mut O {
        &mut self.inner
    }

    /// True once the token has fired
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl<A, O: TraceObserver<A>> TraceObserver<A> for CancelOnToken<O> {
    fn on_probe(&mut self, hop: u8, index: u8, probe: &SingleHopProbe<A>) -> ControlFlow<()> {
        if self.token.is_cancelled() {
            return ControlFlow::Break(());
        }
        self.inner.on_probe(hop, index, probe)
    }

    fn on_hop(&mut self, summary: &HopSummary<A>) -> ControlFlow<()> {
        if self.token.is_cancelled() {
            return ControlFlow::Break(());
        }
        self.inner.on_hop(summary)
    }
}

/// Trace progress as a single tagged value, for channels and logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent<A> {
    /// One probe inside a hop was answered
    Probe {
        /// Hop limit
        hop: u8,
        /// 1-based probe index inside the hop
        index: u8,
        /// Responder and round trip
        probe: SingleHopProbe<A>,
    },
    /// A hop finished
    Hop(HopSummary<A>),
}
