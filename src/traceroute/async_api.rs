//! Async facade over the blocking engine
//!
//! Traces and probes run on Tokio's blocking pool. A [`TraceHandle`] carries
//! the cancellation token for its trace, so a UI or server can stop a trace
//! from another task and still collect the hops discovered so far.

use crate::error::{Error, Result};
use crate::probe::{self, EchoProbe, EchoProbeResult, IcmpEchoProbe, ProbeOptions, SingleHopProbe};
use crate::socket::AddressFamily;
use crate::traceroute::{
    CancelOnToken, HopSummary, RouteTracer, TraceEvent, TraceObserver, TraceResult, TraceStatus,
    TracerouteConfig,
};
use std::ops::ControlFlow;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// A trace running on the blocking pool
pub struct TraceHandle<A> {
    target: String,
    cancel: CancellationToken,
    task: JoinHandle<(TraceResult<A>, Result<()>)>,
}

impl<A> TraceHandle<A> {
    /// Ask the trace to stop at the next probe or hop boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this trace
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// True once the blocking task has returned
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the trace and return its result
    ///
    /// # Errors
    ///
    /// Same as [`RouteTracer::trace`], plus [`Error::TaskFailed`] if the
    /// blocking task panicked.
    pub async fn join(self) -> Result<TraceResult<A>> {
        let (result, outcome) = self.join_with_partial().await;
        outcome.map(|()| result)
    }

    /// Wait for the trace, keeping the partial result on error
    pub async fn join_with_partial(self) -> (TraceResult<A>, Result<()>) {
        match self.task.await {
            Ok(done) => done,
            Err(e) => {
                let mut result = TraceResult::new(&self.target);
                result.status = TraceStatus::Failed;
                (result, Err(task_failed(&e)))
            }
        }
    }
}

/// Start a trace to `host` with the system ICMP probe
///
/// Must be called from within a Tokio runtime.
///
/// # Examples
///
/// ```no_run
/// use pingtrace::socket::Icmpv4;
/// use pingtrace::traceroute::{spawn_trace, TracerouteConfig};
///
/// # async fn example() -> pingtrace::Result<()> {
/// let handle = spawn_trace::<Icmpv4>("example.com", TracerouteConfig::default());
/// let result = handle.join().await?;
/// println!("{} hops", result.hop_count());
/// # Ok(())
/// # }
/// ```
pub fn spawn_trace<F: AddressFamily>(
    host: impl Into<String>,
    config: TracerouteConfig,
) -> TraceHandle<F::Addr> {
    spawn_trace_with_probe::<F, _>(host, config, IcmpEchoProbe::<F>::new())
}

/// Start a trace to `host` with a caller-supplied probe
pub fn spawn_trace_with_probe<F, P>(
    host: impl Into<String>,
    config: TracerouteConfig,
    probe: P,
) -> TraceHandle<F::Addr>
where
    F: AddressFamily,
    P: EchoProbe<F> + 'static,
{
    spawn_observed::<F, P, ()>(host.into(), config, probe, ())
}

/// Start a trace to `host` and stream its progress
///
/// Events stop when the trace ends; a dropped receiver does not stop the
/// trace.
pub fn spawn_trace_with_events<F: AddressFamily>(
    host: impl Into<String>,
    config: TracerouteConfig,
) -> (TraceHandle<F::Addr>, mpsc::UnboundedReceiver<TraceEvent<F::Addr>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = spawn_observed::<F, _, _>(
        host.into(),
        config,
        IcmpEchoProbe::<F>::new(),
        EventSender { tx },
    );
    (handle, rx)
}

/// Probe `host` once on the blocking pool
pub async fn ping_async<F: AddressFamily>(
    host: impl Into<String>,
    options: ProbeOptions,
) -> Result<EchoProbeResult<F::Addr>> {
    let host = host.into();
    tokio::task::spawn_blocking(move || probe::probe::<F>(&host, &options))
        .await
        .map_err(|e| task_failed(&e))?
}

fn spawn_observed<F, P, O>(
    host: String,
    config: TracerouteConfig,
    probe: P,
    observer: O,
) -> TraceHandle<F::Addr>
where
    F: AddressFamily,
    P: EchoProbe<F> + 'static,
    O: TraceObserver<F::Addr> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let mut observer = CancelOnToken::new(cancel.clone(), observer);
    let target = host.clone();

    let task = tokio::task::spawn_blocking(move || {
        let tracer = RouteTracer::<F, P>::with_probe(config, probe);
        let mut result = TraceResult::new(&host);
        let outcome = tracer.trace_into(&host, &mut result, &mut observer);
        (result, outcome)
    });

    TraceHandle {
        target,
        cancel,
        task,
    }
}

fn task_failed(err: &JoinError) -> Error {
    Error::TaskFailed(err.to_string())
}

struct EventSender<A> {
    tx: mpsc::UnboundedSender<TraceEvent<A>>,
}

impl<A: Copy> TraceObserver<A> for EventSender<A> {
    fn on_probe(&mut self, hop: u8, index: u8, probe: &SingleHopProbe<A>) -> ControlFlow<()> {
        let _ = self.tx.send(TraceEvent::Probe {
            hop,
            index,
            probe: *probe,
        });
        ControlFlow::Continue(())
    }

    fn on_hop(&mut self, summary: &HopSummary<A>) -> ControlFlow<()> {
        let _ = self.tx.send(TraceEvent::Hop(summary.clone()));
        ControlFlow::Continue(())
    }
}
