//! Result types for traceroute operations

use crate::traceroute::types::{HopSummary, TraceStatus};
use serde::Serialize;

/// Result of a traceroute operation
///
/// Filled hop by hop while the trace runs. After a cancelled or failed trace
/// it still holds every hop completed before the stop.
///
/// # Examples
///
/// ```no_run
/// use pingtrace::socket::Icmpv4;
/// use pingtrace::traceroute::{trace, TracerouteConfig};
///
/// let result = trace::<Icmpv4>("192.0.2.1", TracerouteConfig::default())?;
///
/// println!("Reached destination: {}", result.destination_reached());
/// println!("Total hops: {}", result.hop_count());
///
/// for hop in &result.hops {
///     if let Some(addr) = hop.responder {
///         println!("Hop {}: {} ({}ms)", hop.hop, addr, hop.avg_rtt_ms);
///     }
/// }
/// # Ok::<(), pingtrace::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceResult<A> {
    /// Target host as provided
    pub target: String,
    /// Resolved destination address, `None` until resolution succeeds
    pub destination: Option<A>,
    /// Hops in hop order
    pub hops: Vec<HopSummary<A>>,
    /// Where the trace ended up
    pub status: TraceStatus,
}

impl<A> Default for TraceResult<A> {
    fn default() -> Self {
        Self {
            target: String::new(),
            destination: None,
            hops: Vec::new(),
            status: TraceStatus::Pending,
        }
    }
}

impl<A> TraceResult<A> {
    /// Empty pending result for `target`
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Reset to an empty pending result for `target`, keeping the allocation
    pub fn reset(&mut self, target: &str) {
        self.target.clear();
        self.target.push_str(target);
        self.destination = None;
        self.hops.clear();
        self.status = TraceStatus::Pending;
    }

    /// Get the number of hops recorded
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Whether the trace reached its destination
    pub fn destination_reached(&self) -> bool {
        self.status == TraceStatus::Completed
    }

    /// The last recorded hop
    pub fn last_hop(&self) -> Option<&HopSummary<A>> {
        self.hops.last()
    }

    /// Hops where at least one probe was answered
    pub fn responding_hops(&self) -> impl Iterator<Item = &HopSummary<A>> {
        self.hops.iter().filter(|h| h.responder.is_some())
    }

    /// Mean of the per-hop averages over fully successful hops
    pub fn average_rtt_ms(&self) -> Option<f64> {
        let rtts: Vec<f64> = self
            .hops
            .iter()
            .filter(|h| h.is_success())
            .map(|h| f64::from(h.avg_rtt_ms))
            .collect();

        if rtts.is_empty() {
            None
        } else {
            Some(rtts.iter().sum::<f64>() / rtts.len() as f64)
        }
    }
}
