//! Core types for traceroute operations

use crate::error::Error;
use serde::Serialize;

/// One row of a trace: the outcome of all probes sent with one hop limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HopSummary<A> {
    /// 1-based hop limit that elicited this row
    pub hop: u8,
    /// First error among this hop's probes, `None` when every probe answered
    pub error: Option<Error>,
    /// Address of the first responder at this hop
    pub responder: Option<A>,
    /// Fastest round trip in milliseconds
    pub min_rtt_ms: u32,
    /// Mean round trip over the probes that answered
    pub avg_rtt_ms: u32,
    /// Slowest round trip in milliseconds
    pub max_rtt_ms: u32,
}

impl<A> HopSummary<A> {
    /// True when every probe at this hop got an answer
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// True when the hop failed only because nothing answered in time
    pub fn timed_out(&self) -> bool {
        self.error.as_ref().is_some_and(Error::is_timeout)
    }
}

impl<A: PartialEq> HopSummary<A> {
    /// Check if this hop reached the destination
    pub fn is_destination(&self, target: &A) -> bool {
        self.responder.as_ref() == Some(target)
    }
}

/// Where a trace ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    /// Not started, or still running
    #[default]
    Pending,
    /// A hop's responder was the destination
    Completed,
    /// `max_hops` hops were probed without reaching the destination
    Exhausted,
    /// The observer stopped the trace
    Cancelled,
    /// An unrecoverable error stopped the trace
    Failed,
}

impl TraceStatus {
    /// True once the trace has stopped for any reason
    pub fn is_finished(self) -> bool {
        !matches!(self, TraceStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    #[test]
    fn test_hop_summary() {
        let hop = HopSummary {
            hop: 3,
            error: None,
            responder: Some(Ipv4Addr::new(10, 0, 0, 1)),
            min_rtt_ms: 1,
            avg_rtt_ms: 2,
            max_rtt_ms: 4,
        };
        assert!(hop.is_success());
        assert!(!hop.timed_out());
        assert!(hop.is_destination(&Ipv4Addr::new(10, 0, 0, 1)));
        assert!(!hop.is_destination(&Ipv4Addr::new(10, 0, 0, 2)));
    }

    #[test]
    fn test_timed_out_hop() {
        let hop: HopSummary<Ipv4Addr> = HopSummary {
            hop: 1,
            error: Some(Error::ProbeTimeout(Duration::from_secs(5))),
            responder: None,
            min_rtt_ms: 0,
            avg_rtt_ms: 0,
            max_rtt_ms: 0,
        };
        assert!(!hop.is_success());
        assert!(hop.timed_out());
    }

    #[test]
    fn test_trace_status() {
        assert_eq!(TraceStatus::default(), TraceStatus::Pending);
        assert!(!TraceStatus::Pending.is_finished());
        assert!(TraceStatus::Exhausted.is_finished());
        assert_eq!(
            serde_json::to_string(&TraceStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
