//! Human-readable report lines for ping sessions and traces
//!
//! Every function returns one line without a trailing newline. Reverse names
//! are looked up by the caller and passed in, so formatting never blocks.

use crate::error::{Error, Result};
use crate::ping::PingStatistics;
use crate::probe::EchoProbeResult;
use crate::traceroute::HopSummary;
use std::fmt::Display;

/// Round trip as shown in reports: `<1ms` for sub-millisecond results
pub fn format_rtt(rtt_ms: u32) -> String {
    if rtt_ms == 0 {
        "<1ms".to_string()
    } else {
        format!("{rtt_ms}ms")
    }
}

/// First line of a ping session
pub fn ping_header(host: &str, payload_size: usize) -> String {
    format!("Pinging {host} with {payload_size} bytes of data")
}

/// Line for one answered echo request
pub fn ping_reply<A: Display>(reply: &EchoProbeResult<A>, name: Option<&str>) -> String {
    let from = with_name(&reply.responder, name);
    if reply.status.is_success() {
        format!(
            "Reply from {from}, bytes={}, time={} TTL={}",
            reply.payload_size,
            format_rtt(reply.rtt_ms),
            reply.ttl
        )
    } else {
        format!("Reply from {from}: {}", reply.status)
    }
}

/// Line for an echo request that got no usable answer
pub fn ping_failure(err: &Error) -> String {
    // ProbeTimeout already renders as "Request timed out."
    err.to_string()
}

/// Closing statistics block of a ping session
pub fn ping_statistics<A: Display>(stats: &PingStatistics<A>) -> Vec<String> {
    let mut lines = vec![
        format!("Ping statistics for {}:", stats.destination),
        format!(
            "    Packets: Sent = {}, Received = {}, Lost = {} ({:.0}% loss),",
            stats.sent,
            stats.received,
            stats.lost,
            stats.loss_percent()
        ),
    ];
    if let (Some(min), Some(max), Some(avg)) = (stats.min_rtt_ms, stats.max_rtt_ms, stats.avg_rtt_ms) {
        lines.push("Approximate round trip times in milli-seconds:".to_string());
        lines.push(format!(
            "    Minimum = {}, Maximum = {}, Average = {}",
            format_rtt(min),
            format_rtt(max),
            format_rtt(avg)
        ));
    }
    lines
}

/// First line of a trace
pub fn trace_header(host: &str, max_hops: u8) -> String {
    format!("Tracing route to {host} over a maximum of {max_hops} hops:")
}

/// Line for one hop of a trace
pub fn trace_hop<A: Display>(summary: &HopSummary<A>, name: Option<&str>) -> String {
    let hop = summary.hop;
    match (&summary.error, &summary.responder) {
        (None, Some(responder)) => {
            let at = match name {
                Some(name) => format!("{name} [{responder}]"),
                None => responder.to_string(),
            };
            format!(
                "  {hop}\t{}\t{}\t{}\t{at}",
                format_rtt(summary.min_rtt_ms),
                format_rtt(summary.avg_rtt_ms),
                format_rtt(summary.max_rtt_ms)
            )
        }
        (Some(err), _) if err.is_timeout() => format!("  {hop}\t*\t*\t*\tRequest timed out."),
        (Some(err), _) => format!("  {hop}\t*\t*\t*\tError:{err}"),
        (None, None) => format!("  {hop}\t*\t*\t*\tRequest timed out."),
    }
}

/// Last line of a trace
pub fn trace_footer(outcome: &Result<()>) -> String {
    match outcome {
        Ok(()) => "Trace complete.".to_string(),
        Err(e) => e.to_string(),
    }
}

fn with_name<A: Display>(addr: &A, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{addr} [{name}]"),
        None => addr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::ReplyStatus;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::time::Duration;

    fn reply(status: ReplyStatus, rtt_ms: u32) -> EchoProbeResult<Ipv4Addr> {
        EchoProbeResult {
            responder: Ipv4Addr::new(192, 0, 2, 1),
            rtt_ms,
            status,
            ttl: 128,
            reply_ttl: Some(55),
            payload_size: 32,
            raw_reply: Vec::new(),
        }
    }

    fn hop(error: Option<Error>) -> HopSummary<Ipv4Addr> {
        HopSummary {
            hop: 3,
            error,
            responder: Some(Ipv4Addr::new(10, 0, 0, 3)),
            min_rtt_ms: 0,
            avg_rtt_ms: 4,
            max_rtt_ms: 12,
        }
    }

    #[test]
    fn test_format_rtt() {
        assert_eq!(format_rtt(0), "<1ms");
        assert_eq!(format_rtt(1), "1ms");
        assert_eq!(format_rtt(42), "42ms");
    }

    #[test]
    fn test_ping_lines() {
        assert_eq!(
            ping_header("example.com", 32),
            "Pinging example.com with 32 bytes of data"
        );
        assert_eq!(
            ping_reply(&reply(ReplyStatus::Success, 0), None),
            "Reply from 192.0.2.1, bytes=32, time=<1ms TTL=128"
        );
        assert_eq!(
            ping_reply(&reply(ReplyStatus::Success, 17), Some("gw.example.net")),
            "Reply from 192.0.2.1 [gw.example.net], bytes=32, time=17ms TTL=128"
        );
        assert_eq!(
            ping_reply(&reply(ReplyStatus::TtlExpired, 3), None),
            "Reply from 192.0.2.1: TTL expired in transit."
        );
        assert_eq!(
            ping_failure(&Error::ProbeTimeout(Duration::from_secs(5))),
            "Request timed out."
        );
    }

    #[test]
    fn test_ping_statistics_block() {
        let mut stats = PingStatistics::new("example.com", Ipv6Addr::LOCALHOST);
        let mut ok = reply(ReplyStatus::Success, 6);
        stats.record(&Err(Error::ProbeTimeout(Duration::from_secs(1))));
        let mut lines = ping_statistics(&stats);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Ping statistics for ::1:");
        assert_eq!(
            lines[1],
            "    Packets: Sent = 1, Received = 0, Lost = 1 (100% loss),"
        );

        ok.rtt_ms = 0;
        let mut v4 = PingStatistics::new("example.com", Ipv4Addr::new(192, 0, 2, 1));
        v4.record(&Ok(ok.clone()));
        ok.rtt_ms = 10;
        v4.record(&Ok(ok));
        lines = ping_statistics(&v4);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], "    Minimum = <1ms, Maximum = 10ms, Average = 5ms");
    }

    #[test]
    fn test_trace_lines() {
        assert_eq!(
            trace_header("example.com", 30),
            "Tracing route to example.com over a maximum of 30 hops:"
        );
        assert_eq!(trace_hop(&hop(None), None), "  3\t<1ms\t4ms\t12ms\t10.0.0.3");
        assert_eq!(
            trace_hop(&hop(None), Some("core1.example.net")),
            "  3\t<1ms\t4ms\t12ms\tcore1.example.net [10.0.0.3]"
        );
        assert_eq!(
            trace_hop(&hop(Some(Error::ProbeTimeout(Duration::from_secs(5)))), None),
            "  3\t*\t*\t*\tRequest timed out."
        );
        assert_eq!(
            trace_hop(&hop(Some(Error::FragmentationNeeded { mtu: None })), None),
            "  3\t*\t*\t*\tError:Packet needs to be fragmented but DF set."
        );
    }

    #[test]
    fn test_trace_footer() {
        assert_eq!(trace_footer(&Ok(())), "Trace complete.");
        assert_eq!(
            trace_footer(&Err(Error::Cancelled)),
            "The operation was cancelled by the user."
        );
    }
}
