//! High-level traceroute API

use crate::error::Result;
use crate::socket::AddressFamily;
use crate::traceroute::{RouteTracer, TraceObserver, TraceResult, TracerouteConfig};

/// Convenience function to run a trace with the system ICMP probe
///
/// This is the simplest way to perform a traceroute: the host is resolved for
/// the requested family and probed hop by hop until it answers or
/// `max_hops` is reached.
///
/// # Examples
///
/// ```no_run
/// use pingtrace::socket::Icmpv4;
/// use pingtrace::traceroute::{trace, TracerouteConfig};
///
/// let result = trace::<Icmpv4>("example.com", TracerouteConfig::default())?;
/// for hop in &result.hops {
///     println!("Hop {}: {:?}", hop.hop, hop.responder);
/// }
/// # Ok::<(), pingtrace::Error>(())
/// ```
pub fn trace<F: AddressFamily>(host: &str, config: TracerouteConfig) -> Result<TraceResult<F::Addr>> {
    RouteTracer::<F>::new(config).trace(host, &mut ())
}

/// Run a trace that reports progress to `observer`
///
/// The observer can stop the trace at any probe or hop boundary; the hops
/// gathered before that point are still returned in `result`.
pub fn trace_with_observer<F, O>(
    host: &str,
    config: TracerouteConfig,
    result: &mut TraceResult<F::Addr>,
    observer: &mut O,
) -> Result<()>
where
    F: AddressFamily,
    O: TraceObserver<F::Addr> + ?Sized,
{
    RouteTracer::<F>::new(config).trace_into(host, result, observer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::socket::{Icmpv4, Icmpv6};
    use crate::traceroute::TraceStatus;

    #[test]
    fn test_invalid_config_rejected_before_probing() {
        let config = TracerouteConfig {
            probes_per_hop: 0,
            ..TracerouteConfig::default()
        };
        let err = trace::<Icmpv4>("192.0.2.1", config).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn test_wrong_family_literal() {
        let mut result = TraceResult::default();
        let err = trace_with_observer::<Icmpv6, _>(
            "192.0.2.1",
            TracerouteConfig::default(),
            &mut result,
            &mut (),
        )
        .unwrap_err();

        assert!(matches!(err, Error::AddressResolution { .. }));
        assert_eq!(result.status, TraceStatus::Failed);
        assert!(result.hops.is_empty());
    }
}
