//! Error types for ping and traceroute operations

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while probing or tracing
///
/// Per-probe failures ([`Error::ProbeTimeout`], [`Error::FragmentationNeeded`],
/// [`Error::ProbeFailed`]) are recorded into the hop that produced them and do
/// not stop a trace. Everything else aborts the operation that raised it.
///
/// # Examples
///
/// ```
/// # use pingtrace::Error;
/// fn describe(err: &Error) -> String {
///     match err {
///         Error::ProbeTimeout(_) => "Request timed out.".to_string(),
///         Error::InsufficientPermissions { suggestion, .. } => suggestion.clone(),
///         other => format!("Error:{other}"),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Error {
    /// The host could not be resolved to an address of the requested family
    #[error("Failed to resolve host {host}: {reason}")]
    AddressResolution {
        /// Host name or literal as given by the caller
        host: String,
        /// Resolver explanation
        reason: String,
    },

    /// A structurally invalid configuration
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No reply arrived within the probe timeout
    #[error("Request timed out.")]
    ProbeTimeout(Duration),

    /// The request was too large for the path and the don't-fragment flag was set
    #[error("Packet needs to be fragmented but DF set.")]
    FragmentationNeeded {
        /// Next-hop MTU when known
        mtu: Option<u32>,
    },

    /// Any other transport or OS level failure for one probe
    #[error("{0}")]
    ProbeFailed(String),

    /// The ICMP socket could not be opened for lack of privileges
    #[error("Insufficient permissions: {required}")]
    InsufficientPermissions {
        /// Description of required permissions (e.g., "root or CAP_NET_RAW")
        required: String,
        /// Suggested remedy
        suggestion: String,
    },

    /// The observer declined to continue
    #[error("The operation was cancelled by the user.")]
    Cancelled,

    /// A background task running a blocking operation did not complete
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    /// True for failures that belong to one probe and should not stop a trace
    pub fn is_probe_error(&self) -> bool {
        matches!(
            self,
            Error::ProbeTimeout(_) | Error::FragmentationNeeded { .. } | Error::ProbeFailed(_)
        )
    }

    /// True when the probe simply received no answer
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::ProbeTimeout(_))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    pub(crate) fn resolution(host: &str, reason: impl Into<String>) -> Self {
        Error::AddressResolution {
            host: host.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_classification() {
        assert!(Error::ProbeTimeout(Duration::from_secs(1)).is_probe_error());
        assert!(Error::FragmentationNeeded { mtu: Some(1400) }.is_probe_error());
        assert!(Error::ProbeFailed("Network is unreachable".into()).is_probe_error());

        assert!(!Error::Cancelled.is_probe_error());
        assert!(!Error::invalid("probes_per_hop must be at least 1").is_probe_error());
        assert!(!Error::resolution("nowhere.invalid", "not found").is_probe_error());
        assert!(!Error::InsufficientPermissions {
            required: "root".into(),
            suggestion: "sudo".into(),
        }
        .is_probe_error());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::ProbeTimeout(Duration::from_millis(5000)).to_string(),
            "Request timed out."
        );
        assert_eq!(
            Error::FragmentationNeeded { mtu: None }.to_string(),
            "Packet needs to be fragmented but DF set."
        );
        assert_eq!(
            Error::resolution("example.invalid", "no address").to_string(),
            "Failed to resolve host example.invalid: no address"
        );
    }

    #[test]
    fn test_timeout_is_distinct_from_fragmentation() {
        let frag = Error::FragmentationNeeded { mtu: Some(1280) };
        assert!(!frag.is_timeout());
        assert_ne!(frag, Error::ProbeTimeout(Duration::from_secs(5)));
    }
}
