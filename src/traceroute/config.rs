//! Configuration types for traceroute operations

use crate::error::{Error, Result};
use crate::probe::{ProbeOptions, MAX_PAYLOAD_SIZE};
use crate::socket::SocketMode;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Configuration for a traceroute operation
///
/// Constructing a config never fails; [`TracerouteConfig::validate`] runs at
/// the start of every trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracerouteConfig {
    /// Maximum number of hops (default: 30)
    pub max_hops: u8,
    /// Timeout for individual probes (default: 5000ms)
    pub timeout: Duration,
    /// Number of probes per hop (default: 3)
    pub probes_per_hop: u8,
    /// Echo payload size in bytes (default: 32)
    pub payload_size: usize,
    /// IPv4 type of service (default: 0)
    pub tos: u8,
    /// Set don't-fragment on every probe
    pub dont_fragment: bool,
    /// Request reverse-route recording
    pub reverse_route: bool,
    /// Source address to bind
    pub local_address: Option<IpAddr>,
    /// Preferred socket mode
    pub socket_mode: Option<SocketMode>,
}

impl Default for TracerouteConfig {
    fn default() -> Self {
        Self {
            max_hops: 30,
            timeout: Duration::from_millis(5000),
            probes_per_hop: 3,
            payload_size: 32,
            tos: 0,
            dont_fragment: false,
            reverse_route: false,
            local_address: None,
            socket_mode: None,
        }
    }
}

impl TracerouteConfig {
    /// Create a new TracerouteConfig builder
    pub fn builder() -> TracerouteConfigBuilder {
        TracerouteConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.probes_per_hop < 1 {
            return Err(Error::invalid("probes_per_hop must be at least 1"));
        }
        if self.max_hops < 1 {
            return Err(Error::invalid("max_hops must be at least 1"));
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

    /// Per-probe options for the given hop limit
    pub fn probe_options(&self, ttl: u8) -> ProbeOptions {
        ProbeOptions {
            ttl,
            timeout: self.timeout,
            payload_size: self.payload_size,
            tos: self.tos,
            dont_fragment: self.dont_fragment,
            reverse_route: self.reverse_route,
            local_address: self.local_address,
            socket_mode: self.socket_mode,
        }
    }
}

/// Builder for TracerouteConfig
pub struct TracerouteConfigBuilder {
    config: TracerouteConfig,
}

impl TracerouteConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: TracerouteConfig::default(),
        }
    }

    /// Set the maximum number of hops
    pub fn max_hops(mut self, hops: u8) -> Self {
        self.config.max_hops = hops;
        self
    }

    /// Set the probe timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the number of probes per hop
    pub fn probes_per_hop(mut self, probes: u8) -> Self {
        self.config.probes_per_hop = probes;
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

    /// Enable or disable reverse-route recording
    pub fn reverse_route(mut self, enable: bool) -> Self {
        self.config.reverse_route = enable;
        self
    }

    /// Bind probes to a source address
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
    pub fn build(self) -> Result<TracerouteConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for TracerouteConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_default_config() {
        let config = TracerouteConfig::default();
        assert_eq!(config.max_hops, 30);
        assert_eq!(config.timeout.as_millis(), 5000);
        assert_eq!(config.probes_per_hop, 3);
        assert_eq!(config.payload_size, 32);
        assert_eq!(config.tos, 0);
        assert!(!config.dont_fragment);
        assert!(!config.reverse_route);
        assert!(config.local_address.is_none());
        assert!(config.socket_mode.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = TracerouteConfig::builder()
            .max_hops(20)
            .timeout(Duration::from_millis(500))
            .probes_per_hop(1)
            .payload_size(1400)
            .dont_fragment(true)
            .local_address(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10)))
            .build()
            .unwrap();

        assert_eq!(config.max_hops, 20);
        assert_eq!(config.timeout.as_millis(), 500);
        assert_eq!(config.probes_per_hop, 1);
        assert_eq!(config.payload_size, 1400);
        assert!(config.dont_fragment);
    }

    #[test]
    fn test_config_validation() {
        // Zero probes per hop
        let result = TracerouteConfig::builder().probes_per_hop(0).build();
        assert!(matches!(result, Err(Error::InvalidParameter(_))));

        // Zero max hops
        let result = TracerouteConfig::builder().max_hops(0).build();
        assert!(result.is_err());

        // Zero probe timeout
        let result = TracerouteConfig::builder()
            .timeout(Duration::from_millis(0))
            .build();
        assert!(result.is_err());

        // Oversize payload
        let result = TracerouteConfig::builder()
            .payload_size(MAX_PAYLOAD_SIZE + 1)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_probe_options_carry_config() {
        let config = TracerouteConfig::builder()
            .timeout(Duration::from_millis(250))
            .tos(0x10)
            .reverse_route(true)
            .socket_mode(SocketMode::Dgram)
            .build()
            .unwrap();

        let options = config.probe_options(7);
        assert_eq!(options.ttl, 7);
        assert_eq!(options.timeout, Duration::from_millis(250));
        assert_eq!(options.tos, 0x10);
        assert!(options.reverse_route);
        assert_eq!(options.socket_mode, Some(SocketMode::Dgram));
    }
}
