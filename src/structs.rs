use serde::Deserialize;
use std::net::Ipv4Addr;

use crate::error::FloodError;

/// Default TTL of the crafted IPv4 packets
pub const DEFAULT_TTL: u8 = 64;

/// How the TCP source port changes from one packet to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourcePortPolicy {
    /// Uniform in the ephemeral range [1024, 65535]
    #[default]
    Random,
    /// Incrementing from a random ephemeral base, wrapping back to 1024
    Sequential,
}

/// Which transport strategy puts the frames on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportChoice {
    /// Link layer when both MAC addresses are known, raw socket otherwise
    #[default]
    Auto,
    /// Complete Ethernet frames through a capture/injection handle
    Link,
    /// IPv4 datagrams through a raw socket
    Raw,
    /// Plain connection attempts, no privilege needed
    Connect,
}

/// Which rate-governing policy paces the send loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GovernorChoice {
    /// The policy preferred by the transport
    #[default]
    Auto,
    /// Adaptive back-to-back bursts
    Burst,
    /// Fixed inter-packet interval with sleeps
    Interval,
}

/// Everything a run needs. Immutable once the run has started.
#[derive(Debug, Clone)]
pub struct FloodParameters {
    pub src_ip: Option<Ipv4Addr>,
    /// Draw a new source address for every packet
    pub randomize_source: bool,
    pub src_mac: Option<String>,
    pub dst_ip: Ipv4Addr,
    pub dst_mac: Option<String>,
    pub dst_port: u16,
    /// Target throughput, in bytes per second
    pub bytes_per_second: u64,
    /// Interface name (or description) substring, or an address of the interface
    pub interface: Option<String>,
    pub payload_size: usize,
    pub ttl: u8,
    pub src_port_policy: SourcePortPolicy,
    pub transport: TransportChoice,
    pub governor: GovernorChoice,
    pub seed: Option<u64>,
    /// Pin the send loop to this CPU
    pub cpu: Option<usize>,
}

impl FloodParameters {
    pub fn new(dst_ip: Ipv4Addr, dst_port: u16, bytes_per_second: u64) -> Self {
        FloodParameters {
            src_ip: None,
            randomize_source: false,
            src_mac: None,
            dst_ip,
            dst_mac: None,
            dst_port,
            bytes_per_second,
            interface: None,
            payload_size: 0,
            ttl: DEFAULT_TTL,
            src_port_policy: SourcePortPolicy::default(),
            transport: TransportChoice::default(),
            governor: GovernorChoice::default(),
            seed: None,
            cpu: None,
        }
    }

    /// Rejects parameters that cannot produce a meaningful run. No resource is
    /// touched here.
    pub fn validate(&self) -> Result<(), FloodError> {
        if self.dst_ip.is_unspecified() {
            return Err(FloodError::Config("destination address is required".into()));
        }
        if self.dst_port == 0 {
            return Err(FloodError::Config("destination port is required".into()));
        }
        if self.bytes_per_second == 0 {
            return Err(FloodError::Config(
                "target throughput must be greater than zero".into(),
            ));
        }
        // IPv4 total length is 16 bits
        if self.payload_size > u16::MAX as usize - 40 {
            return Err(FloodError::Config(format!(
                "payload of {} bytes does not fit in an IPv4 packet",
                self.payload_size
            )));
        }
        if self.ttl == 0 {
            return Err(FloodError::Config("TTL must be at least 1".into()));
        }
        if self.transport == TransportChoice::Link
            && (self.src_mac.is_none() || self.dst_mac.is_none())
        {
            return Err(FloodError::Config(
                "link-layer injection needs both source and destination MAC addresses".into(),
            ));
        }
        // the kernel builds the SYN of a connection attempt, no payload rides on it
        if self.transport == TransportChoice::Connect && self.payload_size > 0 {
            return Err(FloodError::Config(
                "connection attempts cannot carry a payload".into(),
            ));
        }
        Ok(())
    }

    /// The transport actually used, once `Auto` is resolved.
    pub fn resolved_transport(&self) -> TransportChoice {
        match self.transport {
            TransportChoice::Auto if self.src_mac.is_some() && self.dst_mac.is_some() => {
                TransportChoice::Link
            }
            TransportChoice::Auto => TransportChoice::Raw,
            t => t,
        }
    }

    pub fn target_bits_per_second(&self) -> f64 {
        self.bytes_per_second as f64 * 8.
    }
}
