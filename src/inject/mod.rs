use crate::error::FloodError;
use crate::structs::*;

use std::net::Ipv4Addr;

/// Unprivileged fallback: connection attempts through the regular socket API
pub mod connect;
#[cfg(feature = "link_layer")]
/// Complete Ethernet frames injected through a pcap handle
pub mod link;
/// IPv4 datagrams with caller-built headers through a raw socket
pub mod raw;

/// Something that puts frames on the wire.
///
/// A transport is opened by its constructor and owned by exactly one send loop.
pub trait Transport: std::marker::Send {
    fn name(&self) -> &'static str;

    /// Sends one frame. Returns the number of bytes that count toward the
    /// throughput of the run.
    fn send(&mut self, frame: &[u8]) -> Result<usize, FloodError>;

    /// Releases the underlying handle. Calling it twice is harmless.
    fn close(&mut self) {}

    /// Whether the frames handed to `send` must start with an Ethernet header
    fn link_layer(&self) -> bool;

    /// Rate governor used when the caller does not choose one
    fn preferred_governor(&self) -> GovernorChoice {
        GovernorChoice::Interval
    }
}

/// Opens the transport selected by the parameters. `src_ip` is the source address
/// of the run, used to find the interface to inject on.
pub fn open_transport(
    params: &FloodParameters,
    src_ip: Ipv4Addr,
) -> Result<Box<dyn Transport>, FloodError> {
    match params.resolved_transport() {
        #[cfg(feature = "link_layer")]
        TransportChoice::Link => Ok(Box::new(link::LinkTransport::open(
            src_ip,
            params.interface.as_deref(),
        )?)),
        #[cfg(not(feature = "link_layer"))]
        TransportChoice::Link => {
            let _ = src_ip;
            Err(FloodError::LinkLayerUnavailable)
        }
        TransportChoice::Connect => Ok(Box::new(connect::ConnectTransport::open(
            params.dst_ip,
            params.dst_port,
        ))),
        TransportChoice::Raw | TransportChoice::Auto => {
            Ok(Box::new(raw::RawTransport::open(params.dst_ip)?))
        }
    }
}
