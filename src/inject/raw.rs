use super::Transport;
use crate::error::{classify_send_error, FloodError};

use pnet::transport::{transport_channel, TransportChannelType, TransportSender};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use std::net::{IpAddr, Ipv4Addr};

/// Raw IPv4 socket for TCP. The kernel adds the link layer; the IP header is ours.
pub struct RawTransport {
    tx: Option<TransportSender>,
    dst_ip: Ipv4Addr,
}

impl RawTransport {
    pub fn open(dst_ip: Ipv4Addr) -> Result<Self, FloodError> {
        let channel_type = TransportChannelType::Layer3(IpNextHeaderProtocols::Tcp);
        let (tx, _) = transport_channel(4096, channel_type).map_err(|e| {
            log::error!("Cannot open raw socket: {e}. Please retry with root privilege.");
            FloodError::open("raw socket", e)
        })?;
        log::info!("Raw socket opened toward {dst_ip}");
        Ok(RawTransport {
            tx: Some(tx),
            dst_ip,
        })
    }
}

impl Transport for RawTransport {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn send(&mut self, frame: &[u8]) -> Result<usize, FloodError> {
        let packet = Ipv4Packet::new(frame).ok_or_else(|| {
            FloodError::Config(format!("{}-byte frame is not an IPv4 packet", frame.len()))
        })?;
        let tx = self
            .tx
            .as_mut()
            .ok_or_else(|| FloodError::TransportLost("raw socket is closed".into()))?;
        tx.send_to(packet, IpAddr::V4(self.dst_ip))
            .map_err(classify_send_error)
    }

    fn close(&mut self) {
        if self.tx.take().is_some() {
            log::debug!("Raw socket closed");
        }
    }

    fn link_layer(&self) -> bool {
        false
    }
}
