use super::Transport;
use crate::error::FloodError;
use crate::interfaces::{list_interfaces, select_interface, SelectionTier};
use crate::structs::GovernorChoice;

use pcap::{Active, Capture, Linktype};
use std::net::Ipv4Addr;

/// Kernel buffer requested for the injection handle
pub const INJECTION_BUFFER_SIZE: i32 = 128 * 1024 * 1024;

/// Injects complete Ethernet frames through a live pcap handle.
pub struct LinkTransport {
    capture: Option<Capture<Active>>,
    device: String,
}

impl LinkTransport {
    /// Opens the interface that owns `src_ip`, or matches `hint`, or else the first
    /// one the host reports.
    pub fn open(src_ip: Ipv4Addr, hint: Option<&str>) -> Result<Self, FloodError> {
        let devices = list_interfaces()?;
        let src_ip = (!src_ip.is_unspecified()).then_some(src_ip);
        let (device, tier) =
            select_interface(&devices, src_ip, hint).ok_or(FloodError::NoInterface)?;
        match tier {
            SelectionTier::Address => log::info!("Injecting on {device}"),
            SelectionTier::NameHint => log::info!("Injecting on {device} (matched by name)"),
            SelectionTier::FirstAvailable => {
                log::warn!("No interface matches the source address, injecting on {device}")
            }
        }

        let capture = Capture::from_device(device.name.as_str())
            .and_then(|c| {
                c.promisc(true)
                    .snaplen(65536)
                    .timeout(1)
                    .buffer_size(INJECTION_BUFFER_SIZE)
                    .open()
            })
            .map_err(|e| FloodError::open("capture handle", e))?;
        let linktype = capture.get_datalink();
        if linktype != Linktype::ETHERNET {
            return Err(FloodError::UnsupportedLinkType {
                name: device.name.clone(),
                linktype: linktype.0,
            });
        }
        Ok(LinkTransport {
            capture: Some(capture),
            device: device.name.clone(),
        })
    }
}

impl Transport for LinkTransport {
    fn name(&self) -> &'static str {
        "link"
    }

    fn send(&mut self, frame: &[u8]) -> Result<usize, FloodError> {
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| FloodError::TransportLost(format!("{} is closed", self.device)))?;
        capture.sendpacket(frame)?;
        Ok(frame.len())
    }

    fn close(&mut self) {
        if self.capture.take().is_some() {
            log::debug!("Injection handle on {} closed", self.device);
        }
    }

    fn link_layer(&self) -> bool {
        true
    }

    fn preferred_governor(&self) -> GovernorChoice {
        GovernorChoice::Burst
    }
}
