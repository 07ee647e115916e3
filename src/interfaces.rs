use crate::error::FloodError;

use pnet::datalink;
use pnet::util::MacAddr;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// A network interface as enumerated by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub description: Option<String>,
    pub addresses: Vec<IpAddr>,
    pub mac: Option<MacAddr>,
}

impl fmt::Display for InterfaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(desc) = &self.description {
            write!(f, " ({desc})")?;
        }
        if let Some(mac) = &self.mac {
            write!(f, " [{mac}]")?;
        }
        for addr in &self.addresses {
            write!(f, " {addr}")?;
        }
        Ok(())
    }
}

/// Why an interface was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTier {
    /// One of its addresses is the configured one
    Address,
    /// Its name or description contains the configured hint
    NameHint,
    /// Nothing matched, it is simply the first one
    FirstAvailable,
}

/// Picks the interface to inject on.
///
/// The first interface owning `src_ip` (or the hint, when the hint is an address)
/// wins; otherwise the first interface whose name or description contains the hint
/// (case-insensitive); otherwise the first interface of the list. Returns `None`
/// only for an empty list.
pub fn select_interface<'a>(
    devices: &'a [InterfaceInfo],
    src_ip: Option<Ipv4Addr>,
    hint: Option<&str>,
) -> Option<(&'a InterfaceInfo, SelectionTier)> {
    let hint_addr = hint.and_then(|h| h.trim().parse::<IpAddr>().ok());
    let wanted: Vec<IpAddr> = src_ip.map(IpAddr::V4).into_iter().chain(hint_addr).collect();

    if let Some(d) = devices
        .iter()
        .find(|d| d.addresses.iter().any(|a| wanted.contains(a)))
    {
        return Some((d, SelectionTier::Address));
    }

    if let Some(hint) = hint.filter(|h| hint_addr.is_none() && !h.trim().is_empty()) {
        let hint = hint.trim().to_lowercase();
        if let Some(d) = devices.iter().find(|d| {
            d.name.to_lowercase().contains(&hint)
                || d
                    .description
                    .as_deref()
                    .is_some_and(|desc| desc.to_lowercase().contains(&hint))
        }) {
            return Some((d, SelectionTier::NameHint));
        }
    }

    devices.first().map(|d| (d, SelectionTier::FirstAvailable))
}

/// Enumerates the capture devices of the host, with the MAC address of each one
/// when the OS reports it.
#[cfg(feature = "link_layer")]
pub fn list_interfaces() -> Result<Vec<InterfaceInfo>, FloodError> {
    let links = datalink::interfaces();
    let devices =
        pcap::Device::list().map_err(|e| FloodError::open("interface list", e))?;
    Ok(devices
        .into_iter()
        .map(|d| {
            let mac = links.iter().find(|l| l.name == d.name).and_then(|l| l.mac);
            InterfaceInfo {
                addresses: d.addresses.iter().map(|a| a.addr).collect(),
                name: d.name,
                description: d.desc,
                mac,
            }
        })
        .collect())
}

/// Enumerates the network interfaces of the host.
#[cfg(not(feature = "link_layer"))]
pub fn list_interfaces() -> Result<Vec<InterfaceInfo>, FloodError> {
    Ok(datalink::interfaces()
        .into_iter()
        .map(|l| InterfaceInfo {
            addresses: l.ips.iter().map(|n| n.ip()).collect(),
            description: (!l.description.is_empty()).then(|| l.description.clone()),
            mac: l.mac,
            name: l.name,
        })
        .collect())
}
