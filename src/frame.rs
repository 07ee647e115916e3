use crate::checksum::{internet_checksum, tcp_checksum};
use crate::error::FloodError;
use crate::structs::*;

use pnet::util::MacAddr;
use pnet_packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::MutableIpv4Packet;
use pnet_packet::tcp::{MutableTcpPacket, TcpFlags};
use pnet_packet::MutablePacket;
use rand_core::RngCore;
use std::net::Ipv4Addr;

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
pub const TCP_HEADER_LEN: usize = 20;
/// Advertised receive window of the SYN segments
pub const SYN_WINDOW: u16 = 5840;
/// Every payload byte has this value
pub const PAYLOAD_FILLER: u8 = b'A';
/// Lowest port of the ephemeral range
pub const EPHEMERAL_PORT_MIN: u16 = 1024;

const EPHEMERAL_PORT_COUNT: u32 = (u16::MAX - EPHEMERAL_PORT_MIN) as u32 + 1;

/// Parses a MAC address written as six hexadecimal octets separated by colons or
/// hyphens.
pub fn parse_mac(s: &str) -> Result<MacAddr, FloodError> {
    let malformed = || FloodError::MalformedMac(s.to_string());
    let s = s.trim();
    let separator = if s.contains(':') { ':' } else { '-' };
    let mut octets = [0u8; 6];
    let mut parts = s.split(separator);
    for octet in octets.iter_mut() {
        let part = parts.next().ok_or_else(malformed)?;
        if part.is_empty() || part.len() > 2 {
            return Err(malformed());
        }
        *octet = u8::from_str_radix(part, 16).map_err(|_| malformed())?;
    }
    if parts.next().is_some() {
        return Err(malformed());
    }
    Ok(MacAddr::new(
        octets[0], octets[1], octets[2], octets[3], octets[4], octets[5],
    ))
}

/// Like `parse_mac`, but a malformed address becomes 00:00:00:00:00:00 and the
/// problem is handed back to the caller instead of failing.
pub fn parse_mac_lenient(s: &str) -> (MacAddr, Option<FloodError>) {
    match parse_mac(s) {
        Ok(mac) => (mac, None),
        Err(e) => (MacAddr::zero(), Some(e)),
    }
}

/// A unicast address that can plausibly appear as a packet source.
fn random_source(rng: &mut impl RngCore) -> Ipv4Addr {
    loop {
        let ip = Ipv4Addr::from(rng.next_u32());
        if !(ip.is_unspecified()
            || ip.is_loopback()
            || ip.is_multicast()
            || ip.is_broadcast()
            || ip.is_link_local()
            || ip.octets()[0] >= 240)
        {
            return ip;
        }
    }
}

/// The frame of the current run: built once, then patched in place before every send.
///
/// Layout: optional Ethernet header, IPv4 header, TCP header, payload. The buffer
/// never changes size, so the IPv4 total length is written once.
#[derive(Debug)]
pub struct FrameTemplate {
    buf: Vec<u8>,
    ip_start: usize,
    tcp_start: usize,
    randomize_source: bool,
    port_policy: SourcePortPolicy,
    next_port: u16,
    recovered: Vec<FloodError>,
}

impl FrameTemplate {
    /// Builds the template and fills every static field.
    ///
    /// Malformed MAC addresses are zero-filled; the conditions are logged and kept in
    /// `recovered()`. The returned frame is already patched once, so it is wire-ready.
    pub fn build(
        params: &FloodParameters,
        link_layer: bool,
        src_ip: Ipv4Addr,
        rng: &mut impl RngCore,
    ) -> Self {
        let ip_start = if link_layer { ETHERNET_HEADER_LEN } else { 0 };
        let tcp_start = ip_start + IPV4_HEADER_LEN;
        let len = tcp_start + TCP_HEADER_LEN + params.payload_size;
        let mut template = FrameTemplate {
            buf: vec![0u8; len],
            ip_start,
            tcp_start,
            randomize_source: params.randomize_source,
            port_policy: params.src_port_policy,
            next_port: EPHEMERAL_PORT_MIN + (rng.next_u32() % EPHEMERAL_PORT_COUNT) as u16,
            recovered: vec![],
        };

        if link_layer {
            let src_mac = template.lenient_mac(params.src_mac.as_deref());
            let dst_mac = template.lenient_mac(params.dst_mac.as_deref());
            let mut eth = MutableEthernetPacket::new(&mut template.buf[..ip_start])
                .expect("Ethernet header fits in the frame");
            eth.set_destination(dst_mac);
            eth.set_source(src_mac);
            eth.set_ethertype(EtherTypes::Ipv4);
        }

        let (ip_buf, tcp_buf) = template.buf[ip_start..].split_at_mut(IPV4_HEADER_LEN);
        let mut ip = MutableIpv4Packet::new(ip_buf).expect("IPv4 header fits in the frame");
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_dscp(0);
        ip.set_ecn(0);
        ip.set_total_length((len - ip_start) as u16);
        ip.set_flags(0);
        ip.set_fragment_offset(0);
        ip.set_ttl(params.ttl);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
        ip.set_source(src_ip);
        ip.set_destination(params.dst_ip);

        let mut tcp = MutableTcpPacket::new(tcp_buf).expect("TCP header fits in the frame");
        tcp.set_destination(params.dst_port);
        tcp.set_acknowledgement(0);
        tcp.set_data_offset(5);
        tcp.set_reserved(0);
        tcp.set_flags(TcpFlags::SYN);
        tcp.set_window(SYN_WINDOW);
        tcp.set_urgent_ptr(0);
        tcp.payload_mut().fill(PAYLOAD_FILLER);

        template.patch(rng);
        template
    }

    fn lenient_mac(&mut self, s: Option<&str>) -> MacAddr {
        let Some(s) = s else {
            return MacAddr::zero();
        };
        let (mac, problem) = parse_mac_lenient(s);
        if let Some(e) = problem {
            log::warn!("{e}, using 00:00:00:00:00:00");
            self.recovered.push(e);
        }
        mac
    }

    fn next_source_port(&mut self, rng: &mut impl RngCore) -> u16 {
        match self.port_policy {
            SourcePortPolicy::Random => {
                EPHEMERAL_PORT_MIN + (rng.next_u32() % EPHEMERAL_PORT_COUNT) as u16
            }
            SourcePortPolicy::Sequential => {
                let port = self.next_port;
                self.next_port = port.checked_add(1).unwrap_or(EPHEMERAL_PORT_MIN);
                port
            }
        }
    }

    /// Overwrites the per-packet fields and recomputes both checksums.
    ///
    /// IP identification and TCP sequence number are drawn from `rng`, the source
    /// port follows the source port policy and the source address is redrawn only
    /// when source randomization is enabled.
    pub fn patch(&mut self, rng: &mut impl RngCore) {
        let identification = rng.next_u32() as u16;
        let src_port = self.next_source_port(rng);
        let sequence = rng.next_u32();
        let src_ip = self.randomize_source.then(|| random_source(rng));

        let (ip_buf, tcp_buf) = self.buf[self.ip_start..].split_at_mut(IPV4_HEADER_LEN);

        let mut ip = MutableIpv4Packet::new(ip_buf).expect("IPv4 header fits in the frame");
        ip.set_identification(identification);
        if let Some(src_ip) = src_ip {
            ip.set_source(src_ip);
        }
        ip.set_checksum(0);
        drop(ip);
        let ip_checksum = internet_checksum(ip_buf);
        ip_buf[10..12].copy_from_slice(&ip_checksum.to_be_bytes());

        let mut tcp = MutableTcpPacket::new(tcp_buf).expect("TCP header fits in the frame");
        tcp.set_source(src_port);
        tcp.set_sequence(sequence);
        tcp.set_checksum(0);
        drop(tcp);
        let tcp_sum = tcp_checksum(ip_buf, tcp_buf);
        tcp_buf[16..18].copy_from_slice(&tcp_sum.to_be_bytes());
    }

    /// The whole frame, as handed to the transport.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// The IPv4 datagram inside the frame.
    pub fn ip_bytes(&self) -> &[u8] {
        &self.buf[self.ip_start..]
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn has_link_layer(&self) -> bool {
        self.ip_start > 0
    }

    /// Malformed inputs that were replaced by defaults while building.
    pub fn recovered(&self) -> &[FloodError] {
        &self.recovered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet_packet::ethernet::EthernetPacket;
    use pnet_packet::ipv4::{self, Ipv4Packet};
    use pnet_packet::tcp::{self, TcpPacket};
    use pnet_packet::Packet;
    use rand_core::SeedableRng;
    use rand_pcg::Pcg32;

    fn params() -> FloodParameters {
        FloodParameters::new(Ipv4Addr::new(10, 0, 0, 5), 80, 1_000_000)
    }

    fn src() -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, 20)
    }

    /// Checks both embedded checksums against an independent computation.
    fn assert_checksums_valid(ip_bytes: &[u8]) {
        let ip = Ipv4Packet::new(ip_bytes).unwrap();
        assert_eq!(ip.get_checksum(), ipv4::checksum(&ip));
        assert_eq!(internet_checksum(&ip_bytes[..IPV4_HEADER_LEN]), 0);
        let segment = TcpPacket::new(ip.payload()).unwrap();
        assert_eq!(
            segment.get_checksum(),
            tcp::ipv4_checksum(&segment, &ip.get_source(), &ip.get_destination())
        );
        assert_eq!(tcp_checksum(&ip_bytes[..IPV4_HEADER_LEN], ip.payload()), 0);
    }

    #[test]
    fn mac_parsing() {
        let expected = MacAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff);
        assert_eq!(parse_mac("AA:BB:CC:DD:EE:FF").unwrap(), expected);
        assert_eq!(parse_mac("AA-BB-CC-DD-EE-FF").unwrap(), expected);
        assert_eq!(parse_mac("aa:bb:cc:dd:ee:ff").unwrap(), expected);
        assert_eq!(
            parse_mac("0:1:2:3:4:5").unwrap(),
            MacAddr::new(0, 1, 2, 3, 4, 5)
        );
        assert!(parse_mac("AA:BB:CC:DD:EE").is_err());
        assert!(parse_mac("AA:BB:CC:DD:EE:FF:00").is_err());
        assert!(parse_mac("AAA:BB:CC:DD:EE:FF").is_err());
        assert!(parse_mac("AA:BB-CC:DD:EE:FF").is_err());
    }

    #[test]
    fn malformed_mac_is_zero_filled() {
        let (mac, problem) = parse_mac_lenient("not-a-mac");
        assert_eq!(mac, MacAddr::zero());
        assert!(matches!(problem, Some(FloodError::MalformedMac(s)) if s == "not-a-mac"));

        let mut p = params();
        p.src_mac = Some("not-a-mac".into());
        p.dst_mac = Some("AA-BB-CC-DD-EE-FF".into());
        let mut rng = Pcg32::seed_from_u64(1);
        let frame = FrameTemplate::build(&p, true, src(), &mut rng);
        assert_eq!(frame.recovered().len(), 1);
        let eth = EthernetPacket::new(frame.bytes()).unwrap();
        assert_eq!(eth.get_source(), MacAddr::zero());
        assert_eq!(
            eth.get_destination(),
            MacAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff)
        );
    }

    #[test]
    fn ethernet_frame_layout() {
        let mut p = params();
        p.src_mac = Some("11:22:33:44:55:66".into());
        p.dst_mac = Some("AA:BB:CC:DD:EE:FF".into());
        p.payload_size = 16;
        p.ttl = 128;
        let mut rng = Pcg32::seed_from_u64(2);
        let frame = FrameTemplate::build(&p, true, src(), &mut rng);

        assert_eq!(frame.len(), 14 + 20 + 20 + 16);
        assert!(frame.has_link_layer());
        assert!(frame.recovered().is_empty());

        let eth = EthernetPacket::new(frame.bytes()).unwrap();
        assert_eq!(eth.get_ethertype(), EtherTypes::Ipv4);
        let ip = Ipv4Packet::new(eth.payload()).unwrap();
        assert_eq!(ip.get_version(), 4);
        assert_eq!(ip.get_header_length(), 5);
        assert_eq!(ip.get_total_length(), 56);
        assert_eq!(ip.get_ttl(), 128);
        assert_eq!(ip.get_next_level_protocol(), IpNextHeaderProtocols::Tcp);
        assert_eq!(ip.get_source(), src());
        assert_eq!(ip.get_destination(), Ipv4Addr::new(10, 0, 0, 5));

        let segment = TcpPacket::new(ip.payload()).unwrap();
        assert_eq!(segment.get_destination(), 80);
        assert_eq!(segment.get_flags(), TcpFlags::SYN);
        assert_eq!(segment.get_data_offset(), 5);
        assert_eq!(segment.get_window(), SYN_WINDOW);
        assert_eq!(segment.get_acknowledgement(), 0);
        assert!(segment.payload().iter().all(|b| *b == PAYLOAD_FILLER));
        assert_eq!(segment.payload().len(), 16);

        assert_checksums_valid(frame.ip_bytes());
    }

    #[test]
    fn raw_frame_has_no_link_layer() {
        let mut rng = Pcg32::seed_from_u64(3);
        let frame = FrameTemplate::build(&params(), false, src(), &mut rng);
        assert_eq!(frame.len(), 40);
        assert!(!frame.has_link_layer());
        assert_eq!(frame.bytes(), frame.ip_bytes());
        assert_checksums_valid(frame.bytes());
    }

    #[test]
    fn patch_keeps_length_and_checksums() {
        let mut p = params();
        p.payload_size = 7;
        let mut rng = Pcg32::seed_from_u64(4);
        let mut frame = FrameTemplate::build(&p, false, src(), &mut rng);
        let len = frame.len();
        let mut previous = frame.bytes().to_vec();
        for _ in 0..500 {
            frame.patch(&mut rng);
            assert_eq!(frame.len(), len);
            let ip = Ipv4Packet::new(frame.bytes()).unwrap();
            assert_eq!(ip.get_total_length() as usize, len);
            assert_eq!(ip.get_source(), src());
            let port = TcpPacket::new(ip.payload()).unwrap().get_source();
            assert!(port >= EPHEMERAL_PORT_MIN);
            assert_checksums_valid(frame.bytes());
            assert_ne!(frame.bytes(), &previous[..]);
            previous = frame.bytes().to_vec();
        }
    }

    #[test]
    fn sequential_ports_wrap_in_ephemeral_range() {
        let mut p = params();
        p.src_port_policy = SourcePortPolicy::Sequential;
        let mut rng = Pcg32::seed_from_u64(5);
        let mut frame = FrameTemplate::build(&p, false, src(), &mut rng);
        frame.next_port = u16::MAX - 1;
        let mut ports = vec![];
        for _ in 0..4 {
            frame.patch(&mut rng);
            let ip = Ipv4Packet::new(frame.bytes()).unwrap();
            ports.push(TcpPacket::new(ip.payload()).unwrap().get_source());
        }
        assert_eq!(ports, vec![u16::MAX - 1, u16::MAX, 1024, 1025]);
    }

    #[test]
    fn randomized_source_changes_and_stays_valid() {
        let mut p = params();
        p.randomize_source = true;
        let mut rng = Pcg32::seed_from_u64(6);
        let mut frame = FrameTemplate::build(&p, false, src(), &mut rng);
        let mut sources = std::collections::HashSet::new();
        for _ in 0..50 {
            frame.patch(&mut rng);
            let ip = Ipv4Packet::new(frame.bytes()).unwrap();
            let s = ip.get_source();
            assert!(!s.is_loopback() && !s.is_multicast() && !s.is_unspecified());
            sources.insert(s);
            assert_checksums_valid(frame.bytes());
        }
        assert!(sources.len() > 40);
    }

    #[test]
    fn same_seed_same_frames() {
        let mut a = Pcg32::seed_from_u64(7);
        let mut b = Pcg32::seed_from_u64(7);
        let mut fa = FrameTemplate::build(&params(), false, src(), &mut a);
        let mut fb = FrameTemplate::build(&params(), false, src(), &mut b);
        for _ in 0..10 {
            fa.patch(&mut a);
            fb.patch(&mut b);
            assert_eq!(fa.bytes(), fb.bytes());
        }
    }
}
