/// IP protocol number of TCP, as found in the pseudo-header.
const TCP_PROTOCOL: u8 = 6;

/// One's-complement sum of the buffer seen as big-endian 16-bit words, not yet
/// folded nor complemented. A trailing odd byte is the high byte of a last word
/// whose low byte is zero.
fn ones_complement_sum(mut sum: u32, data: &[u8]) -> u32 {
    let mut words = data.chunks_exact(2);
    for w in &mut words {
        sum += u16::from_be_bytes([w[0], w[1]]) as u32;
    }
    if let [last] = words.remainder() {
        sum += (*last as u32) << 8;
    }
    sum
}

fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

/// Internet checksum (RFC 1071) of a byte buffer.
///
/// Computing it over a header whose checksum field is already filled in yields 0.
pub fn internet_checksum(data: &[u8]) -> u16 {
    !fold(ones_complement_sum(0, data))
}

/// TCP checksum of `segment` (header and payload) carried by the IPv4 header `ip_header`.
///
/// The pseudo-header is made of the source and destination addresses taken from the
/// IPv4 header, a zero byte, the TCP protocol number and the segment length.
/// The checksum field of `segment` must be zero, or the result must be compared
/// against 0 to validate an existing checksum.
pub fn tcp_checksum(ip_header: &[u8], segment: &[u8]) -> u16 {
    let mut pseudo = [0u8; 12];
    pseudo[0..8].copy_from_slice(&ip_header[12..20]);
    pseudo[9] = TCP_PROTOCOL;
    pseudo[10..12].copy_from_slice(&(segment.len() as u16).to_be_bytes());
    let sum = ones_complement_sum(0, &pseudo);
    !fold(ones_complement_sum(sum, segment))
}
