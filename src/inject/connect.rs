use super::Transport;
use crate::error::FloodError;
use crate::frame::{IPV4_HEADER_LEN, TCP_HEADER_LEN};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Lets the kernel emit the SYN: one non-blocking connection attempt per send.
///
/// The frame content is ignored, the kernel picks the source address, port and
/// sequence number. Needs no privilege.
pub struct ConnectTransport {
    target: SockAddr,
    closed: bool,
}

impl ConnectTransport {
    pub fn open(dst_ip: Ipv4Addr, dst_port: u16) -> Self {
        log::info!("Sending connection attempts to {dst_ip}:{dst_port}");
        ConnectTransport {
            target: SocketAddrV4::new(dst_ip, dst_port).into(),
            closed: false,
        }
    }
}

/// The attempt is underway (or already answered), the SYN left.
fn attempt_started(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    #[cfg(unix)]
    if e.raw_os_error() == Some(libc::EINPROGRESS) {
        return true;
    }
    false
}

impl Transport for ConnectTransport {
    fn name(&self) -> &'static str {
        "connect"
    }

    fn send(&mut self, _frame: &[u8]) -> Result<usize, FloodError> {
        if self.closed {
            return Err(FloodError::TransportLost("transport is closed".into()));
        }
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        match socket.connect(&self.target) {
            Ok(()) => {}
            Err(e) if attempt_started(&e) => {}
            Err(e) => return Err(e.into()),
        }
        // dropping the socket abandons the attempt
        Ok(IPV4_HEADER_LEN + TCP_HEADER_LEN)
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn link_layer(&self) -> bool {
        false
    }
}
