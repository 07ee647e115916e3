/// Checksums of the IPv4 header and the TCP segment
pub mod checksum;
/// Command-line arguments
pub mod cmd;
/// TOML flood profiles
pub mod config;
pub mod error;
/// Construction and per-packet patching of the SYN frame
pub mod frame;
/// Transports that put the frames on the wire
pub mod inject;
/// Enumeration and selection of the network interfaces
pub mod interfaces;
/// Rate governors of the send loop
pub mod rate;
pub mod stats;
pub mod structs;
/// Lifecycle of a flood run and its send loop
pub mod supervisor;

pub use error::{ErrorCategory, FloodError};
pub use stats::TelemetrySnapshot;
pub use structs::FloodParameters;
pub use supervisor::{Flooder, RunStatus};
