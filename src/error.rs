use std::time::Duration;

/// How an error should be handled by whoever receives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before any resource is acquired
    Configuration,
    /// The run cannot start (or cannot continue) without this resource
    Resource,
    /// A single packet was lost, the run goes on
    TransientSend,
    /// Malformed input that was replaced by a default value
    Recoverable,
    /// Misuse of the controller API
    Controller,
}

#[derive(Debug, thiserror::Error)]
pub enum FloodError {
    #[error("invalid parameters: {0}")]
    Config(String),

    #[error("cannot read profile: {0}")]
    Profile(#[from] toml::de::Error),

    #[error("malformed link-layer address {0:?} (expected XX:XX:XX:XX:XX:XX or XX-XX-XX-XX-XX-XX)")]
    MalformedMac(String),

    #[error("no network interface available for injection")]
    NoInterface,

    #[error("interface {name} uses link type {linktype}, Ethernet framing is required")]
    UnsupportedLinkType { name: String, linktype: i32 },

    #[cfg(feature = "link_layer")]
    #[error("pcap error: {0}")]
    Pcap(#[from] pcap::Error),

    #[error("cannot open {what}: {source}")]
    Open {
        what: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport lost: {0}")]
    TransportLost(String),

    #[error("link-layer injection is not available in this build")]
    LinkLayerUnavailable,

    #[error("a flood is already running")]
    AlreadyRunning,

    #[error("send loop did not stop within {0:?}")]
    StopTimeout(Duration),

    #[error("send loop terminated abnormally")]
    LoopPanicked,
}

impl FloodError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FloodError::Config(_) | FloodError::Profile(_) => ErrorCategory::Configuration,
            FloodError::MalformedMac(_) => ErrorCategory::Recoverable,
            FloodError::NoInterface
            | FloodError::UnsupportedLinkType { .. }
            | FloodError::TransportLost(_)
            | FloodError::Open { .. }
            | FloodError::LinkLayerUnavailable
            | FloodError::LoopPanicked => ErrorCategory::Resource,
            #[cfg(feature = "link_layer")]
            FloodError::Pcap(_) => ErrorCategory::TransientSend,
            FloodError::Io(_) => ErrorCategory::TransientSend,
            FloodError::AlreadyRunning | FloodError::StopTimeout(_) => ErrorCategory::Controller,
        }
    }

    /// A resource (socket, capture handle, thread) that could not be acquired.
    pub fn open(
        what: &'static str,
        e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        FloodError::Open {
            what,
            source: e.into(),
        }
    }

    /// Whether the send loop must stop after this error. Anything else is absorbed
    /// and counted as a dropped packet.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FloodError::TransportLost(_))
    }
}

/// Maps socket errors that mean the outbound path is gone to `TransportLost`.
pub(crate) fn classify_send_error(e: std::io::Error) -> FloodError {
    #[cfg(unix)]
    if matches!(
        e.raw_os_error(),
        Some(libc::ENODEV) | Some(libc::ENXIO) | Some(libc::EBADF)
    ) {
        return FloodError::TransportLost(e.to_string());
    }
    FloodError::Io(e)
}
