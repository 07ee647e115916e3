use crate::error::FloodError;
use crate::structs::*;

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;

/// A flood profile, as written in a TOML file. Every field is optional: the
/// command line fills (or overrides) what the file leaves out.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FloodProfile {
    pub title: Option<String>,
    pub dst: Option<Ipv4Addr>,
    pub port: Option<u16>,
    /// Bytes per second
    pub rate: Option<u64>,
    pub src: Option<Ipv4Addr>,
    pub randomize_source: Option<bool>,
    pub src_mac: Option<String>,
    pub dst_mac: Option<String>,
    pub interface: Option<String>,
    pub payload: Option<usize>,
    pub ttl: Option<u8>,
    pub port_policy: Option<SourcePortPolicy>,
    pub transport: Option<TransportChoice>,
    pub governor: Option<GovernorChoice>,
    pub seed: Option<u64>,
    pub cpu: Option<usize>,
    /// Run duration, e.g. "30s" or "2min"
    pub duration: Option<String>,
}

/// Parses a profile from its TOML text.
pub fn import_profile(profile_string: &str) -> Result<FloodProfile, FloodError> {
    let profile: FloodProfile = toml::from_str(profile_string)?;
    if let Some(title) = &profile.title {
        log::info!("\"{title}\" successfully loaded");
    }
    log::trace!("Profile: {profile:?}");
    Ok(profile)
}

impl FloodProfile {
    /// Fields set in `other` replace those of `self`.
    pub fn merge(self, other: FloodProfile) -> FloodProfile {
        FloodProfile {
            title: other.title.or(self.title),
            dst: other.dst.or(self.dst),
            port: other.port.or(self.port),
            rate: other.rate.or(self.rate),
            src: other.src.or(self.src),
            randomize_source: other.randomize_source.or(self.randomize_source),
            src_mac: other.src_mac.or(self.src_mac),
            dst_mac: other.dst_mac.or(self.dst_mac),
            interface: other.interface.or(self.interface),
            payload: other.payload.or(self.payload),
            ttl: other.ttl.or(self.ttl),
            port_policy: other.port_policy.or(self.port_policy),
            transport: other.transport.or(self.transport),
            governor: other.governor.or(self.governor),
            seed: other.seed.or(self.seed),
            cpu: other.cpu.or(self.cpu),
            duration: other.duration.or(self.duration),
        }
    }

    /// The run duration, if any.
    pub fn duration(&self) -> Result<Option<Duration>, FloodError> {
        self.duration
            .as_deref()
            .map(|d| {
                humantime::parse_duration(d)
                    .map_err(|e| FloodError::Config(format!("invalid duration {d:?}: {e}")))
            })
            .transpose()
    }

    /// Builds the run parameters. Destination, port and rate are mandatory.
    pub fn to_parameters(&self) -> Result<FloodParameters, FloodError> {
        let dst = self
            .dst
            .ok_or_else(|| FloodError::Config("destination address is required".into()))?;
        let port = self
            .port
            .ok_or_else(|| FloodError::Config("destination port is required".into()))?;
        let rate = self
            .rate
            .ok_or_else(|| FloodError::Config("target rate is required".into()))?;

        let mut params = FloodParameters::new(dst, port, rate);
        params.src_ip = self.src;
        params.randomize_source = self.randomize_source.unwrap_or(false);
        params.src_mac = self.src_mac.clone();
        params.dst_mac = self.dst_mac.clone();
        params.interface = self.interface.clone();
        params.payload_size = self.payload.unwrap_or(0);
        params.ttl = self.ttl.unwrap_or(DEFAULT_TTL);
        params.src_port_policy = self.port_policy.unwrap_or_default();
        params.transport = self.transport.unwrap_or_default();
        params.governor = self.governor.unwrap_or_default();
        params.seed = self.seed;
        params.cpu = self.cpu;
        params.validate()?;
        Ok(params)
    }
}
