use crate::config::FloodProfile;
use crate::structs::*;

use clap::{Parser, Subcommand};
use std::net::Ipv4Addr;

#[derive(Debug, Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Send TCP SYN segments toward a target at a controlled rate, until Ctrl-C or the
    /// end of the duration
    Flood {
        #[arg(short, long, default_value = None, help = "Destination IPv4 address")]
        dst: Option<Ipv4Addr>,
        #[arg(short, long, default_value = None, help = "Destination TCP port")]
        port: Option<u16>,
        #[arg(short, long, default_value = None, help = "Target throughput in bytes per second")]
        rate: Option<u64>,
        #[arg(short, long, default_value = None, help = "Source IPv4 address. Detected from the routing table by default")]
        src: Option<Ipv4Addr>,
        #[arg(
            long,
            default_value_t = false,
            help = "Use a new random source address for every packet"
        )]
        randomize_source: bool,
        #[arg(long, default_value = None, help = "Source MAC address (XX:XX:XX:XX:XX:XX or XX-XX-XX-XX-XX-XX)")]
        src_mac: Option<String>,
        #[arg(long, default_value = None, help = "Destination (or gateway) MAC address")]
        dst_mac: Option<String>,
        #[arg(short, long, default_value = None, help = "Interface to inject on: name, part of its description, or one of its addresses")]
        interface: Option<String>,
        #[arg(long, default_value = None, help = "TCP payload size in bytes (default: 0)")]
        payload: Option<usize>,
        #[arg(long, default_value = None, help = "IP time to live (default: 64)")]
        ttl: Option<u8>,
        #[arg(long, value_enum, default_value = None, help = "How source ports are chosen")]
        port_policy: Option<SourcePortPolicy>,
        #[arg(short, long, value_enum, default_value = None, help = "How packets are sent")]
        transport: Option<TransportChoice>,
        #[arg(short, long, value_enum, default_value = None, help = "How the rate is governed")]
        governor: Option<GovernorChoice>,
        #[arg(long, help = "Seed for random number generation")]
        seed: Option<u64>,
        #[arg(long, default_value = None, help = "Pin the send loop to this CPU")]
        cpu: Option<usize>,
        #[arg(long, default_value = None, help = "Stop after this duration, described in human-friendly time such as \"1min 30s\"")]
        duration: Option<String>,
        #[arg(
            short,
            long,
            default_value = None,
            help = "Path to a TOML flood profile. Command-line options take precedence"
        )]
        config: Option<String>,
    },
    /// List the network interfaces packets can be injected on
    Interfaces,
}

impl Command {
    /// The options of the command line, as a profile that overrides the file one.
    pub fn to_profile(&self) -> FloodProfile {
        match self {
            Command::Flood {
                dst,
                port,
                rate,
                src,
                randomize_source,
                src_mac,
                dst_mac,
                interface,
                payload,
                ttl,
                port_policy,
                transport,
                governor,
                seed,
                cpu,
                duration,
                config: _,
            } => FloodProfile {
                title: None,
                dst: *dst,
                port: *port,
                rate: *rate,
                src: *src,
                randomize_source: randomize_source.then_some(true),
                src_mac: src_mac.clone(),
                dst_mac: dst_mac.clone(),
                interface: interface.clone(),
                payload: *payload,
                ttl: *ttl,
                port_policy: *port_policy,
                transport: *transport,
                governor: *governor,
                seed: *seed,
                cpu: *cpu,
                duration: duration.clone(),
            },
            Command::Interfaces => FloodProfile::default(),
        }
    }
}
