//! CLI (CommandLine Interface) utilities for the secure search binary.
//!
//! Here you can see the options for the protocol through enum types and the
//! args struct; the actual protocol lives in [fm_index](crate::fm_index).

use clap::{Parser, ValueEnum};
use std::fmt::Display;

/// Channel types. Channels are used to communicate between parties.
#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum ChannelType {
    /// Unix domain sockets; all three parties in one process.
    Unix,
    /// TCP sockets; one process per party.
    Tcp,
}

impl Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelType::Unix => write!(f, "unix"),
            ChannelType::Tcp => write!(f, "tcp"),
        }
    }
}

/// Arguments for the secure longest-prefix-match protocol.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, next_line_help = true)]
pub struct LpmArgs {
    /// Party id in {0, 1, 2}, or -1 to run all three parties in-process.
    #[arg(short = 'p', long, default_value_t = -1)]
    pub party: i64,

    /// Log2 of the indexed table width; the text has 2^d - 2 characters.
    #[arg(short = 'd', long = "dbsize", default_value_t = 10)]
    pub database_bitsize: u64,

    /// Number of characters in the query.
    #[arg(short = 'q', long = "query-size", default_value_t = 10)]
    pub query_size: u64,

    /// Explicit DNA query; random if absent. Must match --query-size.
    #[arg(long)]
    pub query: Option<String>,

    /// Channel type for the online phase.
    #[arg(short = 'c', long = "channel", default_value_t = ChannelType::Unix)]
    pub channel_type: ChannelType,

    /// Base port for the tcp ring; each party pair uses its own offset.
    #[arg(long = "port", default_value_t = 45000)]
    pub base_port: u64,

    /// IP address of the tcp ring.
    #[arg(long = "ip", default_value = "127.0.0.1")]
    pub ip: String,

    /// Directory holding the offline artifacts (keys, shares, seeds).
    #[arg(long = "data-dir", default_value = "data/fmi")]
    pub data_dir: String,

    /// Run only the offline phase and persist the artifacts.
    #[arg(long, default_value_t = false)]
    pub offline: bool,

    /// Verbose mode. If set, print the query and the plaintext reference.
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}
