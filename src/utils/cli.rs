use clap::Parser;

use crate::utils::types::Address;

/// A Chord style distributed hash table node
#[derive(Parser, Debug)]
#[command(name = "ringdht")]
pub struct Cli {
    /// Path to an ini configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Address the gRPC service binds to, e.g. 127.0.0.1:5601
    #[arg(short, long)]
    pub grpc: Option<Address>,

    /// Address the web status interface binds to, e.g. 127.0.0.1:8601
    #[arg(short, long)]
    pub web: Option<Address>,

    /// gRPC address of a node in the ring to join; omit to start a new ring
    #[arg(short, long)]
    pub peer: Option<Address>,

    /// Store backend, "memory" or "file"
    #[arg(long)]
    pub store: Option<String>,

    /// Root directory for the file store backend
    #[arg(long)]
    pub store_root: Option<String>,

    /// Enable debugging RPCs (node summaries for cluster validation)
    #[arg(long, default_value_t = false)]
    pub dev: bool,
}
