use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "meshcast", about = "Browser-embedded, BitTorrent-inspired swarm-replication engine for 3D model assets")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the tracker: room membership and signaling relay for a swarm.
    Tracker {
        /// Address to bind the tracker's HTTP/WebSocket listener on.
        #[arg(long, default_value = "127.0.0.1:9000")]
        bind: SocketAddr,
    },

    /// Chunk a local file and seed it into a swarm.
    Share {
        /// Path to the artifact blob to share.
        file: PathBuf,
        /// Tracker WebSocket URL, e.g. ws://127.0.0.1:9000/ws. Overrides
        /// `--config`'s value, if any; otherwise falls back to the built-in
        /// default.
        #[arg(long)]
        tracker: Option<String>,
        /// Local libp2p listen multiaddr. Overrides `--config`'s value, if
        /// any; otherwise falls back to the built-in default.
        #[arg(long)]
        listen: Option<String>,
        /// Producer id stamped into the artifact's provenance.
        #[arg(long, default_value = "producer")]
        producer: String,
        /// Optional human-readable prompt stamped into provenance.
        #[arg(long)]
        prompt: Option<String>,
        /// TOML config file to layer engine tunables from; `--tracker`/
        /// `--listen` above still override anything it sets.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Join an existing swarm by content id and write the reassembled
    /// artifact to disk once the transfer completes.
    Join {
        /// Content id of the swarm to join.
        content: String,
        /// Tracker WebSocket URL. Overrides `--config`'s value, if any;
        /// otherwise falls back to the built-in default.
        #[arg(long)]
        tracker: Option<String>,
        /// Local libp2p listen multiaddr. Overrides `--config`'s value, if
        /// any; otherwise falls back to the built-in default.
        #[arg(long)]
        listen: Option<String>,
        /// Path to write the reassembled artifact to.
        #[arg(long, default_value = "artifact.glb")]
        out: PathBuf,
        /// TOML config file to layer engine tunables from; `--tracker`/
        /// `--listen` above still override anything it sets.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
