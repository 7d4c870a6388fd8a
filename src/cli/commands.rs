use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "udp-bridge")]
#[command(about = "An HTTP bridge for synchronous request/response over UDP")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP bridge server
    ///
    /// Accepts HTTP requests, forwards each one to the remote UDP endpoint
    /// with retries, and answers with the correlated UDP reply.
    ///
    /// Example: udp-bridge serve --config bridge.toml
    Serve {
        /// Path to the TOML configuration file. Defaults apply if the file
        /// does not exist
        #[arg(short, long, default_value = "bridge.toml")]
        config: PathBuf,
    },

    /// Start the UDP echo emulator
    ///
    /// Runs a stand-in for the remote UDP service that echoes each request
    /// back with a configurable prefix and delay. Useful for local testing
    /// against a live socket.
    ///
    /// Example: udp-bridge emulator --config bridge.toml
    Emulator {
        /// Path to the TOML configuration file. Defaults apply if the file
        /// does not exist
        #[arg(short, long, default_value = "bridge.toml")]
        config: PathBuf,
    },
}
