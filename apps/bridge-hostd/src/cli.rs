use clap::{Parser, Subcommand};

/// Minimal operator surface for the inference bridge host (spec §6).
///
/// This binary is long-lived: `start` runs the relay in the foreground.
/// The other subcommands talk to that running instance through the debug
/// console rather than spawning a second process.
#[derive(Debug, Parser)]
#[command(name = "bridge-hostd", about = "Host side of the inference bridge")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bind the transport, start the relay, and block until shutdown.
    Start,
    /// Signal a running host to shut down gracefully.
    Stop,
    /// Change the active model for subsequent generations.
    SelectModel {
        #[arg(value_name = "MODEL")]
        model: String,
    },
    /// Print this host's server id (topic) for sharing with a Client.
    CopyServerId,
    /// Print a QR code encoding this host's server id.
    ShowQr,
    /// Toggle the debug console on or off.
    ToggleDebug,
    /// Stop the relay and exit the process.
    Quit,
}
