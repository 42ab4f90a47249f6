#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

use clap::Subcommand;

pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod providers;
pub mod scheduler;
pub mod util;

pub use config::Config;

/// Top-level commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot: status panel, bridge webhook, dispatcher and greetings
    Serve {
        /// Panel port (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Panel bind host (overrides HOST)
        #[arg(long)]
        host: Option<String>,
    },

    /// Validate configuration and print what would be used
    Check,

    /// Answer one message the way the bot would and print the reply
    Reply {
        /// Incoming message text
        text: String,

        /// Use the romantic tone
        #[arg(long)]
        lover: bool,
    },
}

