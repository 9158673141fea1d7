use clap::{Parser, Subcommand};
use uuid::Uuid;

/// newsroomd — headless notification sync watcher
#[derive(Parser)]
#[command(name = "newsroomd", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tail a user's notifications and surface them as push messages
    Watch {
        #[arg(long, env = "NEWSROOM_USER_ID")]
        user_id: Uuid,

        /// Only track unread notifications
        #[arg(long)]
        unread_only: bool,

        /// Seconds between cache snapshots
        #[arg(long, default_value = "2")]
        interval: u64,
    },

    /// Run the push subscription flow and show a test notification
    SendTest {
        #[arg(long, env = "NEWSROOM_USER_ID")]
        user_id: Uuid,
    },

    /// Print the stored notification preferences and unread count
    Prefs {
        #[arg(long, env = "NEWSROOM_USER_ID")]
        user_id: Uuid,
    },
}
