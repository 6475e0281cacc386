use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Log what would be copied without writing to the destination or the snapshot.
    #[arg(long, global = true, default_value_t = false)]
    pub dry_run: bool,
    /// Adopt the manifest's links when they disagree with the snapshot.
    #[arg(long, global = true, default_value_t = false)]
    pub prefer_manifest: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sync every post once and exit.
    Sync,
    /// Sync on the configured interval until interrupted.
    Run,
    /// List destination threads (id and title).
    DestinationThreads,
    /// List comments already in one destination thread.
    DestinationPosts {
        /// Destination thread id.
        thread: String,
    },
    /// List recent posts of the configured Facebook account.
    SourcePosts,
    /// Obtain an OAuth access token.
    Auth {
        #[arg(value_enum)]
        provider: AuthProvider,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum AuthProvider {
    Facebook,
    Disqus,
}

impl Command {
    pub fn needs_sync_state(&self) -> bool {
        matches!(self, Command::Sync | Command::Run)
    }
}
