use clap::Parser;

/// Locus: drive a simulated presence and notification-state sync session.
#[derive(Parser, Debug)]
#[command(name = "locus", version, about)]
pub struct Args {
    /// User id to sign in as.
    #[arg(short, long, default_value = "demo-user")]
    pub user: String,

    /// Config file path override.
    #[arg(long)]
    pub config: Option<String>,

    /// Log level override (debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Keep the local cache in memory instead of the data directory.
    #[arg(long)]
    pub ephemeral: bool,

    /// Answer "don't allow" to the notification permission prompt.
    #[arg(long)]
    pub deny_notifications: bool,

    /// End the session by dropping the connection instead of signing out.
    #[arg(long)]
    pub crash: bool,
}

pub fn parse() -> Args {
    Args::parse()
}
