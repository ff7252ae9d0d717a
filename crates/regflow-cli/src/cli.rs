use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "regflow", about = "Automated account signup engine", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create one signup task and stream its progress until it finishes.
    Run {
        /// Provider to sign up with.
        #[arg(long, default_value = "cursor")]
        provider: String,
        /// Mailbox address to register with.
        #[arg(long)]
        email: String,
        /// Account password; derived from the address when omitted.
        #[arg(long)]
        password: Option<String>,
        /// Run the browser with a visible window.
        #[arg(long)]
        headed: bool,
        /// Per-action debug logs plus compressed pacing.
        #[arg(long)]
        debug: bool,
    },
    /// Check that Node and the Playwright package are installed.
    Probe,
}
