use clap::{Args, Parser, Subcommand};

/// GymTap front desk: member tokens and NFC cards
#[derive(Parser)]
#[command(name = "gymtap", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// SQLite database path or URL
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = gymtap_core::constants::DEFAULT_DATABASE_PATH,
        global = true
    )]
    pub database_url: String,

    /// Never touch the hardware reader
    #[arg(long, env = "FORCE_NFC_SIMULATION", global = true)]
    pub force_simulation: bool,

    /// Default card-placement timeout, in seconds
    #[arg(long, env = "NFC_TIMEOUT", global = true)]
    pub nfc_timeout: Option<u64>,

    /// Index of the PC/SC reader to use
    #[arg(long, env = "NFC_DEVICE_INDEX", global = true)]
    pub device_index: Option<usize>,

    /// Simulated card-placement latency, in milliseconds
    #[arg(long, env = "NFC_SIMULATION_DELAY_MS", global = true)]
    pub simulation_delay_ms: Option<u64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a member (for local setups and demos)
    AddMember { name: String },

    /// Issue a new token for a member
    Generate {
        #[arg(long)]
        member: i64,
        /// Lifetime in days; omit for a token that never expires
        #[arg(long)]
        ttl_days: Option<u32>,
    },

    /// Check a token's state
    Validate {
        token: String,
        /// Also require the token to belong to this member
        #[arg(long)]
        member: Option<i64>,
    },

    /// Revoke a token
    Revoke { token: String },

    /// List a member's tokens, newest first
    List {
        #[arg(long)]
        member: i64,
    },

    /// Show one token
    Show { token: String },

    /// Count unrevoked tokens past their expiry
    Expired,

    /// Write a token to the next card presented
    Write {
        token: String,
        #[arg(long)]
        member: i64,
        /// Card-placement timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Read the next card presented
    Read {
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Read the next card and check the token it carries
    Verify {
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Probe the reader and show its status
    Status,
}
