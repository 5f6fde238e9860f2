use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "claimmap")]
#[command(about = "claimmap CLI: validate and dry-run identity provider claim mappings")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Provider file (overrides CLAIMMAP_PROVIDERS and the default location)
    #[arg(short, long, global = true, env = "CLAIMMAP_PROVIDERS")]
    pub providers: Option<PathBuf>,

    /// Log level filter, ignored when RUST_LOG is set
    #[arg(long, global = true, env = "CLAIMMAP_LOG", default_value = "warn")]
    pub log_level: String,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the provider file and list its providers
    Check,
    /// Map a claims document with one provider
    Map(MapArgs),
    /// Watch the provider file and report every reload
    Watch,
}

#[derive(clap::Args)]
pub struct MapArgs {
    /// Identity provider ID (idp_id in the provider file)
    #[arg(long)]
    pub idp: String,
    /// Path to a JSON claims document (reads from stdin if omitted)
    #[arg(long)]
    pub claims: Option<PathBuf>,
    /// Number of earlier attempts whose localpart was taken
    #[arg(long, default_value_t = 0, conflicts_with = "taken")]
    pub failures: u32,
    /// Simulate a full login where these localparts are already registered
    #[arg(long, num_args = 1..)]
    pub taken: Vec<String>,
    /// Server name used to build user IDs in a simulated login
    #[arg(long, default_value = "localhost")]
    pub server_name: String,
}
