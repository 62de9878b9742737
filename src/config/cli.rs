use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the blogdeck binary.
#[derive(Debug, Parser)]
#[command(name = "blogdeck", version, about = "Blog dashboard over a REST post store")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "BLOGDECK_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the post API base URL.
    #[arg(long = "api-url", env = "BLOGDECK_API_URL", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Override the per-request timeout.
    #[arg(long = "api-timeout-seconds", value_name = "SECONDS", global = true)]
    pub api_timeout_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Featured post followed by the latest posts.
    Home,
    /// Dashboard listing, optionally filtered by a search query.
    List {
        /// Case-insensitive match against title and content.
        #[arg(long)]
        search: Option<String>,
    },
    /// Show a single post.
    Get { id: i64 },
    /// Create a post.
    Create(CreateArgs),
    /// Replace the title and content of a post.
    Update(UpdateArgs),
    /// Delete a post.
    Delete { id: i64 },
}

#[derive(Debug, Args, Clone)]
pub struct CreateArgs {
    #[arg(long)]
    pub title: String,

    #[command(flatten)]
    pub body: BodyArgs,

    /// Author id forwarded to the store.
    #[arg(long)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Args, Clone)]
pub struct UpdateArgs {
    #[arg(long)]
    pub id: i64,

    #[arg(long)]
    pub title: String,

    #[command(flatten)]
    pub body: BodyArgs,
}

/// Post content given inline or read from a file (the file wins).
#[derive(Debug, Args, Default, Clone)]
pub struct BodyArgs {
    #[arg(long)]
    pub body: Option<String>,

    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub body_file: Option<PathBuf>,
}
