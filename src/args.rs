use std::path::PathBuf;

use clap::Args;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_SESSION: &str = "default";

#[derive(Debug, Clone, Args)]
pub struct BaseArgs {
    /// Output as JSON
    #[arg(short = 'j', long, global = true)]
    pub json: bool,

    /// Sync service base URL (or via DEVSYNC_API_URL)
    #[arg(
        long,
        env = "DEVSYNC_API_URL",
        hide_env_values = true,
        global = true
    )]
    pub api_url: Option<String>,

    /// Bearer token for the sync service (or via DEVSYNC_API_KEY)
    #[arg(
        long,
        env = "DEVSYNC_API_KEY",
        hide_env_values = true,
        global = true
    )]
    pub api_key: Option<String>,

    /// Session whose sync attempt is tracked (or via DEVSYNC_SESSION)
    #[arg(long, env = "DEVSYNC_SESSION", global = true)]
    pub session: Option<String>,

    /// Directory holding per-session state (or via DEVSYNC_STATE_DIR)
    #[arg(long, env = "DEVSYNC_STATE_DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Path to a .env file to load before running commands.
    #[arg(long, env = "DEVSYNC_ENV_FILE", hide_env_values = true)]
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct CLIArgs<T: Args> {
    #[command(flatten)]
    pub base: BaseArgs,

    #[command(flatten)]
    pub args: T,
}
