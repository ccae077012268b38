use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::remote::{DEFAULT_DATABASE_URL, Identity};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "companion",
    about = "Local progress store for the idle game companion",
    version = crate::version::VERSION,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Open the local state and bring it to the current version (default).
    Migrate,

    /// Print the local state as JSON.
    Show,

    /// Replace the local state with the signed-in user's cloud copy.
    Load,

    /// Overwrite the signed-in user's cloud copy with the local state.
    Save,
}

#[derive(Args, Debug, Clone)]
pub struct Config {
    #[arg(
        long,
        global = true,
        env = "COMPANION_DATA_DIR",
        value_name = "DIR",
        default_value = "./data"
    )]
    pub data_dir: PathBuf,

    #[arg(
        long,
        global = true,
        env = "COMPANION_DATABASE_URL",
        value_name = "URL",
        default_value = DEFAULT_DATABASE_URL
    )]
    pub database_url: String,

    /// User id the cloud copy is stored under; without it cloud commands
    /// report that nobody is logged in.
    #[arg(long, global = true, env = "COMPANION_UID", value_name = "UID")]
    pub uid: Option<String>,

    #[arg(
        long,
        global = true,
        env = "COMPANION_ID_TOKEN",
        value_name = "TOKEN",
        hide_env_values = true
    )]
    pub id_token: Option<String>,
}

impl Config {
    pub fn identity(&self) -> Option<Identity> {
        let uid = self.uid.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let identity = Identity::new(uid);
        Some(match &self.id_token {
            Some(token) => identity.with_token(token.clone()),
            None => identity,
        })
    }
}
