//! CLI entry point for threads.

pub mod auth;
pub mod errors;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Threads command-line client
#[derive(Parser, Debug)]
#[command(name = "threads", version, about = "Command-line client for Threads")]
pub struct Cli {
    /// Account alias to act on (defaults to THREADS_ACCOUNT, then the configured default)
    #[arg(long, global = true)]
    pub account: Option<String>,

    /// Secret backend: auto, keychain, secret-service, credential-manager, file, memory
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authentication and stored account management
    Auth(AuthArgs),
}

/// Arguments for the `auth` subcommand group.
#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Log in through the browser and store the token
    Login(LoginArgs),
    /// Store an access token obtained elsewhere
    Token(TokenArgs),
    /// Extend the stored token before it expires
    Refresh,
    /// Show stored accounts with identity and expiry
    Status,
    /// List stored account names
    List,
    /// Delete stored credentials
    Remove(RemoveArgs),
    /// Make an account the default
    Switch(SwitchArgs),
    /// Print the active access token for use in scripts
    PrintToken,
}

/// App credentials shared by `login` and `token`.
#[derive(Args, Debug, Default, Clone)]
pub struct AppArgs {
    /// Threads app id
    #[arg(long)]
    pub client_id: Option<String>,

    /// Threads app secret
    #[arg(long)]
    pub client_secret: Option<String>,
}

/// Arguments for `threads auth login`.
#[derive(Args, Debug)]
pub struct LoginArgs {
    #[command(flatten)]
    pub app: AppArgs,

    /// Loopback redirect URI registered for the app
    #[arg(long)]
    pub redirect_uri: Option<String>,

    /// Comma-separated scopes
    #[arg(long)]
    pub scopes: Option<String>,

    /// Print the authorization URL instead of opening a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Seconds to wait for the browser callback
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Arguments for `threads auth token`.
#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Access token to store. Omit it (or pass `-`) to read it from stdin or
    /// a hidden prompt, keeping it out of shell history.
    pub token: Option<String>,

    /// Exchange the token for a long-lived one using the app credentials
    #[arg(long)]
    pub long_lived: bool,

    #[command(flatten)]
    pub app: AppArgs,
}

/// Arguments for `threads auth remove`.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Account to remove (defaults to the active account)
    pub name: Option<String>,
}

/// Arguments for `threads auth switch`.
#[derive(Args, Debug)]
pub struct SwitchArgs {
    /// Account to make the default
    pub name: String,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
