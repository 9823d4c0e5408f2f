//! threads CLI binary entry point.

use std::time::Duration;

use threads_cli::cli::auth::{self as auth_cli, CommandContext};
use threads_cli::cli::errors::format_error_help;
use threads_cli::cli::{Cli, Commands};
use threads_cli::error::ErrorCategory;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    tokio::spawn(exit_on_interrupt(cancel.clone()));

    let result = match CommandContext::from_cli(&cli, cancel) {
        Ok(ctx) => match cli.command {
            Commands::Auth(auth_args) => auth_cli::run(&ctx, auth_args.command).await,
        },
        Err(err) => Err(err),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", format_error_help(&e));
        let code = if e.category() == ErrorCategory::Cancelled {
            INTERRUPTED_EXIT_CODE
        } else {
            1
        };
        std::process::exit(code);
    }
}

const INTERRUPTED_EXIT_CODE: i32 = 130;
/// How long a cancelled command gets to unwind before the process exits.
const INTERRUPT_GRACE: Duration = Duration::from_secs(2);

/// First Ctrl-C cancels the running command. A second one, or a command that
/// does not stop within the grace period (a blocking prompt, say), exits.
async fn exit_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    cancel.cancel();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = tokio::time::sleep(INTERRUPT_GRACE) => {}
    }
    eprintln!("Interrupted");
    std::process::exit(INTERRUPTED_EXIT_CODE);
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("threads_cli=debug")
    } else {
        EnvFilter::try_from_env("THREADS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
