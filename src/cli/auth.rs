//! CLI auth command handlers.

use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{AppArgs, AuthCommands, Cli, LoginArgs, RemoveArgs, SwitchArgs, TokenArgs};
use crate::auth::backend::{BackendOptions, PassphraseSource};
use crate::auth::oauth::browser::{BrowserLauncher, ManualBrowser, SystemBrowser};
use crate::auth::oauth::{AuthorizationRequest, FlowEvent, OAuthFlow};
use crate::auth::expiry::ExpiryStatus;
use crate::auth::{
    expiry, select_backend, AppCredentials, AuthError, AuthService, CredentialSummary,
    SecretStore,
};
use crate::config::{default_config_path, CliConfig};
use crate::error::ThreadsError;

/// Resolved settings for one invocation, passed to every handler.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: CliConfig,
    pub config_path: PathBuf,
    /// `--account`, when given.
    pub account: Option<String>,
    pub json: bool,
    pub cancel: CancellationToken,
}

impl CommandContext {
    /// Load configuration and apply the global flags on top of it.
    pub fn from_cli(cli: &Cli, cancel: CancellationToken) -> Result<Self, ThreadsError> {
        let config_path = cli.config.clone().unwrap_or_else(default_config_path);
        let mut config = CliConfig::load(Some(&config_path))?;
        if let Some(backend) = &cli.backend {
            config.backend = backend.clone();
        }
        Ok(Self {
            config,
            config_path,
            account: cli.account.clone(),
            json: cli.json,
            cancel,
        })
    }

    pub fn store(&self) -> Result<Arc<SecretStore>, ThreadsError> {
        let passphrase = match &self.config.file_passphrase {
            Some(value) => PassphraseSource::Value(value.clone()),
            None => PassphraseSource::Prompt,
        };
        let options = BackendOptions::new(self.config.file_dir()).with_passphrase(passphrase);
        let backend = select_backend(self.config.backend_kind()?, &options)?;
        Ok(Arc::new(SecretStore::new(backend)))
    }

    pub fn flow(&self, browser: Arc<dyn BrowserLauncher>) -> Result<OAuthFlow, ThreadsError> {
        let client = reqwest::Client::builder()
            .timeout(self.config.http_timeout())
            .build()
            .map_err(AuthError::from)?;
        Ok(OAuthFlow::new(client)
            .with_endpoints(self.config.endpoints())
            .with_browser(browser)
            .with_callback_timeout(self.config.callback_timeout())
            .with_step_timeout(self.config.http_timeout()))
    }

    pub fn service(&self, flow: OAuthFlow) -> Result<AuthService, ThreadsError> {
        Ok(AuthService::new(self.store()?, flow)
            .with_expiry_window(self.config.expiry_window())
            .with_auto_refresh(self.config.auto_refresh))
    }

    fn default_service(&self) -> Result<AuthService, ThreadsError> {
        self.service(self.flow(Arc::new(SystemBrowser))?)
    }

    fn resolve_account(&self, service: &AuthService) -> Result<String, ThreadsError> {
        Ok(service.resolve_account_name(
            self.account.as_deref(),
            self.config.default_account.as_deref(),
        )?)
    }

    fn app_credentials(&self, args: &AppArgs) -> Result<AppCredentials, ThreadsError> {
        let client_id = args
            .client_id
            .clone()
            .or_else(|| self.config.client_id.clone())
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                ThreadsError::Configuration(
                    "missing app id; pass --client-id or set THREADS_CLIENT_ID".to_string(),
                )
            })?;
        let client_secret = args
            .client_secret
            .clone()
            .or_else(|| self.config.client_secret.clone())
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                ThreadsError::Configuration(
                    "missing app secret; pass --client-secret or set THREADS_CLIENT_SECRET"
                        .to_string(),
                )
            })?;
        Ok(AppCredentials {
            client_id,
            client_secret,
        })
    }
}

/// Dispatch one `threads auth` subcommand.
pub async fn run(ctx: &CommandContext, command: AuthCommands) -> Result<(), ThreadsError> {
    match command {
        AuthCommands::Login(args) => handle_login(ctx, args).await,
        AuthCommands::Token(args) => handle_token(ctx, args).await,
        AuthCommands::Refresh => handle_refresh(ctx).await,
        AuthCommands::Status => handle_status(ctx),
        AuthCommands::List => handle_list(ctx),
        AuthCommands::Remove(args) => handle_remove(ctx, args),
        AuthCommands::Switch(args) => handle_switch(ctx, args),
        AuthCommands::PrintToken => handle_print_token(ctx).await,
    }
}

/// Handle `threads auth login`.
pub async fn handle_login(ctx: &CommandContext, args: LoginArgs) -> Result<(), ThreadsError> {
    let app = ctx.app_credentials(&args.app)?;
    let mut config = ctx.config.clone();
    if let Some(scopes) = &args.scopes {
        config.set_scopes(scopes);
    }
    if let Some(secs) = args.timeout {
        config.callback_timeout_secs = secs;
    }
    let redirect_uri = args.redirect_uri.unwrap_or(config.redirect_uri.clone());
    let ctx = CommandContext {
        config,
        ..ctx.clone()
    };

    let browser: Arc<dyn BrowserLauncher> = if args.no_browser {
        Arc::new(ManualBrowser)
    } else {
        Arc::new(SystemBrowser)
    };
    let flow = ctx.flow(browser)?.with_event_sink(Arc::new(|event: &FlowEvent| {
        if let FlowEvent::AuthorizeUrl {
            url,
            browser_opened,
        } = event
        {
            if *browser_opened {
                eprintln!("🌐 Opened your browser. If nothing happened, visit:");
            } else {
                eprintln!("🔗 Open this URL in your browser:");
            }
            eprintln!("   {url}");
            eprintln!("⏳ Waiting for authorization...");
        }
    }));
    let service = ctx.service(flow)?;

    let name = ctx
        .account
        .clone()
        .or_else(|| ctx.config.default_account.clone())
        .unwrap_or_else(|| "default".to_string());
    let request = AuthorizationRequest::builder()
        .client_id(app.client_id)
        .client_secret(app.client_secret)
        .redirect_uri(redirect_uri)
        .scopes(ctx.config.scopes.clone())
        .build();

    let record = service.login(&name, &request, &ctx.cancel).await?;
    let summary = record.summary(chrono::Utc::now(), ctx.config.expiry_window());
    if ctx.json {
        return print_json(&summary);
    }
    println!(
        "✅ Logged in as @{} (account '{}', {})",
        summary.username,
        summary.name,
        describe_expiry(&summary)
    );
    Ok(())
}

/// Handle `threads auth token <token>`.
pub async fn handle_token(ctx: &CommandContext, args: TokenArgs) -> Result<(), ThreadsError> {
    let service = ctx.default_service()?;
    let app = if args.long_lived {
        Some(ctx.app_credentials(&args.app)?)
    } else {
        None
    };
    let name = ctx
        .account
        .clone()
        .or_else(|| ctx.config.default_account.clone())
        .unwrap_or_else(|| "default".to_string());

    let token = read_token(args.token)?;

    let record = service
        .ingest_token(&name, &token, app, &ctx.cancel)
        .await?;
    let summary = record.summary(chrono::Utc::now(), ctx.config.expiry_window());
    if ctx.json {
        return print_json(&summary);
    }
    println!(
        "✅ Stored token for @{} as account '{}' ({})",
        summary.username,
        summary.name,
        describe_expiry(&summary)
    );
    Ok(())
}

/// Handle `threads auth refresh`.
pub async fn handle_refresh(ctx: &CommandContext) -> Result<(), ThreadsError> {
    let service = ctx.default_service()?;
    let name = ctx.resolve_account(&service)?;
    let record = service.refresh(&name, &ctx.cancel).await?;
    let summary = record.summary(chrono::Utc::now(), ctx.config.expiry_window());
    if ctx.json {
        return print_json(&summary);
    }
    println!("🔄 Refreshed '{}' ({})", summary.name, describe_expiry(&summary));
    Ok(())
}

/// Handle `threads auth status`.
pub fn handle_status(ctx: &CommandContext) -> Result<(), ThreadsError> {
    let service = ctx.default_service()?;
    let summaries = match &ctx.account {
        Some(name) => vec![service.summary(name)?],
        None => service.status()?,
    };
    if ctx.json {
        return print_json(&summaries);
    }
    if summaries.is_empty() {
        println!("No accounts stored. Run: threads auth login");
        return Ok(());
    }
    let active = ctx
        .config
        .default_account
        .as_deref()
        .map(crate::auth::normalize_name);
    for summary in &summaries {
        let marker = if active.as_deref() == Some(summary.name.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {}", render_summary(summary));
    }
    println!("Backend: {}", service.store().backend_kind());
    Ok(())
}

/// Handle `threads auth list`.
pub fn handle_list(ctx: &CommandContext) -> Result<(), ThreadsError> {
    let names = ctx.default_service()?.list()?;
    if ctx.json {
        return print_json(&names);
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

/// Handle `threads auth remove [name]`.
pub fn handle_remove(ctx: &CommandContext, args: RemoveArgs) -> Result<(), ThreadsError> {
    let service = ctx.default_service()?;
    let name = match args.name {
        Some(name) => name,
        None => ctx.resolve_account(&service)?,
    };
    service.remove(&name)?;
    if !ctx.json {
        println!("🗑️  Removed '{}'", crate::auth::normalize_name(&name));
    }
    Ok(())
}

/// Handle `threads auth switch <name>`.
pub fn handle_switch(ctx: &CommandContext, args: SwitchArgs) -> Result<(), ThreadsError> {
    let service = ctx.default_service()?;
    // Only switch to an account that actually exists.
    let summary = service.summary(&args.name)?;
    CliConfig::save_default_account(&ctx.config_path, &summary.name)?;
    if ctx.json {
        return print_json(&summary);
    }
    println!("✅ Default account is now '{}'", summary.name);
    Ok(())
}

/// Handle `threads auth print-token`.
pub async fn handle_print_token(ctx: &CommandContext) -> Result<(), ThreadsError> {
    let service = ctx.default_service()?;
    let name = ctx.resolve_account(&service)?;
    let active = service.access_token(&name, &ctx.cancel).await?;
    if active.refreshed {
        eprintln!("🔄 Token for '{}' was refreshed", active.record.name);
    } else if active.expiring_soon {
        let days = expiry::days_until_expiry(&active.record, chrono::Utc::now());
        eprintln!(
            "⚠️  Token for '{}' expires in {:.0} day(s). Run: threads auth refresh",
            active.record.name, days
        );
    }
    println!("{}", active.record.access_token);
    Ok(())
}

/// The token from the argument, or from stdin or a hidden prompt when it is
/// omitted or `-`.
fn read_token(arg: Option<String>) -> Result<String, ThreadsError> {
    match arg {
        Some(token) if token != "-" => Ok(token),
        None if std::io::stdin().is_terminal() => dialoguer::Password::new()
            .with_prompt("Access token")
            .interact()
            .map_err(|e| ThreadsError::InvalidArgument(format!("could not read the access token: {e}"))),
        _ => token_from_reader(std::io::stdin().lock()),
    }
}

fn token_from_reader(mut input: impl Read) -> Result<String, ThreadsError> {
    let mut raw = String::new();
    input.read_to_string(&mut raw)?;
    let token = raw.trim();
    if token.is_empty() {
        return Err(ThreadsError::InvalidArgument(
            "no access token given on stdin".to_string(),
        ));
    }
    Ok(token.to_string())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), ThreadsError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One status line for an account.
pub fn render_summary(summary: &CredentialSummary) -> String {
    let who = if summary.username.is_empty() {
        "(unknown user)".to_string()
    } else {
        format!("@{}", summary.username)
    };
    format!(
        "{:<16} {:<20} {:<16} {}",
        summary.name,
        who,
        summary.token,
        describe_expiry(summary)
    )
}

fn describe_expiry(summary: &CredentialSummary) -> String {
    let Some(at) = summary.expires_at else {
        return "no known expiry".to_string();
    };
    let days = summary.days_until_expiry.floor();
    match summary.status {
        ExpiryStatus::Expired => "expired".to_string(),
        ExpiryStatus::ExpiringSoon => format!(
            "expires soon: {} ({days:.0} days, run `threads auth refresh`)",
            at.format("%Y-%m-%d")
        ),
        ExpiryStatus::Valid | ExpiryStatus::NoExpiry => {
            format!("expires {} ({days:.0} days)", at.format("%Y-%m-%d"))
        }
    }
}
