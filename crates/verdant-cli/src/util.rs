//! Utility functions for CLI operations.

use std::fs::OpenOptions;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password};
use verdant_core::auth::DASHBOARD_ROUTE;
use verdant_core::{
    ApiClient, AuthState, ClientOptions, FileSessionStore, RealtimeChannel, ReconnectOptions,
    RouteDecision, SocketIoTransport, route_decision,
};

use crate::cli::{Cli, OutputArgs, OutputFormat};
use crate::config::{self, Config};
use crate::format::FormatOptions;

/// Settings shared by every command, resolved once from flags and config.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub base_url: String,
    pub jwt_secret: Option<String>,
    pub quiet: bool,
    pub output: Option<PathBuf>,
    pub opts: FormatOptions,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Self {
        let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
        let config = Config::load_from(&config_path);
        let base_url = config::resolve_url(cli.url.clone(), &config);
        let opts = FormatOptions::new(cli.no_color || config.no_color, config.fahrenheit, cli.style)
            .with_compact(cli.compact);
        Self {
            config,
            config_path,
            base_url,
            jwt_secret: cli.jwt_secret.clone().filter(|s| !s.is_empty()),
            quiet: cli.quiet,
            output: cli.output.clone(),
            opts,
        }
    }

    /// Output format and formatting options for one command.
    pub fn output_settings(&self, args: &OutputArgs) -> (OutputFormat, FormatOptions) {
        let format = args.resolve_format(self.config.format.as_deref());
        let mut opts = self.opts.with_no_header(args.no_header);
        opts.fahrenheit = args.resolve_fahrenheit(self.config.fahrenheit);
        (format, opts)
    }

    pub fn client_options(&self) -> ClientOptions {
        let mut builder = ClientOptions::builder()
            .base_url(self.base_url.clone())
            .timeout(config::resolve_timeout(&self.config, Duration::from_secs(10)))
            .secure_cookies(self.config.secure_cookies)
            .buffer_capacity(config::resolve_capacity(None, &self.config));
        if let Some(secret) = &self.jwt_secret {
            builder = builder.jwt_secret(secret.clone());
        }
        builder.build()
    }

    /// API client backed by the session file next to the config.
    pub fn client(&self) -> Result<ApiClient> {
        let session_path = Config::session_path(&self.config_path);
        let session = FileSessionStore::open(&session_path)
            .with_context(|| format!("Failed to open session at {}", session_path.display()))?;
        let options = self.client_options();
        options.validate().context("Invalid client settings")?;
        ApiClient::new(options, Arc::new(session)).context("Failed to create API client")
    }

    /// Real-time channel for the configured backend, not yet connected.
    pub fn channel(&self, options: &ClientOptions) -> Result<RealtimeChannel> {
        let transport = SocketIoTransport::new(
            &options.base_url,
            &options.namespace,
            ReconnectOptions::default(),
        )
        .context("Failed to set up the real-time transport")?;
        Ok(RealtimeChannel::new(Arc::new(transport), options.ack_timeout))
    }

    pub fn write(&self, content: &str) -> Result<()> {
        write_output(self.output.as_ref(), content)
    }
}

/// Get the cell identifier, with a helpful error message.
pub fn require_cell(cell: Option<String>, config: &Config) -> Result<String> {
    config::resolve_cell(cell, config).ok_or_else(|| {
        anyhow::anyhow!(
            "No cell specified. Pass a cell id or run 'verdant config set cell <ID>'.\n\
             Run 'verdant cells list' to see available cells."
        )
    })
}

/// Fail unless the stored session is valid, refreshing it if needed.
pub async fn require_auth(client: &ApiClient) -> Result<AuthState> {
    let auth = client.auth().get_auth().await;
    if route_decision(DASHBOARD_ROUTE, &auth) != RouteDecision::Allow {
        bail!("Not signed in. Run 'verdant login' first.");
    }
    Ok(auth)
}

/// Fail unless the signed-in user may open admin pages.
pub async fn require_admin(client: &ApiClient) -> Result<AuthState> {
    let auth = require_auth(client).await?;
    if route_decision("/admin/users", &auth) != RouteDecision::Allow {
        bail!("This command requires the admin role.");
    }
    Ok(auth)
}

fn require_terminal(what: &str) -> Result<()> {
    if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
        bail!("Cannot prompt for {} without a terminal", what);
    }
    Ok(())
}

/// Use the given value or prompt for it.
pub fn prompt_text(value: Option<String>, prompt: &str) -> Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    require_terminal(prompt)?;
    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact_text()
        .context("Failed to read input")
}

/// Use the given password or prompt for it without echo.
pub fn prompt_password(value: Option<String>, prompt: &str) -> Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    require_terminal("a password")?;
    Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact()
        .context("Failed to read password")
}

/// Prompt for a new password twice, returning both entries.
pub fn prompt_new_password() -> Result<(String, String)> {
    require_terminal("a password")?;
    let theme = ColorfulTheme::default();
    let password = Password::with_theme(&theme)
        .with_prompt("Password")
        .interact()
        .context("Failed to read password")?;
    let confirm = Password::with_theme(&theme)
        .with_prompt("Confirm password")
        .interact()
        .context("Failed to read password")?;
    Ok((password, confirm))
}

/// Ask before a destructive action; `force` skips the prompt.
pub fn confirm(prompt: &str, force: bool) -> Result<bool> {
    if force {
        return Ok(true);
    }
    if !io::stdin().is_terminal() {
        bail!("Refusing to continue without confirmation. Use --force.");
    }
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

/// Write output to file or stdout
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

/// Append output to file or write to stdout, for streaming commands.
pub fn append_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            file.write_all(content.as_bytes())
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}
