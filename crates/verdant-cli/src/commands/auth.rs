//! Sign-in, registration and session commands.

use anyhow::{Context, Result};
use serde_json::json;
use verdant_types::{Credentials, Registration};

use crate::cli::{OutputArgs, OutputFormat};
use crate::format::format_auth_text;
use crate::style;
use crate::util::{AppContext, prompt_new_password, prompt_password, prompt_text};

pub async fn cmd_login(ctx: &AppContext, email: Option<String>, password: Option<String>) -> Result<()> {
    let email = prompt_text(email, "Email")?;
    let password = prompt_password(password, "Password")?;
    let client = ctx.client()?;

    let spinner = style::operation_spinner(&format!("Signing in to {}...", ctx.base_url), ctx.quiet);
    let result = client.auth().login(&Credentials::new(&email, password)).await;
    spinner.finish_and_clear();
    let login = result.context("Login failed")?;

    if !ctx.quiet {
        let role = login
            .claims
            .as_ref()
            .and_then(|c| c.role.as_deref())
            .unwrap_or("unknown role");
        eprintln!(
            "{}",
            style::format_success(&format!("Signed in as {} ({})", email, role), ctx.opts.no_color)
        );
    }
    Ok(())
}

pub async fn cmd_register(ctx: &AppContext, name: String, email: String, phone: String) -> Result<()> {
    let (password, confirm_password) = prompt_new_password()?;
    let form = Registration {
        name,
        email,
        phone,
        password,
        confirm_password,
    };
    form.validate()?;

    let client = ctx.client()?;
    let spinner = style::operation_spinner("Creating account...", ctx.quiet);
    let result = client.auth().register(&form).await;
    spinner.finish_and_clear();
    result.context("Registration failed")?;

    if !ctx.quiet {
        eprintln!(
            "{}",
            style::format_success(
                &format!("Account created for {}. Run 'verdant login' to sign in.", form.email),
                ctx.opts.no_color
            )
        );
    }
    Ok(())
}

pub async fn cmd_logout(ctx: &AppContext) -> Result<()> {
    let client = ctx.client()?;
    client.auth().logout().await?;
    if !ctx.quiet {
        eprintln!("{}", style::format_success("Signed out", ctx.opts.no_color));
    }
    Ok(())
}

pub async fn cmd_whoami(ctx: &AppContext, output: &OutputArgs) -> Result<()> {
    let client = ctx.client()?;
    let auth = client.auth().get_auth().await;
    let (format, opts) = ctx.output_settings(output);

    let content = match format {
        OutputFormat::Json => opts.as_json(&json!({
            "authenticated": auth.is_auth,
            "claims": auth.payload,
        }))?,
        OutputFormat::Text | OutputFormat::Csv => format_auth_text(&auth, &opts),
    };
    ctx.write(&content)
}
