//! User administration commands.
//!
//! Everything except `update --profile` needs the admin role.

use anyhow::{Result, bail};
use verdant_core::Page;
use verdant_types::{NewUser, PasswordChange, Registration, UserUpdate};

use crate::cli::UserAction;
use crate::format::format_users;
use crate::style;
use crate::util::{
    AppContext, confirm, prompt_new_password, prompt_password, require_admin, require_auth,
};

pub async fn cmd_users(ctx: &AppContext, action: UserAction) -> Result<()> {
    let client = ctx.client()?;
    match &action {
        UserAction::Update { profile: true, .. } => require_auth(&client).await?,
        _ => require_admin(&client).await?,
    };

    match action {
        UserAction::List {
            page,
            limit,
            output,
        } => {
            let (format, opts) = ctx.output_settings(&output);
            let spinner = style::operation_spinner("Fetching users...", ctx.quiet);
            let result = client.list_users(Page::new(page, limit)).await;
            spinner.finish_and_clear();
            ctx.write(&format_users(&result?, format, &opts)?)
        }
        UserAction::Get { id, output } => {
            let (format, opts) = ctx.output_settings(&output);
            let user = client.get_user(&id).await?;
            ctx.write(&format_users(&[user], format, &opts)?)
        }
        UserAction::Create {
            name,
            email,
            phone,
            role,
        } => {
            let (password, confirm_password) = prompt_new_password()?;
            // Same field rules as self-registration
            Registration {
                name: name.clone(),
                email: email.clone(),
                phone: phone.clone(),
                password: password.clone(),
                confirm_password,
            }
            .validate()?;

            let created = client
                .create_user(&NewUser {
                    name,
                    email,
                    phone,
                    password,
                    role,
                })
                .await?;
            if !ctx.quiet {
                eprintln!(
                    "{}",
                    style::format_success(
                        &format!("Created user {} ({}, {})", created.email, created.id, created.role),
                        ctx.opts.no_color
                    )
                );
            }
            Ok(())
        }
        UserAction::Update {
            id,
            name,
            email,
            phone,
            profile,
        } => {
            let update = UserUpdate { name, email, phone };
            if update == UserUpdate::default() {
                bail!("Nothing to update. Pass at least one of --name, --email, --phone");
            }
            if profile {
                let user = client.update_profile(&id, &update).await?;
                if !ctx.quiet {
                    eprintln!(
                        "{}",
                        style::format_success(
                            &format!("Updated profile of {}", user.email),
                            ctx.opts.no_color
                        )
                    );
                }
            } else {
                client.update_user(&id, &update).await?;
                if !ctx.quiet {
                    eprintln!(
                        "{}",
                        style::format_success(&format!("Updated user {}", id), ctx.opts.no_color)
                    );
                }
            }
            Ok(())
        }
        UserAction::Password { id } => {
            let current = prompt_password(None, "Current password")?;
            let (new_password, confirm_password) = prompt_new_password()?;
            if new_password != confirm_password {
                bail!("Passwords do not match");
            }
            client
                .reset_password(
                    &id,
                    &PasswordChange {
                        password: current,
                        new_password,
                    },
                )
                .await?;
            if !ctx.quiet {
                eprintln!(
                    "{}",
                    style::format_success("Password changed", ctx.opts.no_color)
                );
            }
            Ok(())
        }
        UserAction::Delete { id, force } => {
            if !confirm(&format!("Delete user {}?", id), force)? {
                return Ok(());
            }
            client.delete_user(&id).await?;
            if !ctx.quiet {
                eprintln!(
                    "{}",
                    style::format_success(&format!("Deleted user {}", id), ctx.opts.no_color)
                );
            }
            Ok(())
        }
    }
}
