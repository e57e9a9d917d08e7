//! Configuration commands.

use anyhow::{Context, Result, bail};

use crate::cli::ConfigAction;
use crate::config::Config;
use crate::style;
use crate::util::AppContext;

pub fn cmd_config(ctx: &AppContext, action: ConfigAction) -> Result<()> {
    let path = &ctx.config_path;
    let no_color = ctx.opts.no_color;

    match action {
        ConfigAction::Show => {
            let content = toml::to_string_pretty(&ctx.config).context("Failed to serialize config")?;
            let mut output = format!("# {}\n", path.display());
            if content.trim().is_empty() {
                output.push_str("# (defaults)\n");
            } else {
                output.push_str(&content);
            }
            ctx.write(&output)
        }
        ConfigAction::Get { key } => {
            let value = ctx.config.get(key).unwrap_or_else(|| "(not set)".to_string());
            ctx.write(&format!("{}\n", value))
        }
        ConfigAction::Set { key, value } => {
            let mut config = ctx.config.clone();
            config.set(key, &value)?;
            config.save_to(path)?;
            if !ctx.quiet {
                eprintln!(
                    "{}",
                    style::format_success(&format!("Set {} = {}", key.name(), value), no_color)
                );
            }
            Ok(())
        }
        ConfigAction::Unset { key } => {
            let mut config = ctx.config.clone();
            config.unset(key);
            config.save_to(path)?;
            if !ctx.quiet {
                eprintln!("{}", style::format_success(&format!("Unset {}", key.name()), no_color));
            }
            Ok(())
        }
        ConfigAction::Path => ctx.write(&format!("{}\n", path.display())),
        ConfigAction::Init => {
            if path.exists() {
                bail!("Config already exists at {}", path.display());
            }
            Config::default().save_to(path)?;
            if !ctx.quiet {
                eprintln!(
                    "{}",
                    style::format_success(&format!("Created {}", path.display()), no_color)
                );
            }
            Ok(())
        }
    }
}
