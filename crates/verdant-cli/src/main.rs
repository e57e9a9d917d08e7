use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use verdant_cli::cli::{Cli, Commands};
use verdant_cli::commands::{
    MetricsArgs, WatchArgs, cmd_actuator, cmd_cells, cmd_config, cmd_login, cmd_logout,
    cmd_metrics, cmd_mode, cmd_register, cmd_users, cmd_warehouses, cmd_watch, cmd_whoami,
};
use verdant_cli::util::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "verdant", &mut io::stdout());
        return Ok(());
    }

    // Quiet mode suppresses info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let ctx = AppContext::from_cli(&cli);
    tracing::debug!("Using config {} and backend {}", ctx.config_path.display(), ctx.base_url);

    match cli.command {
        Commands::Login { email, password } => cmd_login(&ctx, email, password).await,
        Commands::Register { name, email, phone } => cmd_register(&ctx, name, email, phone).await,
        Commands::Logout => cmd_logout(&ctx).await,
        Commands::Whoami { output } => cmd_whoami(&ctx, &output).await,
        Commands::Warehouses { action } => cmd_warehouses(&ctx, action).await,
        Commands::Cells { action } => cmd_cells(&ctx, action).await,
        Commands::Users { action } => cmd_users(&ctx, action).await,
        Commands::Metrics {
            cell,
            scope,
            year,
            month,
            day,
            output,
        } => {
            cmd_metrics(
                &ctx,
                MetricsArgs {
                    cell,
                    scope,
                    year,
                    month,
                    day,
                    output,
                },
            )
            .await
        }
        Commands::Watch {
            cell,
            count,
            capacity,
            output,
        } => {
            let (format, opts) = ctx.output_settings(&output);
            cmd_watch(
                &ctx,
                WatchArgs {
                    cell,
                    count,
                    capacity,
                    format,
                    output: ctx.output.as_ref(),
                    opts: &opts,
                },
            )
            .await
        }
        Commands::Mode { cell, action } => cmd_mode(&ctx, cell, action).await,
        Commands::Actuator {
            actuator,
            state,
            on,
            cell,
        } => cmd_actuator(&ctx, cell, actuator, state, &on).await,
        Commands::Config { action } => cmd_config(&ctx, action),
        Commands::Completions { .. } => Ok(()),
    }
}
