//! Mode and actuator commands.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use verdant_core::{ApiClient, CommandController, Error};
use verdant_types::{Actuator, ActuatorState, Mode, Switch};

use crate::cli::{ModeAction, SwitchAction};
use crate::format::format_actuators_text;
use crate::style;
use crate::util::{AppContext, require_auth, require_cell};

async fn controller(ctx: &AppContext, cell: Option<String>) -> Result<CommandController<ApiClient>> {
    let cell_id = require_cell(cell, &ctx.config)?;
    let client = ctx.client()?;
    require_auth(&client).await?;

    // The channel stays disconnected; commands go over HTTP.
    let channel = ctx.channel(client.options())?;
    let controller = CommandController::new(Arc::new(client), channel, cell_id);
    controller
        .load()
        .await
        .with_context(|| format!("Failed to load the mode of cell {}", controller.cell_id()))?;
    Ok(controller)
}

pub async fn cmd_mode(ctx: &AppContext, cell: Option<String>, action: ModeAction) -> Result<()> {
    let controller = controller(ctx, cell).await?;
    let no_color = ctx.opts.no_color;

    let target = match action {
        ModeAction::Get => None,
        ModeAction::Manual => Some(Mode::Manual),
        ModeAction::Automatic => Some(Mode::Automatic),
        ModeAction::Toggle => controller.mode().map(Mode::toggled),
    };

    let result = match target {
        None => Ok(()),
        Some(mode) => match controller.set_mode(mode).await {
            Ok(true) => {
                if !ctx.quiet {
                    eprintln!(
                        "{}",
                        style::format_success(
                            &format!("Cell {} is now {}", controller.cell_id(), mode),
                            no_color
                        )
                    );
                }
                Ok(())
            }
            Ok(false) => {
                if !ctx.quiet {
                    eprintln!(
                        "{}",
                        style::format_info(
                            &format!("Cell {} is already {}", controller.cell_id(), mode),
                            no_color
                        )
                    );
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
    };
    controller.close();
    result?;

    if let Some(mode) = controller.mode() {
        ctx.write(&format!(
            "{}: {}\n",
            controller.cell_id(),
            style::format_mode(mode, no_color)
        ))?;
    }
    Ok(())
}

/// Positions to assume before changing `actuator`: `keep_on` are on,
/// everything else off.
pub fn assumed_positions(keep_on: &[Actuator]) -> ActuatorState {
    keep_on
        .iter()
        .fold(ActuatorState::default(), |state, actuator| {
            state.with(*actuator, Switch::On)
        })
}

pub async fn cmd_actuator(
    ctx: &AppContext,
    cell: Option<String>,
    actuator: Actuator,
    state: SwitchAction,
    keep_on: &[Actuator],
) -> Result<()> {
    let controller = controller(ctx, cell).await?;
    let switch = match state {
        SwitchAction::On => Switch::On,
        SwitchAction::Off => Switch::Off,
    };

    controller.assume_actuators(assumed_positions(keep_on));
    let result = controller.set_actuator(actuator, switch).await;
    controller.close();

    match result {
        Ok(()) => {}
        Err(Error::ModeLocked { .. }) => bail!(
            "Cell {} is in Automatic mode. Run 'verdant mode {} manual' first.",
            controller.cell_id(),
            controller.cell_id()
        ),
        Err(e) => {
            return Err(e).with_context(|| {
                format!("{} command for cell {} was not applied", actuator, controller.cell_id())
            });
        }
    }

    if !ctx.quiet {
        eprintln!(
            "{}",
            style::format_success(
                &format!("{} switched {}", actuator, style::format_switch(switch, ctx.opts.no_color)),
                ctx.opts.no_color
            )
        );
    }
    let mode = controller.mode().unwrap_or(Mode::Manual);
    ctx.write(&format_actuators_text(
        controller.cell_id(),
        mode,
        &controller.actuators(),
        &ctx.opts,
    ))
}
