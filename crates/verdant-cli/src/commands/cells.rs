//! Cell management commands.

use anyhow::{Result, bail};
use verdant_types::{CellUpdate, NewCell};

use crate::cli::CellAction;
use crate::format::format_cells;
use crate::style;
use crate::util::{AppContext, confirm, require_auth};

pub async fn cmd_cells(ctx: &AppContext, action: CellAction) -> Result<()> {
    let client = ctx.client()?;
    require_auth(&client).await?;

    match action {
        CellAction::List { warehouse, output } => {
            let (format, opts) = ctx.output_settings(&output);
            let spinner = style::operation_spinner("Fetching cells...", ctx.quiet);
            let result = match &warehouse {
                Some(id) => client.list_cells_in(id).await,
                None => client.list_cells().await,
            };
            spinner.finish_and_clear();
            ctx.write(&format_cells(&result?, format, &opts)?)
        }
        CellAction::Get { id, output } => {
            let (format, opts) = ctx.output_settings(&output);
            let cell = client.get_cell(&id).await?;
            ctx.write(&format_cells(&[cell], format, &opts)?)
        }
        CellAction::Create {
            name,
            warehouse,
            row,
            column,
        } => {
            let created = client
                .create_cell(&NewCell {
                    name,
                    warehouse_id: warehouse,
                    row_number: row,
                    column_number: column,
                })
                .await?;
            if !ctx.quiet {
                eprintln!(
                    "{}",
                    style::format_success(
                        &format!("Created cell {} ({})", created.name, created.id),
                        ctx.opts.no_color
                    )
                );
            }
            Ok(())
        }
        CellAction::Update {
            id,
            name,
            warehouse,
            row,
            column,
        } => {
            let update = CellUpdate {
                name,
                warehouse_id: warehouse,
                row_number: row,
                column_number: column,
            };
            if update == CellUpdate::default() {
                bail!("Nothing to update. Pass at least one of --name, --warehouse, --row, --column");
            }
            client.update_cell(&id, &update).await?;
            if !ctx.quiet {
                eprintln!(
                    "{}",
                    style::format_success(&format!("Updated cell {}", id), ctx.opts.no_color)
                );
            }
            Ok(())
        }
        CellAction::Delete { id, force } => {
            if !confirm(&format!("Delete cell {}?", id), force)? {
                return Ok(());
            }
            client.delete_cell(&id).await?;
            if !ctx.quiet {
                eprintln!(
                    "{}",
                    style::format_success(&format!("Deleted cell {}", id), ctx.opts.no_color)
                );
            }
            Ok(())
        }
    }
}
