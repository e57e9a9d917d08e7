//! Warehouse management commands.

use anyhow::{Result, bail};
use verdant_types::{NewWarehouse, WarehouseUpdate};

use crate::cli::WarehouseAction;
use crate::format::{format_warehouse_stats, format_warehouses};
use crate::style;
use crate::util::{AppContext, confirm, require_auth};

pub async fn cmd_warehouses(ctx: &AppContext, action: WarehouseAction) -> Result<()> {
    let client = ctx.client()?;
    require_auth(&client).await?;

    match action {
        WarehouseAction::List { output } => {
            let (format, opts) = ctx.output_settings(&output);
            let spinner = style::operation_spinner("Fetching warehouses...", ctx.quiet);
            let result = client.list_warehouses().await;
            spinner.finish_and_clear();
            ctx.write(&format_warehouses(&result?, format, &opts)?)
        }
        WarehouseAction::Stats { output } => {
            let (format, opts) = ctx.output_settings(&output);
            let stats = client.warehouse_stats().await?;
            ctx.write(&format_warehouse_stats(&stats, format, &opts)?)
        }
        WarehouseAction::Get { id, output } => {
            let (format, opts) = ctx.output_settings(&output);
            let warehouse = client.get_warehouse(&id).await?;
            ctx.write(&format_warehouses(&[warehouse], format, &opts)?)
        }
        WarehouseAction::Create {
            name,
            capacity,
            mac,
            farm,
            manager,
        } => {
            let created = client
                .create_warehouse(&NewWarehouse {
                    name,
                    capacity,
                    mac,
                    farm_id: farm,
                    manager_id: manager,
                })
                .await?;
            if !ctx.quiet {
                eprintln!(
                    "{}",
                    style::format_success(
                        &format!("Created warehouse {} ({})", created.name, created.id),
                        ctx.opts.no_color
                    )
                );
            }
            Ok(())
        }
        WarehouseAction::Update {
            id,
            name,
            capacity,
            mac,
            farm,
            manager,
        } => {
            let update = WarehouseUpdate {
                name,
                capacity,
                mac,
                farm_id: farm,
                manager_id: manager,
            };
            if update.is_empty() {
                bail!("Nothing to update. Pass at least one of --name, --capacity, --mac, --farm, --manager");
            }
            client.update_warehouse(&id, &update).await?;
            if !ctx.quiet {
                eprintln!(
                    "{}",
                    style::format_success(&format!("Updated warehouse {}", id), ctx.opts.no_color)
                );
            }
            Ok(())
        }
        WarehouseAction::Delete { id, force } => {
            if !confirm(&format!("Delete warehouse {}?", id), force)? {
                return Ok(());
            }
            client.delete_warehouse(&id).await?;
            if !ctx.quiet {
                eprintln!(
                    "{}",
                    style::format_success(&format!("Deleted warehouse {}", id), ctx.opts.no_color)
                );
            }
            Ok(())
        }
    }
}
