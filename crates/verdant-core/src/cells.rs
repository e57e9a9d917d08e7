//! Cell CRUD.
//!
//! Mode, command and metrics endpoints for a cell live in
//! [`commands`](crate::commands) and [`history`](crate::history).

use verdant_types::{Cell, CellUpdate, NewCell};

use crate::client::ApiClient;
use crate::error::Result;

impl ApiClient {
    pub async fn list_cells(&self) -> Result<Vec<Cell>> {
        self.get_json("/cells", "Failed to fetch cells").await
    }

    /// Cells belonging to one warehouse.
    ///
    /// The backend has no per-warehouse listing, so this filters the full list.
    pub async fn list_cells_in(&self, warehouse_id: &str) -> Result<Vec<Cell>> {
        let cells = self.list_cells().await?;
        Ok(cells
            .into_iter()
            .filter(|c| c.warehouse_id == warehouse_id)
            .collect())
    }

    pub async fn get_cell(&self, id: &str) -> Result<Cell> {
        self.get_json(&format!("/cells/{}", id), "Failed to fetch cell")
            .await
    }

    pub async fn create_cell(&self, cell: &NewCell) -> Result<Cell> {
        self.post_json("/cells", cell, "Failed to create cell").await
    }

    pub async fn update_cell(&self, id: &str, update: &CellUpdate) -> Result<()> {
        self.patch_unit(&format!("/cells/{}", id), update, "Failed in updating cell")
            .await
    }

    pub async fn delete_cell(&self, id: &str) -> Result<()> {
        self.delete(&format!("/cells/{}", id), "Failed when deleting cell")
            .await
    }
}
