//! Warehouse CRUD.

use verdant_types::{NewWarehouse, Warehouse, WarehouseStats, WarehouseUpdate};

use crate::client::ApiClient;
use crate::error::Result;

impl ApiClient {
    /// List every warehouse visible to the user.
    pub async fn list_warehouses(&self) -> Result<Vec<Warehouse>> {
        self.get_json("/warehouses", "Failed to fetch warehouses")
            .await
    }

    /// Aggregate nutrient, water and energy usage.
    pub async fn warehouse_stats(&self) -> Result<WarehouseStats> {
        self.get_json("/warehouses/stats", "Failed to fetch warehouse stats")
            .await
    }

    pub async fn get_warehouse(&self, id: &str) -> Result<Warehouse> {
        self.get_json(&format!("/warehouses/{}", id), "Failed to fetch warehouse")
            .await
    }

    pub async fn create_warehouse(&self, warehouse: &NewWarehouse) -> Result<Warehouse> {
        self.post_json("/warehouses", warehouse, "Failed to create warehouse")
            .await
    }

    /// Apply a partial update.
    pub async fn update_warehouse(&self, id: &str, update: &WarehouseUpdate) -> Result<()> {
        self.patch_unit(
            &format!("/warehouses/{}", id),
            update,
            "Failed to update warehouse",
        )
        .await
    }

    pub async fn delete_warehouse(&self, id: &str) -> Result<()> {
        self.delete(&format!("/warehouses/{}", id), "Failed when deleting warehouse")
            .await
    }
}
