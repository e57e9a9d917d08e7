//! Backend-owned resources: warehouses, cells, and users.
//!
//! These mirror the backend's JSON entities. Nothing here is cached by the
//! client; every page render fetches fresh copies.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A physical facility containing cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warehouse {
    pub id: String,
    pub name: String,
    pub capacity: u32,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub farm_id: Option<String>,
    #[serde(default)]
    pub manager_id: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// Body of `POST /warehouses`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWarehouse {
    pub name: String,
    pub capacity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<String>,
}

/// Body of `PATCH /warehouses/:id`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<String>,
}

impl WarehouseUpdate {
    /// Whether the update carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.capacity.is_none()
            && self.mac.is_none()
            && self.farm_id.is_none()
            && self.manager_id.is_none()
    }
}

/// Aggregate resource usage across warehouses (`GET /warehouses/stats`).
///
/// The backend reports these loosely (strings or numbers), so values are
/// kept as raw JSON and rendered with [`WarehouseStats::display`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseStats {
    pub nutrients: Option<serde_json::Value>,
    pub water: Option<serde_json::Value>,
    pub energy: Option<serde_json::Value>,
}

impl WarehouseStats {
    /// Render one stat, `N/A` when missing.
    #[must_use]
    pub fn display(value: Option<&serde_json::Value>) -> String {
        match value {
            None | Some(serde_json::Value::Null) => "N/A".to_string(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// A monitored growing unit inside a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub warehouse_id: String,
    pub row_number: i32,
    pub column_number: i32,
}

/// Body of `POST /cells`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCell {
    pub name: String,
    pub warehouse_id: String,
    pub row_number: i32,
    pub column_number: i32,
}

/// Body of `PATCH /cells/:id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_number: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<i32>,
}

/// A platform user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub role: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// Body of `POST /users`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub role: String,
}

/// Body of `PATCH /users/:id` and `POST /users/:id/update-user`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Body of `PUT /users/:id/reset-password`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChange {
    pub password: String,
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warehouse_deserialization() {
        let json = r#"{
            "id": "w1",
            "name": "North Barn",
            "capacity": 40,
            "mac": "AA:BB:CC:DD:EE:FF",
            "farmId": null,
            "createdAt": "2024-04-05T10:00:00.000Z",
            "updatedAt": "2024-04-06T10:00:00Z"
        }"#;

        let warehouse: Warehouse = serde_json::from_str(json).unwrap();
        assert_eq!(warehouse.name, "North Barn");
        assert_eq!(warehouse.capacity, 40);
        assert_eq!(warehouse.mac.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert!(warehouse.farm_id.is_none());
        assert!(warehouse.manager_id.is_none());
        assert!(warehouse.created_at.is_some());
    }

    #[test]
    fn test_new_warehouse_omits_absent_associations() {
        let body = NewWarehouse {
            name: "Greenhouse".to_string(),
            capacity: 12,
            ..Default::default()
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["name"], "Greenhouse");
        assert!(json.get("farmId").is_none());
        assert!(json.get("mac").is_none());
    }

    #[test]
    fn test_cell_wire_names() {
        let json = r#"{"id":"c1","name":"A1","warehouseId":"w1","rowNumber":1,"columnNumber":3}"#;
        let cell: Cell = serde_json::from_str(json).unwrap();
        assert_eq!(cell.warehouse_id, "w1");
        assert_eq!(cell.column_number, 3);

        let update = CellUpdate {
            row_number: Some(2),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&update).unwrap(), r#"{"rowNumber":2}"#);
    }

    #[test]
    fn test_password_change_uses_snake_case() {
        let body = PasswordChange {
            password: "old".to_string(),
            new_password: "new".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["new_password"], "new");
    }

    #[test]
    fn test_stats_display() {
        let stats: WarehouseStats =
            serde_json::from_str(r#"{"nutrients":"82%","water":1200}"#).unwrap();
        assert_eq!(WarehouseStats::display(stats.nutrients.as_ref()), "82%");
        assert_eq!(WarehouseStats::display(stats.water.as_ref()), "1200");
        assert_eq!(WarehouseStats::display(stats.energy.as_ref()), "N/A");
    }

    #[test]
    fn test_warehouse_update_is_empty() {
        assert!(WarehouseUpdate::default().is_empty());
        let update = WarehouseUpdate {
            capacity: Some(10),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
