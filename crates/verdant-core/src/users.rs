//! User administration.

use serde::Serialize;

use verdant_types::{NewUser, PasswordChange, User, UserUpdate};

use crate::client::ApiClient;
use crate::error::Result;

/// Page selector for [`ApiClient::list_users`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

impl Page {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }
}

impl ApiClient {
    /// One page of users (`?page=&limit=`).
    pub async fn list_users(&self, page: Page) -> Result<Vec<User>> {
        self.get_json_query("/users", &page, "Failed to fetch users")
            .await
    }

    pub async fn get_user(&self, id: &str) -> Result<User> {
        self.get_json(&format!("/users/{}", id), "Failed to fetch user")
            .await
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<User> {
        self.post_json("/users", user, "Failed to create user").await
    }

    /// Partial update through `PATCH /users/:id`.
    pub async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<()> {
        self.patch_unit(&format!("/users/{}", id), update, "Failed to update user")
            .await
    }

    /// Profile update through `POST /users/:id/update-user`.
    pub async fn update_profile(&self, id: &str, update: &UserUpdate) -> Result<User> {
        self.post_json(
            &format!("/users/{}/update-user", id),
            update,
            "Failed to update user",
        )
        .await
    }

    pub async fn reset_password(&self, id: &str, change: &PasswordChange) -> Result<()> {
        self.put_unit(
            &format!("/users/{}/reset-password", id),
            change,
            "Failed to reset password",
        )
        .await
    }

    pub async fn delete_user(&self, id: &str) -> Result<()> {
        self.delete(&format!("/users/{}", id), "Failed when deleting user")
            .await
    }
}
