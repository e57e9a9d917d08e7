//! Cell mode and actuator command endpoints.

use serde::{Deserialize, Serialize};
use tracing::debug;

use verdant_types::{CommandPayload, Mode};

use crate::client::ApiClient;
use crate::error::Result;

#[derive(Debug, Deserialize)]
struct ModeResponse {
    #[serde(default)]
    mode: String,
}

#[derive(Debug, Serialize)]
struct ModeRequest<'a> {
    mode: &'a str,
}

impl ApiClient {
    /// Current operating mode of a cell.
    ///
    /// Any value other than `manual` reads as [`Mode::Automatic`].
    pub async fn fetch_mode(&self, cell_id: &str) -> Result<Mode> {
        let response: ModeResponse = self
            .get_json(&format!("/cells/{}/mode", cell_id), "Failed to fetch mode")
            .await?;
        let mode = Mode::from_wire(&response.mode);
        debug!("Cell {} is in {} mode", cell_id, mode);
        Ok(mode)
    }

    /// Switch a cell's operating mode.
    pub async fn update_mode(&self, cell_id: &str, mode: Mode) -> Result<()> {
        self.post_unit(
            &format!("/cells/{}/mode", cell_id),
            &ModeRequest {
                mode: mode.as_wire(),
            },
            "Failed to update mode",
        )
        .await
    }

    /// Drive the actuators of a cell in manual mode.
    ///
    /// The payload always carries all four actuators.
    pub async fn send_command(&self, cell_id: &str, command: &CommandPayload) -> Result<()> {
        self.post_unit(
            &format!("/cells/{}/command", cell_id),
            command,
            "Failed to send command",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_request_wire_format() {
        let body = ModeRequest {
            mode: Mode::Automatic.as_wire(),
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"mode":"auto"}"#);
    }

    #[test]
    fn test_mode_response_tolerates_missing_field() {
        let response: ModeResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(Mode::from_wire(&response.mode), Mode::Automatic);
    }
}
