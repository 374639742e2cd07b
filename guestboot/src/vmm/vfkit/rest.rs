//! Client for vfkit's RESTful state endpoint.

use crate::errors::{BootError, BootResult};
use crate::vmm::{Capabilities, GuestState};
use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Body of `GET /vm/state`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StateReport {
    pub state: String,
    #[serde(default)]
    pub can_start: bool,
    #[serde(default)]
    pub can_pause: bool,
    #[serde(default)]
    pub can_resume: bool,
    #[serde(default)]
    pub can_stop: bool,
}

impl StateReport {
    pub fn guest_state(&self) -> Option<GuestState> {
        GuestState::parse(&self.state)
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            can_start: self.can_start,
            can_pause: self.can_pause,
            can_resume: self.can_resume,
            can_request_stop: self.can_stop,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    state_url: String,
}

impl RestClient {
    pub fn new(port: u16) -> BootResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BootError::Engine(format!("failed to create REST client: {}", e)))?;
        Ok(Self {
            client,
            state_url: format!("http://127.0.0.1:{}/vm/state", port),
        })
    }

    /// Current state and capabilities.
    pub async fn state(&self) -> BootResult<StateReport> {
        let response = self
            .client
            .get(&self.state_url)
            .send()
            .await
            .map_err(|e| BootError::Engine(format!("state query failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(BootError::Engine(format!(
                "state query returned {}",
                response.status()
            )));
        }
        response
            .json::<StateReport>()
            .await
            .map_err(|e| BootError::Engine(format!("malformed state report: {}", e)))
    }

    /// Ask the guest to stop.
    ///
    /// A transport failure is an error; a response with a non-success status
    /// means the engine declined.
    pub async fn request_stop(&self) -> BootResult<bool> {
        let response = self
            .client
            .put(&self.state_url)
            .json(&serde_json::json!({ "state": "Stop" }))
            .send()
            .await
            .map_err(|e| BootError::StopRequest(e.to_string()))?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "Stop request answered");
        Ok(status.is_success())
    }
}
