//! AgentDVR HTTP command client.
//!
//! Uses the `/command/*` endpoints with HTTP basic auth. Every command is a
//! plain GET; `ping` and `getStatus` answer with small JSON bodies.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::Actuator;
use crate::config::mask_secret;
use crate::utils::http_client::build_client;
use crate::{Error, Result};

const COMMAND_PING: &str = "/command/ping";
const COMMAND_GET_STATUS: &str = "/command/getStatus";
const COMMAND_ARM: &str = "/command/arm";
const COMMAND_DISARM: &str = "/command/disarm";

/// Connection settings for an AgentDVR server.
#[derive(Clone, Serialize, Deserialize)]
pub struct AgentDvrConfig {
    /// Base URL, e.g. `http://192.168.1.10:8090`.
    pub url: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl fmt::Debug for AgentDvrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDvrConfig")
            .field("url", &self.url)
            .field("user", &mask_secret(&self.user))
            .field("password", &mask_secret(&self.password))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct PingResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    armed: bool,
}

/// AgentDVR implementation of [`Actuator`].
pub struct AgentDvrClient {
    config: AgentDvrConfig,
    client: Client,
}

impl AgentDvrClient {
    pub fn new(config: AgentDvrConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(Error::config("AgentDVR url is empty"));
        }
        if config.user.trim().is_empty() || config.password.is_empty() {
            return Err(Error::config("AgentDVR credentials are incomplete"));
        }

        let client = build_client(Duration::from_secs(config.request_timeout_secs))?;
        info!(
            url = %config.url,
            user = %mask_secret(&config.user),
            "AgentDVR client created"
        );
        Ok(Self { config, client })
    }

    fn command_url(&self, command: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), command)
    }

    /// Issue a command and return the response body of a 2xx answer.
    async fn command(&self, command: &str) -> Result<String> {
        let url = self.command_url(command);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.user, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| Error::actuator(format!("{command} request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::actuator(format!("{command} body read failed: {e}")))?;

        if !status.is_success() {
            return Err(Error::actuator(format!(
                "{command} failed: {status} - {body}"
            )));
        }
        Ok(body)
    }
}

/// `{"status":"ok"}` means the server is up.
fn parse_ping(body: &str) -> bool {
    serde_json::from_str::<PingResponse>(body.trim())
        .map(|r| r.status.eq_ignore_ascii_case("ok"))
        .unwrap_or(false)
}

fn parse_arm_state(body: &str) -> Result<bool> {
    serde_json::from_str::<StatusResponse>(body)
        .map(|r| r.armed)
        .map_err(|e| Error::actuator(format!("unexpected getStatus response: {e}")))
}

#[async_trait]
impl Actuator for AgentDvrClient {
    async fn probe(&self) -> bool {
        match self.command(COMMAND_PING).await {
            Ok(body) => {
                let up = parse_ping(&body);
                if !up {
                    warn!(body = %body, "AgentDVR ping returned an unexpected body");
                }
                up
            }
            Err(e) => {
                debug!("AgentDVR unreachable: {}", e);
                false
            }
        }
    }

    async fn get_arm_state(&self) -> Result<bool> {
        let body = self.command(COMMAND_GET_STATUS).await?;
        parse_arm_state(&body)
    }

    async fn set_arm_state(&self, armed: bool) -> Result<()> {
        let command = if armed { COMMAND_ARM } else { COMMAND_DISARM };
        self.command(command).await?;
        info!(armed, "AgentDVR arm state changed");
        Ok(())
    }
}
