//! Remote arming control.
//!
//! The arming policy talks to the recording appliance through the [`Actuator`]
//! trait. [`AgentDvrClient`] drives AgentDVR over its HTTP command API.

mod agent_dvr;

pub use agent_dvr::{AgentDvrClient, AgentDvrConfig};

use async_trait::async_trait;

use crate::Result;

/// A device that can be armed and disarmed.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Whether the device answers. Never fails; unreachable is `false`.
    async fn probe(&self) -> bool;

    /// Current arm state as reported by the device.
    async fn get_arm_state(&self) -> Result<bool>;

    async fn set_arm_state(&self, armed: bool) -> Result<()>;
}
