//! Day/night arming policy.
//!
//! Each evaluation reads the device's arm state and compares it with the
//! configured state for the current window. At most one command is sent per
//! evaluation, and none when the device already matches. Nothing is queued:
//! a skipped or failed evaluation is simply redone on the next tick.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::window::{Period, TimeWindowCalculator};
use crate::actuator::Actuator;

/// Last known state of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArmState {
    #[default]
    Unknown,
    Disarmed,
    ArmedDay,
    ArmedNight,
}

impl ArmState {
    fn observed(armed: bool, period: Period) -> Self {
        match (armed, period) {
            (false, _) => Self::Disarmed,
            (true, Period::Day) => Self::ArmedDay,
            (true, Period::Night) => Self::ArmedNight,
        }
    }

    pub fn is_armed(&self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::Disarmed => Some(false),
            Self::ArmedDay | Self::ArmedNight => Some(true),
        }
    }
}

impl fmt::Display for ArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Disarmed => "disarmed",
            Self::ArmedDay => "armed_day",
            Self::ArmedNight => "armed_night",
        };
        f.write_str(s)
    }
}

/// What one evaluation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The device was unreachable or its state unreadable.
    Skipped,
    /// The device already matched the desired state.
    Unchanged(ArmState),
    /// A command was sent. The state is `Unknown` if the command failed.
    Commanded(ArmState),
}

/// Enforces forced arming per day/night window.
pub struct ArmingPolicy {
    actuator: Arc<dyn Actuator>,
    calculator: TimeWindowCalculator,
    force_armed_at_day: bool,
    force_armed_at_night: bool,
    state: Mutex<ArmState>,
    last_commanded: Mutex<Option<bool>>,
}

impl ArmingPolicy {
    pub fn new(
        actuator: Arc<dyn Actuator>,
        calculator: TimeWindowCalculator,
        force_armed_at_day: bool,
        force_armed_at_night: bool,
    ) -> Self {
        Self {
            actuator,
            calculator,
            force_armed_at_day,
            force_armed_at_night,
            state: Mutex::new(ArmState::Unknown),
            last_commanded: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ArmState {
        *self.state.lock()
    }

    /// Last arm value this process commanded, if any.
    pub fn last_commanded(&self) -> Option<bool> {
        *self.last_commanded.lock()
    }

    fn desired_for(&self, period: Period) -> bool {
        match period {
            Period::Day => self.force_armed_at_day,
            Period::Night => self.force_armed_at_night,
        }
    }

    pub async fn evaluate(&self, now: DateTime<Utc>) -> PolicyDecision {
        if !self.actuator.probe().await {
            debug!("Actuator unreachable, skipping arming policy");
            *self.state.lock() = ArmState::Unknown;
            return PolicyDecision::Skipped;
        }

        let observed = match self.actuator.get_arm_state().await {
            Ok(armed) => armed,
            Err(e) => {
                warn!("Failed to read arm state: {}", e);
                *self.state.lock() = ArmState::Unknown;
                return PolicyDecision::Skipped;
            }
        };

        let (period, window) = self.calculator.window_at(now);
        let desired = self.desired_for(period);

        if desired == observed {
            let state = ArmState::observed(observed, period);
            *self.state.lock() = state;
            debug!(%period, %state, until = %window.end(), "Arm state already as desired");
            return PolicyDecision::Unchanged(state);
        }

        match self.actuator.set_arm_state(desired).await {
            Ok(()) => {
                let state = ArmState::observed(desired, period);
                *self.state.lock() = state;
                *self.last_commanded.lock() = Some(desired);
                info!(%period, %state, until = %window.end(), "Arm state enforced");
                PolicyDecision::Commanded(state)
            }
            Err(e) => {
                error!(%period, desired, "Failed to change arm state: {}", e);
                *self.state.lock() = ArmState::Unknown;
                PolicyDecision::Commanded(ArmState::Unknown)
            }
        }
    }
}
