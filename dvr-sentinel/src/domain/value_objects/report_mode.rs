//! Report mode value object.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// How recordings reach the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReportMode {
    /// Every recording is forwarded as soon as it is registered.
    #[default]
    #[serde(alias = "ASAP")]
    Immediate,
    /// One digest per night, sent once the night window closes.
    #[serde(alias = "Morning")]
    MorningOnly,
    /// One digest per day window and one per night window.
    MorningAndEvening,
}

impl ReportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "Immediate",
            Self::MorningOnly => "MorningOnly",
            Self::MorningAndEvening => "MorningAndEvening",
        }
    }

    /// Whether digests are compiled on window boundaries.
    pub fn uses_digests(&self) -> bool {
        !matches!(self, Self::Immediate)
    }
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" | "asap" => Ok(Self::Immediate),
            "morningonly" | "morning" => Ok(Self::MorningOnly),
            "morningandevening" => Ok(Self::MorningAndEvening),
            other => Err(Error::config(format!("unknown report mode '{}'", other))),
        }
    }
}
