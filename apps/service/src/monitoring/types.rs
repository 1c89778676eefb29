use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::registry::{Location, Target};

/// Classified outcome of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeStatus {
    Up,
    Down,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Up => write!(f, "Up"),
            ProbeStatus::Down => write!(f, "Down"),
        }
    }
}

impl FromStr for ProbeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Up" => Ok(ProbeStatus::Up),
            "Down" => Ok(ProbeStatus::Down),
            other => Err(format!("unknown probe status: {other}")),
        }
    }
}

/// One probe outcome, as produced by the executor and stored in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Row id once persisted
    pub id: Option<i64>,

    /// Name of the registry target that was probed
    pub target_name: String,

    pub status: ProbeStatus,

    /// Round-trip time in milliseconds, always 0 when down
    pub latency_ms: f64,

    /// Status code, classification reason or failure description
    pub message: String,

    pub observed_at: DateTime<Utc>,
}

impl Observation {
    /// A reachable target with its measured latency
    pub fn up(target_name: impl Into<String>, latency_ms: f64, message: impl Into<String>) -> Self {
        Self {
            id: None,
            target_name: target_name.into(),
            status: ProbeStatus::Up,
            latency_ms: latency_ms.max(0.0),
            message: message.into(),
            observed_at: Utc::now(),
        }
    }

    /// An unreachable target; latency is meaningless and recorded as 0
    pub fn down(target_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            target_name: target_name.into(),
            status: ProbeStatus::Down,
            latency_ms: 0.0,
            message: message.into(),
            observed_at: Utc::now(),
        }
    }

    /// Override the observation time
    pub fn at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }
}

/// Current state of one target as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub name: String,
    pub status: ProbeStatus,
    pub latency_ms: f64,
    pub message: String,
    pub location: Location,
}

impl StatusSnapshot {
    /// Snapshot straight from a fresh probe
    pub fn from_probe(target: &Target, observation: Observation) -> Self {
        Self {
            name: target.name.clone(),
            status: observation.status,
            latency_ms: observation.latency_ms,
            message: observation.message,
            location: target.location.clone(),
        }
    }

    /// Snapshot from a stored observation, message stamped with its time
    pub fn from_stored(target: &Target, observation: Observation) -> Self {
        let message = format!(
            "{} (checked at {})",
            observation.message,
            observation.observed_at.format("%H:%M:%S UTC")
        );
        Self { message, ..Self::from_probe(target, observation) }
    }
}
