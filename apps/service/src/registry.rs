//! Static registry of monitored targets.
//!
//! The registry is loaded once at startup and never changes afterwards. It is
//! cheap to clone and is handed to the scheduler and the status aggregator at
//! construction.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No targets configured")]
    NoTargets,

    #[error("Target name must not be empty")]
    EmptyName,

    #[error("Duplicate target name: {0}")]
    DuplicateName(String),

    #[error("Target {name} has an invalid URL: {reason}")]
    InvalidUrl { name: String, reason: String },

    #[error("Target {0} has an invalid network address")]
    InvalidAddress(String),

    #[error("Target {0} must set exactly one of `url` or `ip`")]
    AmbiguousMethod(String),
}

/// Geographic display metadata. Carried through to snapshots untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(city: &str, country: &str, lat: f64, lon: f64) -> Self {
        Self { city: city.to_string(), country: country.to_string(), lat, lon }
    }

    /// Format location for display
    pub fn display(&self) -> String {
        format!("{}, {}", self.city, self.country)
    }
}

/// How a target is probed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeMethod {
    /// HTTP GET against a URL
    Http { url: String },
    /// Single ICMP echo against a host or IP
    Icmp { address: String },
}

impl ProbeMethod {
    /// The URL or address handed to the checker
    pub fn endpoint(&self) -> &str {
        match self {
            ProbeMethod::Http { url } => url,
            ProbeMethod::Icmp { address } => address,
        }
    }
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMethod::Http { url } => write!(f, "http {url}"),
            ProbeMethod::Icmp { address } => write!(f, "icmp {address}"),
        }
    }
}

/// A monitored endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TargetEntry", into = "TargetEntry")]
pub struct Target {
    pub name: String,
    pub method: ProbeMethod,
    pub location: Location,
}

impl Target {
    pub fn http(name: &str, url: &str, location: Location) -> Self {
        Self { name: name.to_string(), method: ProbeMethod::Http { url: url.to_string() }, location }
    }

    pub fn icmp(name: &str, address: &str, location: Location) -> Self {
        Self {
            name: name.to_string(),
            method: ProbeMethod::Icmp { address: address.to_string() },
            location,
        }
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }

        match &self.method {
            ProbeMethod::Http { url } => {
                let parsed = Url::parse(url).map_err(|e| RegistryError::InvalidUrl {
                    name: self.name.clone(),
                    reason: e.to_string(),
                })?;
                match parsed.scheme() {
                    "http" | "https" => Ok(()),
                    other => Err(RegistryError::InvalidUrl {
                        name: self.name.clone(),
                        reason: format!("unsupported scheme {other}"),
                    }),
                }
            }
            ProbeMethod::Icmp { address } => {
                // The address ends up on the ping command line
                if address.is_empty()
                    || address.starts_with('-')
                    || address.chars().any(char::is_whitespace)
                {
                    return Err(RegistryError::InvalidAddress(self.name.clone()));
                }
                Ok(())
            }
        }
    }
}

/// On-disk shape of a target: exactly one of `url` or `ip` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TargetEntry {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, alias = "address", skip_serializing_if = "Option::is_none")]
    ip: Option<String>,
    location: Location,
}

impl TryFrom<TargetEntry> for Target {
    type Error = RegistryError;

    fn try_from(entry: TargetEntry) -> Result<Self, Self::Error> {
        let method = match (entry.url, entry.ip) {
            (Some(url), None) => ProbeMethod::Http { url },
            (None, Some(address)) => ProbeMethod::Icmp { address },
            _ => return Err(RegistryError::AmbiguousMethod(entry.name)),
        };
        Ok(Self { name: entry.name, method, location: entry.location })
    }
}

impl From<Target> for TargetEntry {
    fn from(target: Target) -> Self {
        let (url, ip) = match target.method {
            ProbeMethod::Http { url } => (Some(url), None),
            ProbeMethod::Icmp { address } => (None, Some(address)),
        };
        Self { name: target.name, url, ip, location: target.location }
    }
}

/// Ordered, immutable set of targets with unique names
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    targets: Arc<[Target]>,
}

impl TargetRegistry {
    /// Build a registry, validating every target and name uniqueness
    pub fn new(targets: Vec<Target>) -> Result<Self, RegistryError> {
        if targets.is_empty() {
            return Err(RegistryError::NoTargets);
        }

        let mut seen = HashSet::with_capacity(targets.len());
        for target in &targets {
            target.validate()?;
            if !seen.insert(target.name.as_str()) {
                return Err(RegistryError::DuplicateName(target.name.clone()));
            }
        }

        Ok(Self { targets: targets.into() })
    }

    /// Targets in declared order
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// The demo deployment: two public sites and three LAN hosts
    pub fn default_targets() -> Vec<Target> {
        vec![
            Target::http(
                "Google (US-East)",
                "https://google.com",
                Location::new("New York", "USA", 40.7128, -74.0060),
            ),
            Target::http(
                "GitHub (US-West)",
                "https://github.com",
                Location::new("San Francisco", "USA", 37.7749, -122.4194),
            ),
            Target::icmp(
                "Local Server 1 (EU)",
                "192.168.1.100",
                Location::new("London", "UK", 51.5074, -0.1278),
            ),
            Target::icmp(
                "Local Server 2 (APAC)",
                "192.168.1.101",
                Location::new("Tokyo", "Japan", 35.6762, 139.6503),
            ),
            Target::icmp(
                "NAS Storage (AU)",
                "192.168.1.102",
                Location::new("Sydney", "Australia", -33.8688, 151.2093),
            ),
        ]
    }
}
