// Container-side domain model: app instances, port pairs, engine-reported status

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend/frontend port pair of one app instance (derived, never stored)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortPair {
    pub backend_port: u16,
    pub frontend_port: u16,
}

/// Everything needed to address one (model, app_num) container pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInstance {
    pub model: String,
    pub model_index: usize,
    pub app_num: u32,
    pub ports: PortPair,
    pub project_name: String,
    pub backend_container: String,
    pub frontend_container: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Starting,
    Unknown,
}

impl HealthState {
    /// Map an engine health string (`docker inspect` `.State.Health.Status`)
    pub fn from_engine(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "healthy" => HealthState::Healthy,
            "unhealthy" => HealthState::Unhealthy,
            "starting" => HealthState::Starting,
            _ => HealthState::Unknown,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Unhealthy => write!(f, "unhealthy"),
            HealthState::Starting => write!(f, "starting"),
            HealthState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Snapshot of a single container as reported by the engine
///
/// Fetched fresh on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub exists: bool,
    pub running: bool,
    pub health: HealthState,
    pub status: String,
    pub details: String,
}

impl ContainerStatus {
    pub fn not_found(name: &str) -> Self {
        Self {
            exists: false,
            running: false,
            health: HealthState::Unknown,
            status: "not_found".to_string(),
            details: format!("container {} does not exist", name),
        }
    }

    /// Anything other than running+healthy is "not ready"
    pub fn is_ready(&self) -> bool {
        self.running && self.health == HealthState::Healthy
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exists={} running={} health={} status={}",
            self.exists, self.running, self.health, self.status
        )?;
        if !self.details.is_empty() {
            write!(f, " ({})", self.details)?;
        }
        Ok(())
    }
}

/// Multi-step lifecycle actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
    Build,
    Rebuild,
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerAction::Start => write!(f, "start"),
            ContainerAction::Stop => write!(f, "stop"),
            ContainerAction::Restart => write!(f, "restart"),
            ContainerAction::Build => write!(f, "build"),
            ContainerAction::Rebuild => write!(f, "rebuild"),
        }
    }
}

impl FromStr for ContainerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(ContainerAction::Start),
            "stop" => Ok(ContainerAction::Stop),
            "restart" => Ok(ContainerAction::Restart),
            "build" => Ok(ContainerAction::Build),
            "rebuild" => Ok(ContainerAction::Rebuild),
            other => Err(format!("unknown container action: {}", other)),
        }
    }
}
