//! Lifecycle contract shared by capabilities, handles and connection managers

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle verbs
///
/// Every verb defaults to a no-op so that objects only implement the phases
/// they care about.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// One-time initialisation
    async fn initialise(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start processing (background tasks, connections, ...)
    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stop processing; may be followed by another `start`
    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release every resource; the object is not used afterwards
    async fn dispose(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Lifecycle phase names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// `initialise`
    Initialise,
    /// `start`
    Start,
    /// `stop`
    Stop,
    /// `dispose`
    Dispose,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Initialise => write!(f, "initialise"),
            Phase::Start => write!(f, "start"),
            Phase::Stop => write!(f, "stop"),
            Phase::Dispose => write!(f, "dispose"),
        }
    }
}

/// Observed lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Created, no phase run yet
    Created,

    /// Initialised but not started
    Initialised,

    /// Started and running
    Started,

    /// Stopped
    Stopped,

    /// Disposed
    Disposed,

    /// A phase failed with an error
    Failed(String),
}

impl LifecycleState {
    /// State reached after `phase` succeeds
    pub fn after(phase: Phase) -> Self {
        match phase {
            Phase::Initialise => LifecycleState::Initialised,
            Phase::Start => LifecycleState::Started,
            Phase::Stop => LifecycleState::Stopped,
            Phase::Dispose => LifecycleState::Disposed,
        }
    }

    /// Check if started
    pub fn is_started(&self) -> bool {
        matches!(self, LifecycleState::Started)
    }

    /// Check if stopped
    pub fn is_stopped(&self) -> bool {
        matches!(self, LifecycleState::Stopped)
    }

    /// Check if disposed
    pub fn is_disposed(&self) -> bool {
        matches!(self, LifecycleState::Disposed)
    }

    /// Check if a phase failed
    pub fn is_failed(&self) -> bool {
        matches!(self, LifecycleState::Failed(_))
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Created => write!(f, "created"),
            LifecycleState::Initialised => write!(f, "initialised"),
            LifecycleState::Started => write!(f, "started"),
            LifecycleState::Stopped => write!(f, "stopped"),
            LifecycleState::Disposed => write!(f, "disposed"),
            LifecycleState::Failed(msg) => write!(f, "failed: {}", msg),
        }
    }
}
