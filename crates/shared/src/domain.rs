use serde::{Deserialize, Serialize};

/// Kind of a status event pushed by the platform for a tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusAction {
    Received,
    Added,
    Changed,
    Process,
    Result,
    Error,
}

impl StatusAction {
    /// RESULT and ERROR report an outcome; everything else is progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Result | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Added => "ADDED",
            Self::Changed => "CHANGED",
            Self::Process => "PROCESS",
            Self::Result => "RESULT",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for StatusAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asynchronous plan lifecycle operations exposed by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOperation {
    Deploy,
    Undeploy,
    UndeployWithId,
}

impl PlanOperation {
    pub fn operation_name(self) -> &'static str {
        match self {
            Self::Deploy => "deployPlanAsync",
            Self::Undeploy => "undeployPlanAsync",
            Self::UndeployWithId => "undeployPlanWithIdAsync",
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Self::Deploy => "deployment",
            Self::Undeploy | Self::UndeployWithId => "undeployment",
        }
    }
}
