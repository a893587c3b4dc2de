//! REST route construction for the versioned API surface
//!
//! Every mutating request targets a route scoped by workspace/worker and,
//! where relevant, task or reservation sid. Each operation chooses an
//! [`ApiVersion`]; participant updates live on the newer surface while the
//! task and reservation routes remain on the legacy one.

/// API version a request is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    /// Legacy surface (task updates, transfers, reservations).
    V1,
    /// Current surface (participant updates).
    V2,
}

impl ApiVersion {
    /// Returns the version path segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds request targets from the worker's identity.
#[derive(Debug, Clone)]
pub struct Routes {
    workspace_sid: String,
    worker_sid: String,
}

impl Routes {
    /// Creates a route builder scoped to the given workspace and worker.
    pub fn new(workspace_sid: impl Into<String>, worker_sid: impl Into<String>) -> Self {
        Self {
            workspace_sid: workspace_sid.into(),
            worker_sid: worker_sid.into(),
        }
    }

    /// `Workspaces/{workspace}/Workers/{worker}`
    pub fn worker(&self) -> String {
        format!(
            "Workspaces/{}/Workers/{}",
            self.workspace_sid, self.worker_sid
        )
    }

    /// `Workspaces/{workspace}/Tasks/{task}`
    pub fn task(&self, task_sid: &str) -> String {
        format!("Workspaces/{}/Tasks/{}", self.workspace_sid, task_sid)
    }

    /// `Workspaces/{workspace}/Tasks/{task}/Transfers`
    pub fn task_transfers(&self, task_sid: &str) -> String {
        format!(
            "Workspaces/{}/Tasks/{}/Transfers",
            self.workspace_sid, task_sid
        )
    }

    /// `Workspaces/{workspace}/Tasks/{task}/Reservations/{reservation}`
    pub fn reservation(&self, task_sid: &str, reservation_sid: &str) -> String {
        format!(
            "Workspaces/{}/Tasks/{}/Reservations/{}",
            self.workspace_sid, task_sid, reservation_sid
        )
    }

    /// `Workspaces/{workspace}/Workers/{worker}/CustomerParticipant`
    pub fn customer_participant(&self) -> String {
        format!(
            "Workspaces/{}/Workers/{}/CustomerParticipant",
            self.workspace_sid, self.worker_sid
        )
    }
}
