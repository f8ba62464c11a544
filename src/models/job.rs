//! Bulk LMS job wire models.

use serde::{Deserialize, Serialize};

use super::TargetId;

/// Opaque job identifier issued by the server.
pub type JobId = String;

/// Direction of a bulk LMS operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LmsOperation {
    /// Provision LMS accounts
    Create,
    /// Remove LMS accounts
    Delete,
}

impl LmsOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            LmsOperation::Create => "create",
            LmsOperation::Delete => "delete",
        }
    }
}

impl std::fmt::Display for LmsOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body selecting the targets of a bulk operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LmsSelectionRequest {
    pub target_ids: Vec<TargetId>,
}

/// Job status reported by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub progress: u8,
    #[serde(default)]
    pub errors: Vec<String>,
}
