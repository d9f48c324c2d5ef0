use crate::application_port::{ErrorCode, UpstreamError};
use crate::domain_model::CartLineId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartAction {
    Increment,
    Decrement,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOperation {
    pub id: CartLineId,
    pub action: CartAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub id: CartLineId,
    pub success: bool,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub success: bool,
    pub results: Vec<BatchItemResult>,
    pub success_count: usize,
    pub failed_count: usize,
}

impl BatchReport {
    pub fn from_results(results: Vec<BatchItemResult>) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        let failed_count = results.len() - success_count;
        Self {
            success: success_count > 0,
            results,
            success_count,
            failed_count,
        }
    }

    /// True when any operation was refused because the access token is no
    /// longer accepted upstream.
    pub fn auth_expired(&self) -> bool {
        self.results.iter().any(|r| r.code == Some(ErrorCode::AuthExpired))
    }
}

/// What happened to a single dispatched cart mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    Failed(UpstreamError),
    /// Rejected locally without a network call (e.g. decrement at quantity one).
    Skipped,
    /// Another mutation on the same line is still in flight.
    Busy,
    /// The store was closed before the backend answered.
    Cancelled,
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied)
    }
}
