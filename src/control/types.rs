use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::supervisor::SupervisorError;

/// Outcome of a start or stop request.
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ControlResult {
    pub success: bool,
    pub message: String,
}

impl<T: std::fmt::Display> From<Result<T, SupervisorError>> for ControlResult {
    fn from(res: Result<T, SupervisorError>) -> Self {
        match res {
            Ok(done) => Self {
                success: true,
                message: done.to_string(),
            },
            Err(e) => Self {
                success: false,
                message: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusBody {
    pub running: bool,
    /// Always 0: the receiver does not report a processed-event count.
    pub events: u64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogsQuery {
    /// One of `impinj`, `receiver`, `sender`, `startup`. Defaults to `receiver`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LogsBody {
    pub content: String,
}
