//! Container run request and result types.

use serde::{Deserialize, Serialize};

/// Exit status reported when the container protocol did not complete.
///
/// Engine exit codes are never negative, so this never collides with a real
/// workload status. It means "unknown", not necessarily "failed".
pub const PROTOCOL_FAILURE: i32 = -1;

/// Request to run one container to completion.
///
/// Serializes to the engine's container specification (`{"Image", "Cmd"}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunRequest {
    /// Image reference, e.g. `statgen/alignment`.
    pub image: String,

    /// Command argument vector.
    pub cmd: Vec<String>,
}

impl RunRequest {
    /// Create a new RunRequest.
    pub fn new(image: impl Into<String>, cmd: Vec<String>) -> Self {
        Self {
            image: image.into(),
            cmd,
        }
    }
}

/// Result of running a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The workload terminated with this exit code.
    Exited(i32),
    /// Some protocol stage failed; the workload status is unknown.
    ProtocolFailure,
}

impl RunOutcome {
    /// Process-style exit status. The protocol failure maps to
    /// [`PROTOCOL_FAILURE`].
    pub fn exit_status(&self) -> i32 {
        match self {
            Self::Exited(code) => *code,
            Self::ProtocolFailure => PROTOCOL_FAILURE,
        }
    }

    /// Returns true if the workload ran and exited with 0.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }
}
