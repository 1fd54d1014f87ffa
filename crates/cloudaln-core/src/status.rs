//! Stage enums for node pipelines and container runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Stage of the container run protocol.
///
/// Stages run strictly in declaration order; a failure in any stage ends the
/// run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStage {
    /// Pulling the image onto the node.
    Pulling,
    /// Creating the container from the image and command.
    Creating,
    /// Starting the created container.
    Starting,
    /// Blocking until the container terminates.
    Waiting,
}

impl RunStage {
    /// All stages in execution order.
    pub const ALL: [RunStage; 4] = [
        RunStage::Pulling,
        RunStage::Creating,
        RunStage::Starting,
        RunStage::Waiting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pulling => "pull",
            Self::Creating => "create",
            Self::Starting => "start",
            Self::Waiting => "wait",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage of one node pipeline in the fleet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStage {
    /// Node is being created and described.
    #[default]
    Provisioning,
    /// Workload container is running on the node.
    Running,
    /// Node is being removed.
    Destroying,
    /// Node removed, results merged.
    Done,
    /// Provisioning failed; the whole fleet aborts.
    Failed,
}

impl NodeStage {
    /// Returns true if the pipeline is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Check whether moving to `to` is a legal transition.
    ///
    /// `Provisioning -> Destroying` covers a node that finished provisioning
    /// after the fleet was cancelled and is torn down without running.
    pub fn can_transition_to(&self, to: NodeStage) -> bool {
        matches!(
            (self, to),
            (Self::Provisioning, Self::Running)
                | (Self::Provisioning, Self::Destroying)
                | (Self::Provisioning, Self::Failed)
                | (Self::Running, Self::Destroying)
                | (Self::Destroying, Self::Done)
        )
    }

    /// Move to `to`, rejecting illegal transitions.
    pub fn transition(self, to: NodeStage) -> Result<NodeStage, CoreError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(CoreError::InvalidStateTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl fmt::Display for NodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Destroying => "destroying",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}
