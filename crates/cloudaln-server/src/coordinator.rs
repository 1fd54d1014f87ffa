//! Fleet coordinator.
//!
//! Spawns one pipeline per node. Each pipeline provisions its node, runs the
//! workload for its shards, destroys the node and merges its exit status into
//! the shared [`FleetState`]. A supervisor loop watches the pipelines; on a
//! provisioning failure, a pipeline panic or an interrupt it cancels the
//! remaining runs and sweeps every node still registered as active.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use cloudaln_core::{clamp_node_count, shards_for_node, CoreError, NodeStage, RunRequest};
use cloudaln_machine::NodeLifecycle;

use crate::error::ServerError;
use crate::script::WorkloadBuilder;
use crate::state::FleetState;

/// Exit status after a pipeline panicked.
pub const ABORTED_STATUS: i32 = 1;

/// Exit status after an interrupt.
pub const INTERRUPTED_STATUS: i32 = 130;

/// How a fleet run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FleetResult {
    /// Every pipeline finished. `status` is the aggregate exit status.
    Completed { status: i32 },

    /// A node failed to provision. `status` is the fleet tool's exit code.
    ProvisionFailed { status: i32 },

    /// A pipeline panicked or the run was interrupted.
    Aborted { status: i32 },
}

impl FleetResult {
    /// Process exit status for this result.
    pub fn exit_status(&self) -> i32 {
        match self {
            Self::Completed { status }
            | Self::ProvisionFailed { status }
            | Self::Aborted { status } => *status,
        }
    }
}

/// How a single pipeline ended.
#[derive(Debug)]
enum PipelineEnd {
    /// Ran, destroyed, and merged its status.
    Finished,
    /// Provisioning failed with this code.
    ProvisionFailed(i32),
    /// Destroyed without merging because the run was stopped.
    Stopped,
}

/// Drives a fleet from provisioning to teardown.
pub struct Coordinator {
    lifecycle: Arc<dyn NodeLifecycle>,
    workload: Arc<dyn WorkloadBuilder>,
    image: String,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(
        lifecycle: Arc<dyn NodeLifecycle>,
        workload: Arc<dyn WorkloadBuilder>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            lifecycle,
            workload,
            image: image.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that interrupts the run when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `shard_count` shards on up to `requested_nodes` nodes.
    ///
    /// Returns once every pipeline has ended and no node is left behind.
    pub async fn run(
        &self,
        requested_nodes: usize,
        shard_count: usize,
    ) -> Result<FleetResult, ServerError> {
        if shard_count == 0 {
            return Err(CoreError::InvalidInput("no read shards given".into()).into());
        }

        let node_count = clamp_node_count(requested_nodes, shard_count);
        if node_count < requested_nodes {
            info!(
                requested = requested_nodes,
                node_count, "Clamping node count to shard count"
            );
        }

        let state = FleetState::new(node_count);
        let stop = self.cancel.child_token();

        info!(node_count, shard_count, image = %self.image, "Starting fleet");

        let mut pipelines = JoinSet::new();
        for index in 0..node_count {
            let pipeline = Pipeline {
                index,
                shards: shards_for_node(shard_count, node_count, index),
                lifecycle: self.lifecycle.clone(),
                workload: self.workload.clone(),
                image: self.image.clone(),
                state: state.clone(),
                stop: stop.clone(),
            };
            pipelines.spawn(pipeline.run().instrument(info_span!("node", index)));
        }

        let mut failure: Option<FleetResult> = None;
        loop {
            tokio::select! {
                joined = pipelines.join_next() => {
                    match joined {
                        Some(Ok(PipelineEnd::ProvisionFailed(status))) => {
                            if failure.is_none() {
                                error!(status, "Provisioning failed, stopping fleet");
                                failure = Some(FleetResult::ProvisionFailed { status });
                            }
                            stop.cancel();
                        }
                        Some(Ok(PipelineEnd::Finished | PipelineEnd::Stopped)) => {}
                        Some(Err(e)) => {
                            error!(error = %e, "Pipeline aborted, stopping fleet");
                            if failure.is_none() {
                                failure = Some(FleetResult::Aborted {
                                    status: ABORTED_STATUS,
                                });
                            }
                            stop.cancel();
                        }
                        None => break,
                    }
                }
                _ = self.cancel.cancelled(), if failure.is_none() => {
                    warn!("Interrupted, stopping fleet");
                    failure = Some(FleetResult::Aborted {
                        status: INTERRUPTED_STATUS,
                    });
                }
            }
        }

        if failure.is_none() && self.cancel.is_cancelled() {
            failure = Some(FleetResult::Aborted {
                status: INTERRUPTED_STATUS,
            });
        }

        self.sweep(&state).await;

        let result = match failure {
            Some(result) => result,
            None => FleetResult::Completed {
                status: state.aggregate().await,
            },
        };
        if !state.is_complete() {
            warn!(
                completed = state.completed(),
                node_count,
                "Fleet stopped before every node finished"
            );
        }
        info!(
            completed = state.completed(),
            status = result.exit_status(),
            "Fleet finished"
        );
        Ok(result)
    }

    /// Destroy every node still registered as active.
    async fn sweep(&self, state: &FleetState) {
        let leftovers = state.active_stages().await;
        if leftovers.is_empty() {
            return;
        }

        warn!(count = leftovers.len(), "Destroying leftover nodes");
        for (node, stage) in &leftovers {
            warn!(node = %node, stage = ?stage, "Node left behind by its pipeline");
        }

        let statuses =
            join_all(leftovers.iter().map(|(node, _)| self.lifecycle.destroy(node))).await;
        for ((node, _), status) in leftovers.iter().zip(statuses) {
            if status != 0 {
                warn!(node = %node, status, "Failed to destroy leftover node");
            }
            state.deregister(node).await;
        }
    }
}

/// Everything one node's pipeline needs.
struct Pipeline {
    index: usize,
    shards: Vec<usize>,
    lifecycle: Arc<dyn NodeLifecycle>,
    workload: Arc<dyn WorkloadBuilder>,
    image: String,
    state: Arc<FleetState>,
    stop: CancellationToken,
}

impl Pipeline {
    async fn run(self) -> PipelineEnd {
        let node = match self.lifecycle.provision().await {
            Ok(node) => node,
            Err(e) => {
                error!(node = %e.node(), error = %e, "Provisioning failed");
                self.state.set_stage(self.index, NodeStage::Failed).await;
                return PipelineEnd::ProvisionFailed(e.exit_code());
            }
        };
        self.state.register(node.id().clone(), self.index).await;
        info!(
            node = %node.id(),
            endpoint = %node.endpoint(),
            shards = ?self.shards,
            "Node provisioned"
        );

        let run_status = if self.stop.is_cancelled() {
            None
        } else {
            self.state.set_stage(self.index, NodeStage::Running).await;
            let cmd = self.workload.build(&self.shards, &node);
            let request = RunRequest::new(self.image.clone(), cmd);
            tokio::select! {
                outcome = self.lifecycle.run(&node, &request) => {
                    let status = outcome.exit_status();
                    if outcome.is_success() {
                        info!(node = %node.id(), "Workload succeeded");
                    } else {
                        error!(node = %node.id(), status, "Workload failed");
                    }
                    Some(status)
                }
                _ = self.stop.cancelled() => None,
            }
        };
        if run_status.is_none() {
            warn!(node = %node.id(), "Fleet stopping, skipping workload");
        }

        self.state.set_stage(self.index, NodeStage::Destroying).await;
        let destroy_status = self.lifecycle.destroy(node.id()).await;
        if destroy_status != 0 {
            warn!(node = %node.id(), status = destroy_status, "Failed to destroy node");
        }
        self.state.deregister(node.id()).await;
        self.state.set_stage(self.index, NodeStage::Done).await;

        match run_status {
            Some(run_status) => {
                let completed = self.state.complete(run_status, destroy_status).await;
                let lifetime = Utc::now() - node.provisioned_at();
                info!(
                    node = %node.id(),
                    completed,
                    total = self.state.node_count(),
                    lifetime_secs = lifetime.num_seconds(),
                    "Node finished"
                );
                PipelineEnd::Finished
            }
            None => PipelineEnd::Stopped,
        }
    }
}
