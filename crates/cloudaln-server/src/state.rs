//! Shared fleet run state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use cloudaln_core::{NodeId, NodeStage};

/// Combine one node's run and destroy statuses. The run status wins unless
/// it is zero.
pub fn combine_status(run_status: i32, destroy_status: i32) -> i32 {
    if run_status != 0 {
        run_status
    } else {
        destroy_status
    }
}

/// State shared by every pipeline of one fleet run.
///
/// Lives only as long as the run; nothing here is persisted.
pub struct FleetState {
    /// Number of pipelines in the run.
    node_count: usize,

    /// Nodes provisioned and not yet destroyed, with their pipeline index.
    active: Mutex<HashMap<NodeId, usize>>,

    /// Stage of each pipeline, by node index.
    stages: Mutex<HashMap<usize, NodeStage>>,

    /// Pipelines that finished and merged their status.
    completed: AtomicUsize,

    /// Aggregate exit status.
    aggregate: Mutex<i32>,
}

impl FleetState {
    /// Create state for a run of `node_count` pipelines.
    pub fn new(node_count: usize) -> Arc<Self> {
        Arc::new(Self {
            node_count,
            active: Mutex::new(HashMap::new()),
            stages: Mutex::new(HashMap::new()),
            completed: AtomicUsize::new(0),
            aggregate: Mutex::new(0),
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Record a node freshly provisioned by pipeline `index` so cleanup can
    /// reach it.
    pub async fn register(&self, node: NodeId, index: usize) {
        self.active.lock().await.insert(node, index);
    }

    /// Forget a destroyed node. Returns false if it was not registered.
    pub async fn deregister(&self, node: &NodeId) -> bool {
        self.active.lock().await.remove(node).is_some()
    }

    /// Nodes currently registered, sorted.
    pub async fn active_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.active.lock().await.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    /// Registered nodes with the stage their pipeline last reached, sorted.
    pub async fn active_stages(&self) -> Vec<(NodeId, Option<NodeStage>)> {
        let active: Vec<(NodeId, usize)> = self
            .active
            .lock()
            .await
            .iter()
            .map(|(node, index)| (node.clone(), *index))
            .collect();

        let stages = self.stages.lock().await;
        let mut nodes: Vec<(NodeId, Option<NodeStage>)> = active
            .into_iter()
            .map(|(node, index)| (node, stages.get(&index).copied()))
            .collect();
        nodes.sort_by(|a, b| a.0.cmp(&b.0));
        nodes
    }

    /// Move pipeline `index` to `stage`. Illegal transitions are logged and
    /// ignored.
    pub async fn set_stage(&self, index: usize, stage: NodeStage) {
        let mut stages = self.stages.lock().await;
        let current = stages.entry(index).or_default();
        if *current == stage {
            return;
        }
        match current.transition(stage) {
            Ok(next) => *current = next,
            Err(e) => warn!(node_index = index, error = %e, "Ignoring stage change"),
        }
    }

    /// Current stage of pipeline `index`.
    pub async fn stage(&self, index: usize) -> Option<NodeStage> {
        self.stages.lock().await.get(&index).copied()
    }

    /// Merge a finished pipeline's statuses and count it as completed.
    ///
    /// A zero status never overwrites a non-zero aggregate, so the aggregate
    /// is zero only if every node succeeded. Returns the completed count.
    pub async fn complete(&self, run_status: i32, destroy_status: i32) -> usize {
        let status = combine_status(run_status, destroy_status);
        {
            let mut aggregate = self.aggregate.lock().await;
            if status != 0 {
                *aggregate = status;
            }
        }
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of completed pipelines.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns true once every pipeline has completed.
    pub fn is_complete(&self) -> bool {
        self.completed() >= self.node_count
    }

    /// Aggregate exit status so far.
    pub async fn aggregate(&self) -> i32 {
        *self.aggregate.lock().await
    }
}
