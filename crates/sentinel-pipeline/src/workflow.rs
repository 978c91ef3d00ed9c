//! Workflow graph engine — one ordered pass over typed nodes.
//!
//! Node i runs while nodes before it are Completed and nodes after it Idle.
//! Each transition (i done, i+1 running) is published as a single
//! `NodeProgress`, so observers never see zero or two Running nodes.

use crate::metric::MetricComputer;
use chrono::Utc;
use sentinel_core::{
    ImageryItem, KernelConfig, NodeStatus, NodeType, SearchConfig, TrendPoint, WorkflowNode,
    WorkflowRun,
};
use sentinel_registry::{MODE_EXTRACT, VEG_MASK};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Kernel id used by metric nodes without a linked kernel.
pub const DEFAULT_KERNEL: &str = "default";

#[derive(Clone, Debug, PartialEq)]
pub struct WorkflowDefinition {
    pub name: String,
    pub nodes: Vec<WorkflowNode>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, nodes: Vec<WorkflowNode>) -> Self {
        Self {
            name: name.into(),
            nodes,
        }
    }

    /// Input → vegetation mask → histogram mode → Output.
    pub fn standard(name: impl Into<String>) -> Self {
        Self::new(
            name,
            vec![
                WorkflowNode::new("node_input", "Imagery Input", NodeType::Input),
                WorkflowNode::new("node_process", "Vegetation Extraction", NodeType::Process)
                    .with_kernel(VEG_MASK),
                WorkflowNode::new("node_analysis", "Mode Statistics", NodeType::Analysis)
                    .with_kernel(MODE_EXTRACT),
                WorkflowNode::new("node_output", "Result Output", NodeType::Output),
            ],
        )
    }

    /// Insert a Process node ahead of the final stage.
    pub fn insert_process_node(
        &mut self,
        label: impl Into<String>,
        kernel: Option<&str>,
    ) -> &WorkflowNode {
        let id = format!("node_proc_{}", uuid::Uuid::new_v4().simple());
        let mut node = WorkflowNode::new(id, label, NodeType::Process);
        if let Some(k) = kernel {
            node = node.with_kernel(k);
        }
        let at = self.nodes.len().saturating_sub(1);
        self.nodes.insert(at, node);
        &self.nodes[at]
    }

    /// Direct the final Output node to also write the run snapshot to `path`.
    /// No-op when the definition has no Output node.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        let output = self.nodes.iter_mut().rev().find(|n| n.node_type == NodeType::Output);
        if let Some(node) = output {
            node.output_path = Some(path.into());
        }
        self
    }

    /// Snapshot destination of the last Output node, if it has one.
    pub fn output_path(&self) -> Option<&Path> {
        self.nodes
            .iter()
            .rev()
            .find(|n| n.node_type == NodeType::Output)
            .and_then(|n| n.output_path.as_deref())
    }

    /// Linked kernel ids in node order.
    pub fn linked_kernels(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(|n| n.linked_kernel.as_deref())
    }

    pub fn labels(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.label.clone()).collect()
    }
}

/// Node statuses of one run at one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeProgress {
    pub run_id: String,
    pub statuses: Vec<NodeStatus>,
}

impl NodeProgress {
    pub fn running(&self) -> usize {
        self.statuses.iter().filter(|s| **s == NodeStatus::Running).count()
    }

    /// Completed prefix, at most one Running, Idle suffix.
    pub fn is_well_ordered(&self) -> bool {
        let done = self.statuses.iter().take_while(|s| **s == NodeStatus::Completed).count();
        let rest = &self.statuses[done..];
        match rest.split_first() {
            None => true,
            Some((first, tail)) => {
                *first == NodeStatus::Running && tail.iter().all(|s| *s == NodeStatus::Idle)
            }
        }
    }
}

/// Snapshot context captured by the caller before the pass starts.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub run_id: String,
    pub workflow_name: String,
    pub search_config: SearchConfig,
    pub kernel_config: KernelConfig,
}

pub struct WorkflowEngine {
    metric: Arc<dyn MetricComputer>,
    settle: Duration,
    per_item: Duration,
    observers: Mutex<Vec<mpsc::UnboundedSender<NodeProgress>>>,
}

impl WorkflowEngine {
    pub fn new(metric: Arc<dyn MetricComputer>, settle: Duration, per_item: Duration) -> Self {
        Self {
            metric,
            settle,
            per_item,
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<NodeProgress> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(tx);
        }
        rx
    }

    /// Run every node once, in order, over the linked items.
    /// `on_node` is called with (completed, total) after each node.
    pub async fn execute<F>(
        &self,
        ctx: RunContext,
        definition: &WorkflowDefinition,
        items: &[ImageryItem],
        mut on_node: F,
    ) -> WorkflowRun
    where
        F: FnMut(usize, usize) + Send,
    {
        let linked: Vec<&ImageryItem> = items.iter().filter(|i| i.is_linked()).collect();
        let total = definition.nodes.len();
        let mut statuses = vec![NodeStatus::Idle; total];
        let mut results: HashMap<&str, f64> = HashMap::new();

        info!(run_id = %ctx.run_id, nodes = total, scenes = linked.len(), "workflow pass started");

        if let Some(first) = statuses.first_mut() {
            *first = NodeStatus::Running;
            self.publish(&ctx.run_id, &statuses);
        }

        for (i, node) in definition.nodes.iter().enumerate() {
            if node.node_type.computes_metrics() {
                let kernel = node.linked_kernel.as_deref().unwrap_or(DEFAULT_KERNEL);
                for item in &linked {
                    results.insert(item.id.as_str(), self.metric.compute(&item.id, kernel));
                    pause(self.per_item).await;
                }
                debug!(run_id = %ctx.run_id, node = %node.id, kernel, "metrics computed");
            } else {
                pause(self.settle).await;
            }

            statuses[i] = NodeStatus::Completed;
            if let Some(next) = statuses.get_mut(i + 1) {
                *next = NodeStatus::Running;
            }
            self.publish(&ctx.run_id, &statuses);
            on_node(i + 1, total);
        }

        let mut trend_series: Vec<TrendPoint> = linked
            .iter()
            .filter_map(|item| {
                results
                    .get(item.id.as_str())
                    .map(|value| TrendPoint {
                        date: item.date,
                        value: *value,
                    })
            })
            .collect();
        trend_series.sort_by_key(|p| p.date);

        info!(run_id = %ctx.run_id, points = trend_series.len(), "workflow pass finished");

        WorkflowRun {
            run_id: ctx.run_id,
            workflow_name: ctx.workflow_name,
            timestamp: Utc::now(),
            search_config: ctx.search_config,
            kernel_config: ctx.kernel_config,
            node_labels: definition.labels(),
            trend_series,
        }
    }

    fn publish(&self, run_id: &str, statuses: &[NodeStatus]) {
        let progress = NodeProgress {
            run_id: run_id.to_string(),
            statuses: statuses.to_vec(),
        };
        if let Ok(mut observers) = self.observers.lock() {
            observers.retain(|tx| tx.send(progress.clone()).is_ok());
        }
    }
}

async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}
