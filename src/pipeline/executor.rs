//! Pipeline executor: a built graph of node threads and the pipes between them.
//!
//! There is no central tick loop. Every node runs on its own thread; the
//! executor only decides start order, watches completion events and tears
//! the graph down.
//!
//! 1. Start nodes in reverse topological order (consumers first).
//! 2. Wait for every node to finish, or for cancellation.
//! 3. Join every thread.

use crate::error::Result;
use crate::params::ParamValue;
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::context::RegistryContext;
use crate::pipeline::node::NodeEvent;
use crate::pipeline::pipe::{Pipe, PipeStats};
use crate::pipeline::scheduler::{NodeState, NodeThread};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const EVENT_POLL: Duration = Duration::from_millis(100);

/// A directed connection between two nodes, by index into the node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from_node: usize,
    pub to_node: usize,
}

/// How a run ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cancelled: bool,
    pub finished: Vec<String>,
    pub failed: Vec<String>,
}

/// A runnable graph of nodes.
pub struct Pipeline {
    name: String,
    nodes: Vec<NodeThread>,
    edges: Vec<Edge>,
    pipes: Vec<Pipe>,
    cancel: CancellationToken,
    events: Receiver<NodeEvent>,
    stop_on_node_failure: bool,
    started: bool,
    // Dropped after the nodes, which may run code from loaded modules.
    _context: Arc<RegistryContext>,
}

impl Pipeline {
    pub fn new(
        name: impl Into<String>,
        context: Arc<RegistryContext>,
        cancel: CancellationToken,
        events: Receiver<NodeEvent>,
    ) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            pipes: Vec::new(),
            cancel,
            events,
            stop_on_node_failure: false,
            started: false,
            _context: context,
        }
    }

    // ── Graph building ──

    /// Add a node thread. Returns its index.
    pub fn add_node(&mut self, node: NodeThread) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn add_edge(&mut self, from_node: usize, to_node: usize) {
        self.edges.push(Edge { from_node, to_node });
    }

    pub fn add_pipe(&mut self, pipe: Pipe) {
        self.pipes.push(pipe);
    }

    /// Escalate any node failure to pipeline-wide cancellation.
    pub fn set_stop_on_node_failure(&mut self, enabled: bool) {
        self.stop_on_node_failure = enabled;
    }

    // ── Introspection ──

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(NodeThread::name).collect()
    }

    pub fn node_states(&self) -> Vec<(String, NodeState)> {
        self.nodes
            .iter()
            .map(|n| (n.name().to_string(), n.state()))
            .collect()
    }

    pub fn node_state(&self, name: &str) -> Option<NodeState> {
        self.nodes.iter().find(|n| n.name() == name).map(NodeThread::state)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn pipes(&self) -> &[Pipe] {
        &self.pipes
    }

    pub fn pipe_stats(&self) -> Vec<(String, PipeStats)> {
        self.pipes
            .iter()
            .map(|p| (p.name().to_string(), p.stats()))
            .collect()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Queue a control message for one node.
    pub fn send_event(&self, node: &str, name: &str, value: impl Into<ParamValue>) -> bool {
        self.nodes
            .iter()
            .find(|n| n.name() == node)
            .is_some_and(|n| n.send_event(name, value))
    }

    // ── Execution ──

    /// Start order: consumers before producers, so no frame is pushed into
    /// a pipe nobody is draining yet.
    pub fn start_order(&self) -> Vec<usize> {
        let n = self.nodes.len();
        let mut in_degree = vec![0u32; n];
        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];

        for edge in &self.edges {
            if edge.from_node < n && edge.to_node < n {
                adj[edge.from_node].push(edge.to_node);
                in_degree[edge.to_node] += 1;
            }
        }

        // Kahn's algorithm
        let mut queue: Vec<usize> = (0..n).rev().filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(node) = queue.pop() {
            order.push(node);
            for &next in adj[node].iter().rev() {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push(next);
                }
            }
        }

        if order.len() != n {
            tracing::warn!(
                "Pipeline graph has a cycle! Only {} of {} nodes ordered.",
                order.len(),
                n
            );
            let seen: HashSet<usize> = order.iter().copied().collect();
            order.extend((0..n).filter(|i| !seen.contains(i)));
        }

        order.reverse();
        order
    }

    /// Spawn every node thread. On failure the already started ones are stopped.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        tracing::info!("Starting pipeline '{}' ({} nodes)", self.name, self.nodes.len());

        for index in self.start_order() {
            if let Err(e) = self.nodes[index].start() {
                tracing::error!("Failed to start node '{}': {}", self.nodes[index].name(), e);
                self.request_end();
                self.join();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Block until every node finished or cancellation was requested.
    pub fn wait(&mut self) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut remaining: HashSet<String> = self
            .nodes
            .iter()
            .filter(|n| !n.is_finished())
            .map(|n| n.name().to_string())
            .collect();

        while !remaining.is_empty() {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            match self.events.recv_timeout(EVENT_POLL) {
                Ok(NodeEvent::Finished { name, failed }) => {
                    remaining.remove(&name);
                    if failed {
                        summary.failed.push(name.clone());
                        if self.stop_on_node_failure {
                            tracing::warn!("Node '{}' failed, stopping pipeline", name);
                            self.request_end();
                        }
                    }
                    summary.finished.push(name);
                }
                Ok(NodeEvent::Started { .. }) => {}
                Err(RecvTimeoutError::Timeout) => {
                    // Nodes that died without reporting.
                    remaining.retain(|name| {
                        self.nodes
                            .iter()
                            .find(|n| n.name() == name)
                            .is_some_and(|n| !n.is_finished())
                    });
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.join();

        // Events that raced with cancellation.
        for event in self.events.try_iter() {
            if let NodeEvent::Finished { name, failed } = event {
                if failed && !summary.failed.contains(&name) {
                    summary.failed.push(name.clone());
                }
                if !summary.finished.contains(&name) {
                    summary.finished.push(name);
                }
            }
        }
        summary
    }

    /// Start, wait, stop, join.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.start()?;
        let summary = self.wait();
        tracing::info!(
            "Pipeline '{}' ended: {} finished, {} failed{}",
            self.name,
            summary.finished.len(),
            summary.failed.len(),
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        Ok(summary)
    }

    /// Request cancellation of the whole pipeline. Idempotent.
    ///
    /// The token is shared with the builder that made this pipeline, so its
    /// sibling pipelines end too.
    pub fn request_end(&self) {
        if self.cancel.request() {
            tracing::info!("End of pipeline '{}' requested", self.name);
        }
    }

    /// Join every node thread.
    pub fn join(&mut self) {
        for node in &mut self.nodes {
            node.join();
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.started && self.nodes.iter().any(|n| !n.is_finished()) {
            self.request_end();
        }
        self.join();
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("nodes", &self.node_names())
            .field("edges", &self.edges)
            .finish()
    }
}
