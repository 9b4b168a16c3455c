//! Node contract.
//!
//! A node is constructed by a factory from a [`NodeInit`], then driven on its
//! own thread by the scheduler:
//!
//! ```text
//! start(io) ─► step(io) ─► step(io) ─► ... ─► stop(io)
//!                  ▲  events are delivered between steps
//! ```
//!
//! Nodes only see the rest of the pipeline through their [`NodeIo`]: the
//! input and output pipe ends, the shared cancellation flag and the latency
//! budget used for every bounded wait.

use crate::config::{DEFAULT_LATENCY_MS, LATENCY_PARAM, STOP_ON_EXIT_PARAM};
use crate::error::Result;
use crate::frame::Frame;
use crate::params::{ParamValue, Parameter, ParameterSet};
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::pipe::{PipeReader, PipeWriter, PushOutcome};
use crossbeam_channel::{Select, Sender};
use std::time::Duration;

/// What the scheduler should do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// The node is done; it will be stopped and its outputs closed.
    Finished,
}

/// Notifications sent by node threads to whoever owns them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Started { name: String },
    Finished { name: String, failed: bool },
}

/// Handle to the owner of a node: its notification channel and the
/// pipeline-wide cancellation flag.
#[derive(Debug, Clone)]
pub struct ParentHandle {
    events: Option<Sender<NodeEvent>>,
    cancel: CancellationToken,
}

impl ParentHandle {
    pub fn new(events: Sender<NodeEvent>, cancel: CancellationToken) -> Self {
        Self {
            events: Some(events),
            cancel,
        }
    }

    /// Parent with no notification channel.
    pub fn detached(cancel: CancellationToken) -> Self {
        Self {
            events: None,
            cancel,
        }
    }

    pub fn notify(&self, event: NodeEvent) {
        if let Some(tx) = &self.events {
            // The owner may already be gone during teardown.
            let _ = tx.send(event);
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Ask the whole pipeline to stop.
    pub fn request_pipeline_stop(&self) -> bool {
        self.cancel.request()
    }
}

/// Everything a factory gets to build a node.
#[derive(Debug, Clone)]
pub struct NodeInit {
    pub name: String,
    pub class: String,
    /// Log sink: events recorded inside this span are attributed to the node.
    pub span: tracing::Span,
    pub parent: ParentHandle,
    pub params: ParameterSet,
}

impl NodeInit {
    pub fn new(
        name: impl Into<String>,
        class: impl Into<String>,
        parent: ParentHandle,
        params: ParameterSet,
    ) -> Self {
        let name = name.into();
        let class = class.into();
        let span = tracing::info_span!("node", name = %name, class = %class);
        Self {
            name,
            class,
            span,
            parent,
            params,
        }
    }
}

/// A unit of pipeline work running on its own thread.
pub trait Node: Send {
    /// React to one configuration value. Unknown names return `false`.
    fn set_param(&mut self, _param: &Parameter) -> bool {
        false
    }

    /// Called once on the node thread before the first step.
    fn start(&mut self, _io: &mut NodeIo) -> Result<()> {
        Ok(())
    }

    /// One scheduling unit. Must not block longer than `io.latency()` at a time.
    fn step(&mut self, io: &mut NodeIo) -> Result<StepOutcome>;

    /// Called once on the node thread after the last step.
    fn stop(&mut self, _io: &mut NodeIo) {}

    /// Handle a control message. Unhandled events fall back to `set_param`.
    fn process_event(&mut self, _name: &str, _value: &ParamValue) -> bool {
        false
    }
}

impl std::fmt::Debug for dyn Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Node")
    }
}

/// Pipe ends and runtime services of one node.
pub struct NodeIo {
    name: String,
    inputs: Vec<Option<PipeReader>>,
    outputs: Vec<Option<PipeWriter>>,
    cancel: CancellationToken,
    latency: Duration,
    next_input: usize,
}

impl NodeIo {
    pub fn new(name: impl Into<String>, cancel: CancellationToken, latency: Duration) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            cancel,
            latency: latency.max(Duration::from_millis(1)),
            next_input: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a reader to input `index`, growing the port list as needed.
    pub fn connect_input(&mut self, index: usize, reader: PipeReader) {
        if self.inputs.len() <= index {
            self.inputs.resize_with(index + 1, || None);
        }
        self.inputs[index] = Some(reader);
    }

    /// Attach a writer to output `index`, growing the port list as needed.
    pub fn connect_output(&mut self, index: usize, writer: PipeWriter) {
        if self.outputs.len() <= index {
            self.outputs.resize_with(index + 1, || None);
        }
        self.outputs[index] = Some(writer);
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn has_inputs(&self) -> bool {
        self.inputs.iter().any(Option::is_some)
    }

    pub fn is_input_connected(&self, index: usize) -> bool {
        matches!(self.inputs.get(index), Some(Some(_)))
    }

    pub fn is_output_connected(&self, index: usize) -> bool {
        matches!(self.outputs.get(index), Some(Some(_)))
    }

    /// Every connected input is closed and drained.
    pub fn all_inputs_closed(&self) -> bool {
        self.has_inputs() && self.inputs.iter().flatten().all(PipeReader::is_closed)
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn set_latency(&mut self, latency: Duration) {
        self.latency = latency.max(Duration::from_millis(1));
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Ask the whole pipeline to stop.
    pub fn request_pipeline_stop(&self) -> bool {
        self.cancel.request()
    }

    // ── Input ──

    /// Non-blocking pop from input `index`.
    pub fn pop(&mut self, index: usize) -> Option<Frame> {
        self.inputs.get(index)?.as_ref()?.pop()
    }

    /// Pop from `index`, waiting at most one latency period.
    ///
    /// An unconnected port sleeps out the period instead of spinning.
    pub fn pop_wait(&mut self, index: usize) -> Option<Frame> {
        if let Some(frame) = self.pop(index) {
            return Some(frame);
        }
        match self.inputs.get(index) {
            Some(Some(reader)) => reader.pop_timeout(self.latency),
            _ => {
                self.sleep(self.latency);
                None
            }
        }
    }

    /// Non-blocking pop from any input, rotating the starting port.
    pub fn pop_any(&mut self) -> Option<(usize, Frame)> {
        let n = self.inputs.len();
        for offset in 0..n {
            let index = (self.next_input + offset) % n;
            if let Some(frame) = self.pop(index) {
                self.next_input = (index + 1) % n;
                return Some((index, frame));
            }
        }
        None
    }

    /// Block until some open input has a frame or `timeout` elapses.
    ///
    /// With no open input this sleeps for `timeout`, waking on cancellation.
    pub fn wait_for_input(&self, timeout: Duration) -> bool {
        let open: Vec<&PipeReader> = self
            .inputs
            .iter()
            .flatten()
            .filter(|r| !r.is_closed())
            .collect();
        if open.is_empty() {
            self.cancel.sleep(timeout, self.latency);
            return false;
        }
        if open.iter().any(|r| !r.is_empty()) {
            return true;
        }
        let mut select = Select::new();
        for reader in &open {
            select.recv(reader.receiver());
        }
        select.ready_timeout(timeout).is_ok()
    }

    // ── Output ──

    /// Push to output `index`. Returns `false` if the output is unconnected or
    /// the frame was not delivered.
    pub fn push(&mut self, index: usize, frame: Frame) -> bool {
        match self.outputs.get(index) {
            Some(Some(writer)) => {
                let outcome = writer.push(frame, &self.cancel, self.latency);
                matches!(outcome, PushOutcome::Delivered { .. })
            }
            _ => false,
        }
    }

    /// Output `index` is connected but every reader behind it has detached.
    pub fn is_output_closed(&self, index: usize) -> bool {
        match self.outputs.get(index) {
            Some(Some(writer)) => writer.pipe().reader_count() == 0,
            _ => false,
        }
    }

    /// Push the same frame to every connected output. Returns the delivery count.
    pub fn push_all(&mut self, frame: Frame) -> usize {
        let mut delivered = 0;
        for writer in self.outputs.iter().flatten() {
            if writer.push(frame.clone(), &self.cancel, self.latency).is_delivered() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Close every output now instead of at teardown.
    pub fn close_outputs(&mut self) {
        self.outputs.iter_mut().for_each(|o| *o = None);
    }

    /// Sleep up to `duration`, waking at latency boundaries to check cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        self.cancel.sleep(duration, self.latency)
    }
}

impl std::fmt::Debug for NodeIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIo")
            .field("name", &self.name)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("latency", &self.latency)
            .finish()
    }
}

/// Parameters understood by every node type. They are applied by the
/// scheduler, so node implementations never have to handle them.
pub fn base_params() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.define(
        LATENCY_PARAM,
        DEFAULT_LATENCY_MS as i64,
        "Longest wait in milliseconds before re-checking for cancellation",
    )
    .define(
        STOP_ON_EXIT_PARAM,
        false,
        "Stop the whole pipeline when this node finishes",
    );
    p
}

// ==================== Single-in / single-out adapter ====================

/// A frame-to-frame transform with one input and one output.
pub trait IoFilter: Send {
    fn set_param(&mut self, _param: &Parameter) -> bool {
        false
    }

    /// Transform one frame. `None` drops it.
    fn process(&mut self, frame: Frame) -> Result<Option<Frame>>;

    fn process_event(&mut self, _name: &str, _value: &ParamValue) -> bool {
        false
    }
}

/// Runs an [`IoFilter`] as a [`Node`]: pop input 0, transform, push output 0.
pub struct FilterNode<T> {
    filter: T,
}

impl<T: IoFilter> FilterNode<T> {
    pub fn new(filter: T) -> Self {
        Self { filter }
    }

    pub fn inner(&self) -> &T {
        &self.filter
    }
}

impl<T: IoFilter> Node for FilterNode<T> {
    fn set_param(&mut self, param: &Parameter) -> bool {
        self.filter.set_param(param)
    }

    fn step(&mut self, io: &mut NodeIo) -> Result<StepOutcome> {
        let Some(frame) = io.pop_wait(0) else {
            return Ok(StepOutcome::Continue);
        };
        if let Some(out) = self.filter.process(frame)? {
            io.push(0, out);
        }
        Ok(StepOutcome::Continue)
    }

    fn process_event(&mut self, name: &str, value: &ParamValue) -> bool {
        self.filter.process_event(name, value)
    }
}
