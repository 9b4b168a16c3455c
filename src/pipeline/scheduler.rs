//! Per-node thread and lifecycle.
//!
//! ```text
//! Created ─► Configured ─► Running ─► StopRequested ─► Finished
//! ```
//!
//! `Configured` is reached when the node has been built. [`NodeThread::start`]
//! spawns the thread and moves to `Running`. The loop checks cancellation and
//! drains the event mailbox only between steps, so a step is never
//! interrupted. Leaving the loop for any reason (cancellation, the node
//! reporting [`StepOutcome::Finished`], closed inputs, an error) goes through
//! `StopRequested`, runs `Node::stop`, drops the pipe ends and lands in
//! `Finished` exactly once.

use crate::error::{MediaFlowError, Result};
use crate::params::{ParamValue, Parameter};
use crate::pipeline::node::{Node, NodeEvent, NodeIo, ParentHandle, StepOutcome};
use crossbeam_channel::{Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum NodeState {
    Created = 0,
    Configured = 1,
    Running = 2,
    StopRequested = 3,
    Finished = 4,
}

impl NodeState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => NodeState::Created,
            1 => NodeState::Configured,
            2 => NodeState::Running,
            3 => NodeState::StopRequested,
            _ => NodeState::Finished,
        }
    }
}

/// Atomic cell readable from any thread.
#[derive(Debug, Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new(state: NodeState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    fn get(&self) -> NodeState {
        NodeState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: NodeState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Behavior of the scheduler around a node, taken from its base parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadOptions {
    /// Request pipeline-wide cancellation when the node finishes normally.
    pub stop_pipeline_on_exit: bool,
}

struct Runnable {
    node: Box<dyn Node>,
    io: NodeIo,
    events: Receiver<(String, ParamValue)>,
}

/// One node bound to its dedicated thread.
pub struct NodeThread {
    name: String,
    class: String,
    span: tracing::Span,
    parent: ParentHandle,
    options: ThreadOptions,
    state: StateCell,
    failed: Arc<AtomicBool>,
    events: Sender<(String, ParamValue)>,
    runnable: Option<Runnable>,
    handle: Option<JoinHandle<()>>,
}

impl NodeThread {
    pub fn new(
        name: impl Into<String>,
        class: impl Into<String>,
        node: Box<dyn Node>,
        io: NodeIo,
        span: tracing::Span,
        parent: ParentHandle,
        options: ThreadOptions,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            name: name.into(),
            class: class.into(),
            span,
            parent,
            options,
            state: StateCell::new(NodeState::Configured),
            failed: Arc::new(AtomicBool::new(false)),
            events: events_tx,
            runnable: Some(Runnable {
                node,
                io,
                events: events_rx,
            }),
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn state(&self) -> NodeState {
        self.state.get()
    }

    /// Whether the node ended because of an error.
    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.state() == NodeState::Finished
    }

    /// Spawn the node thread. Starting twice is an error.
    pub fn start(&mut self) -> Result<()> {
        let runnable = self.runnable.take().ok_or_else(|| MediaFlowError::Node {
            node: self.name.clone(),
            message: "node already started".into(),
        })?;

        let name = self.name.clone();
        let span = self.span.clone();
        let parent = self.parent.clone();
        let state = self.state.clone();
        let failed = Arc::clone(&self.failed);
        let options = self.options;

        state.set(NodeState::Running);
        let handle = std::thread::Builder::new()
            .name(format!("node-{}", self.name))
            .spawn(move || {
                let _enter = span.enter();
                run_node(name, runnable, parent, state, failed, options);
            });

        match handle {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.state.set(NodeState::Finished);
                self.failed.store(true, Ordering::Release);
                Err(MediaFlowError::Node {
                    node: self.name.clone(),
                    message: format!("failed to spawn thread: {}", e),
                })
            }
        }
    }

    /// Queue a control message, processed between two steps.
    pub fn send_event(&self, name: impl Into<String>, value: impl Into<ParamValue>) -> bool {
        if self.is_finished() {
            return false;
        }
        self.events.send((name.into(), value.into())).is_ok()
    }

    /// Wait for the thread to end. Safe to call repeatedly.
    ///
    /// A node that was never started is torn down here without running.
    pub fn join(&mut self) {
        if let Some(runnable) = self.runnable.take() {
            drop(runnable);
            self.state.set(NodeState::Finished);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                let _enter = self.span.enter();
                tracing::error!("Node thread panicked outside a step");
                self.failed.store(true, Ordering::Release);
                self.state.set(NodeState::Finished);
            }
        }
    }
}

impl Drop for NodeThread {
    fn drop(&mut self) {
        if self.handle.is_some() && !self.is_finished() {
            // Don't leave a detached thread writing into dropped pipes.
            self.parent.request_pipeline_stop();
        }
        self.join();
    }
}

impl std::fmt::Debug for NodeThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeThread")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("state", &self.state())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn dispatch_events(node: &mut dyn Node, events: &Receiver<(String, ParamValue)>) {
    while let Ok((name, value)) = events.try_recv() {
        if node.process_event(&name, &value) {
            continue;
        }
        let param = Parameter::new(name.as_str(), value);
        if !node.set_param(&param) {
            tracing::debug!("Unhandled event '{}'", name);
        }
    }
}

fn run_node(
    name: String,
    runnable: Runnable,
    parent: ParentHandle,
    state: StateCell,
    failed: Arc<AtomicBool>,
    options: ThreadOptions,
) {
    let Runnable {
        mut node,
        mut io,
        events,
    } = runnable;

    parent.notify(NodeEvent::Started { name: name.clone() });
    tracing::debug!("Node thread running (latency {:?})", io.latency());

    let mut error: Option<String> = None;

    match catch_unwind(AssertUnwindSafe(|| node.start(&mut io))) {
        Ok(Ok(())) => loop {
            if io.is_cancelled() {
                tracing::debug!("Cancellation observed");
                break;
            }
            dispatch_events(node.as_mut(), &events);
            if io.all_inputs_closed() {
                tracing::debug!("All inputs closed");
                break;
            }
            match catch_unwind(AssertUnwindSafe(|| node.step(&mut io))) {
                Ok(Ok(StepOutcome::Continue)) => {}
                Ok(Ok(StepOutcome::Finished)) => break,
                Ok(Err(e)) => {
                    error = Some(e.to_string());
                    break;
                }
                Err(payload) => {
                    error = Some(format!("panic: {}", panic_message(payload.as_ref())));
                    break;
                }
            }
        },
        Ok(Err(e)) => error = Some(format!("start failed: {}", e)),
        Err(payload) => {
            error = Some(format!("start panicked: {}", panic_message(payload.as_ref())))
        }
    }

    state.set(NodeState::StopRequested);
    if catch_unwind(AssertUnwindSafe(|| node.stop(&mut io))).is_err() {
        tracing::warn!("Node panicked in stop");
    }
    // Closing outputs lets downstream nodes drain and finish.
    drop(io);
    drop(node);

    let is_failure = error.is_some();
    match error {
        Some(message) => {
            failed.store(true, Ordering::Release);
            tracing::error!("Node failed: {}", message);
        }
        None => {
            tracing::info!("Node finished");
            if options.stop_pipeline_on_exit && parent.request_pipeline_stop() {
                tracing::info!("Node requested pipeline stop on exit");
            }
        }
    }

    state.set(NodeState::Finished);
    parent.notify(NodeEvent::Finished {
        name,
        failed: is_failure,
    });
}
