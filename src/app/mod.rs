//! Application builder: turns a [`PipelineDescription`] into a runnable
//! [`Pipeline`].
//!
//! Building happens in three passes so a broken description never leaves a
//! half-wired graph behind:
//!
//! 1. **Plan**: look up every class, merge parameters, resolve every link to
//!    a direct pipe, a converter-bridged pair of pipes, or an error.
//! 2. **Instantiate**: construct every node, converters included.
//! 3. **Wire**: create pipes, hand out pipe ends, wrap nodes in threads.
//!
//! Nothing is connected until passes 1 and 2 succeeded.

pub mod listing;

use crate::config::{
    Endpoint, LinkDescription, PipelineDescription, RuntimeConfig, LATENCY_PARAM,
    STOP_ON_EXIT_PARAM,
};
use crate::error::{MediaFlowError, Result, ResultExt};
use crate::frame::format::{self, FormatId};
use crate::params::{ParamValue, ParameterSet};
use crate::pipeline::{
    CancellationToken, ConverterChoice, NodeInit, NodeIo, NodeThread, ParentHandle, Pipe,
    PipePolicy, Pipeline, RegistryContext, ThreadOptions,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// A node as planned, before construction.
#[derive(Debug, Clone)]
struct PlannedNode {
    name: String,
    class: String,
    params: ParameterSet,
    latency: Duration,
    stop_on_exit: bool,
}

/// How one link will be realized.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Producer and consumer share a pipe carrying these formats (empty: any).
    Direct { formats: Vec<FormatId> },
    /// A converter node is interposed.
    Converted(ConverterChoice),
}

#[derive(Debug, Clone)]
struct PlannedLink {
    from: Endpoint,
    to: Endpoint,
    from_node: usize,
    to_node: usize,
    policy: PipePolicy,
    route: Route,
}

/// Builds pipelines against one registry context.
///
/// Every pipeline built here shares the builder's cancellation token. Ending
/// any of them, or calling [`ApplicationBuilder::request_end`], ends all of
/// them, and the builder refuses to build more afterwards.
pub struct ApplicationBuilder {
    context: Arc<RegistryContext>,
    config: RuntimeConfig,
    cancel: CancellationToken,
}

impl ApplicationBuilder {
    pub fn new(context: Arc<RegistryContext>, config: RuntimeConfig) -> Self {
        Self {
            context,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an existing token, e.g. one already wired to Ctrl+C.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn context(&self) -> &Arc<RegistryContext> {
        &self.context
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Request the end of every pipeline built by this builder. Later calls
    /// to [`ApplicationBuilder::build`] fail.
    pub fn request_end(&self) {
        self.cancel.request();
    }

    /// Resolve how a single link would be wired, without building anything.
    pub fn resolve_link(
        &self,
        producer: &str,
        producer_formats: &[FormatId],
        consumer: &str,
        consumer_formats: &[FormatId],
    ) -> Result<Route> {
        if producer_formats.is_empty() || consumer_formats.is_empty() {
            let formats = if producer_formats.is_empty() {
                consumer_formats.to_vec()
            } else {
                producer_formats.to_vec()
            };
            return Ok(Route::Direct { formats });
        }

        let common: Vec<FormatId> = producer_formats
            .iter()
            .copied()
            .filter(|f| consumer_formats.contains(f))
            .collect();
        if !common.is_empty() {
            return Ok(Route::Direct { formats: common });
        }

        self.context
            .converters()
            .find_converter(producer_formats, consumer_formats)
            .map(Route::Converted)
            .ok_or_else(|| MediaFlowError::IncompatibleFormats {
                producer: producer.to_string(),
                output_formats: producer_formats.to_vec(),
                consumer: consumer.to_string(),
                input_formats: consumer_formats.to_vec(),
            })
    }

    /// Build a pipeline. Nothing is started.
    pub fn build(&self, description: &PipelineDescription) -> Result<Pipeline> {
        if self.cancel.is_cancelled() {
            return Err(MediaFlowError::Configuration(format!(
                "Cannot build '{}': cancellation was already requested",
                description.name
            )));
        }
        description.validate()?;
        let description = description.resolve_variables()?;
        let name = if description.name.is_empty() {
            "pipeline".to_string()
        } else {
            description.name.clone()
        };

        // ── Plan ──
        let mut nodes = Vec::with_capacity(description.nodes.len());
        let mut index_of = HashMap::new();
        for node in &description.nodes {
            let planned = self
                .plan_node(&node.name, &node.class, &node.params)
                .with_context(|| format!("node '{}'", node.name))?;
            index_of.insert(node.name.clone(), nodes.len());
            nodes.push(planned);
        }

        let mut links = Vec::with_capacity(description.links.len());
        let mut used_inputs = HashMap::new();
        for link in &description.links {
            let planned = self.plan_link(link, &nodes, &index_of)?;
            if let Some(previous) = used_inputs.insert(planned.to.clone(), link.from.clone()) {
                return Err(MediaFlowError::Configuration(format!(
                    "Input {} is fed by both '{}' and '{}'",
                    planned.to, previous, link.from
                )));
            }
            links.push(planned);
        }

        // ── Instantiate ──
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let parent = ParentHandle::new(events_tx, self.cancel.clone());

        let mut converter_of_link = HashMap::new();
        for (i, link) in links.iter().enumerate() {
            if let Route::Converted(choice) = &link.route {
                let planned = self.plan_converter(choice, link, &nodes[link.to_node])?;
                converter_of_link.insert(i, nodes.len());
                nodes.push(planned);
            }
        }

        let mut built = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let init = NodeInit::new(&node.name, &node.class, parent.clone(), node.params.clone());
            let span = init.span.clone();
            let instance = self.context.modules().instantiate(init)?;
            let io = NodeIo::new(&node.name, self.cancel.clone(), node.latency);
            built.push((instance, io, span));
        }

        // ── Wire ──
        let mut pipeline = Pipeline::new(
            &name,
            Arc::clone(&self.context),
            self.cancel.clone(),
            events_rx,
        );
        pipeline.set_stop_on_node_failure(self.config.stop_on_node_failure);

        // Links sharing a producer port share one pipe.
        let mut by_output: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
        for (i, link) in links.iter().enumerate() {
            by_output.entry((link.from_node, link.from.port)).or_default().push(i);
        }

        for ((producer, port), group) in &by_output {
            let first = &links[group[0]];
            if group.iter().any(|&i| links[i].policy != first.policy) {
                tracing::warn!(
                    "Links from {} declare different policies, using {}",
                    first.from,
                    first.policy
                );
            }
            let accepted = carried_formats(group.iter().map(|&i| &links[i]));
            let pipe = Pipe::new(first.from.to_string(), first.policy, accepted);
            built[*producer].1.connect_output(*port, pipe.take_writer()?);

            for &i in group {
                let link = &links[i];
                match converter_of_link.get(&i) {
                    None => {
                        built[link.to_node].1.connect_input(link.to.port, pipe.connect_reader());
                        pipeline.add_edge(link.from_node, link.to_node);
                    }
                    Some(&conv) => {
                        built[conv].1.connect_input(0, pipe.connect_reader());
                        let Route::Converted(choice) = &link.route else {
                            continue;
                        };
                        let out = Pipe::new(
                            format!("{}:0", nodes[conv].name),
                            link.policy,
                            vec![choice.output],
                        );
                        built[conv].1.connect_output(0, out.take_writer()?);
                        built[link.to_node].1.connect_input(link.to.port, out.connect_reader());
                        pipeline.add_edge(link.from_node, conv);
                        pipeline.add_edge(conv, link.to_node);
                        pipeline.add_pipe(out);
                    }
                }
            }
            pipeline.add_pipe(pipe);
        }

        for (node, (instance, io, span)) in nodes.iter().zip(built) {
            pipeline.add_node(NodeThread::new(
                &node.name,
                &node.class,
                instance,
                io,
                span,
                parent.clone(),
                ThreadOptions {
                    stop_pipeline_on_exit: node.stop_on_exit,
                },
            ));
        }

        tracing::info!(
            "Built pipeline '{}': {} nodes ({} converters), {} pipes",
            name,
            pipeline.node_count(),
            converter_of_link.len(),
            pipeline.pipes().len()
        );
        Ok(pipeline)
    }

    fn plan_node(
        &self,
        name: &str,
        class: &str,
        user: &BTreeMap<String, ParamValue>,
    ) -> Result<PlannedNode> {
        let mut params = self.context.modules().get_params(class)?;
        params.apply(user);

        let latency_ms = if user.contains_key(LATENCY_PARAM) {
            params
                .get_int(LATENCY_PARAM)
                .filter(|&ms| ms > 0)
                .ok_or_else(|| {
                    MediaFlowError::Configuration(format!(
                        "'{}' must be a positive number of milliseconds",
                        LATENCY_PARAM
                    ))
                })? as u64
        } else {
            self.config.default_latency_ms
        };
        params.set(LATENCY_PARAM, latency_ms as i64);

        Ok(PlannedNode {
            name: name.to_string(),
            class: class.to_string(),
            stop_on_exit: params.get_bool(STOP_ON_EXIT_PARAM).unwrap_or(false),
            latency: Duration::from_millis(latency_ms.max(1)),
            params,
        })
    }

    fn plan_link(
        &self,
        link: &LinkDescription,
        nodes: &[PlannedNode],
        index_of: &HashMap<String, usize>,
    ) -> Result<PlannedLink> {
        let from = Endpoint::parse(&link.from)?;
        let to = Endpoint::parse(&link.to)?;
        let lookup = |e: &Endpoint| {
            index_of.get(&e.node).copied().ok_or_else(|| {
                MediaFlowError::Configuration(format!("Link references unknown node '{}'", e.node))
            })
        };
        let from_node = lookup(&from)?;
        let to_node = lookup(&to)?;
        let producer = &nodes[from_node];
        let consumer = &nodes[to_node];

        if let Some(max) = producer.params.max_outputs() {
            if from.port >= max {
                return Err(MediaFlowError::Configuration(format!(
                    "'{}' ({}) has {} output(s), link uses output {}",
                    producer.name, producer.class, max, from.port
                )));
            }
        }
        if let Some(max) = consumer.params.max_inputs() {
            if to.port >= max {
                return Err(MediaFlowError::Configuration(format!(
                    "'{}' ({}) has {} input(s), link uses input {}",
                    consumer.name, consumer.class, max, to.port
                )));
            }
        }

        let producer_formats = match &link.format {
            Some(name) => vec![format::format_by_name(name).ok_or_else(|| {
                MediaFlowError::Configuration(format!("Unknown format '{}' on link {}", name, from))
            })?],
            None => declared_output(&producer.params),
        };

        let route = self.resolve_link(
            &producer.name,
            &producer_formats,
            &consumer.name,
            consumer.params.input_formats(),
        )?;
        if let Route::Converted(choice) = &route {
            tracing::debug!(
                "Link {} -> {} bridged by '{}' ({} -> {})",
                from,
                to,
                choice.class_id,
                format::format_name(choice.input),
                format::format_name(choice.output)
            );
        }

        Ok(PlannedLink {
            from,
            to,
            from_node,
            to_node,
            policy: link.policy.unwrap_or(self.config.default_pipe),
            route,
        })
    }

    fn plan_converter(
        &self,
        choice: &ConverterChoice,
        link: &PlannedLink,
        consumer: &PlannedNode,
    ) -> Result<PlannedNode> {
        let mut params = self.context.modules().get_params(&choice.class_id)?;
        params
            .set("format_in", choice.input)
            .set("format_out", choice.output)
            .set(LATENCY_PARAM, consumer.latency.as_millis() as i64);
        Ok(PlannedNode {
            name: format!("{}[{}->{}]", choice.class_id, link.from, link.to),
            class: choice.class_id.clone(),
            params,
            latency: consumer.latency,
            stop_on_exit: false,
        })
    }
}

/// Formats a producer will emit: its `format` parameter when the class
/// declares output formats and the value is one of them, else all of them.
fn declared_output(params: &ParameterSet) -> Vec<FormatId> {
    let declared = params.output_formats();
    match params.get_format("format") {
        Some(f) if declared.contains(&f) => vec![f],
        _ => declared.to_vec(),
    }
}

/// Accepted set of a pipe shared by several links. Any unrestricted link
/// makes the pipe unrestricted.
fn carried_formats<'a>(links: impl Iterator<Item = &'a PlannedLink>) -> Vec<FormatId> {
    let mut formats = Vec::new();
    for link in links {
        let carried = match &link.route {
            Route::Direct { formats } => formats.clone(),
            Route::Converted(choice) => vec![choice.input],
        };
        if carried.is_empty() {
            return Vec::new();
        }
        for f in carried {
            if !formats.contains(&f) {
                formats.push(f);
            }
        }
    }
    formats
}
