//! Workflow graph engine
//!
//! A graph is a table of named steps plus one outgoing edge per node.
//! Edges are data: an unconditional target, or a router over the state
//! with the set of targets it may return. Cycles are allowed; the engine
//! has no iteration cap, so a router that can loop back must converge on
//! its own.
//!
//! A [`WorkflowDefinition`] is validated once and shared. Each run binds it
//! to a model through [`WorkflowDefinition::instantiate`], producing a
//! single-use [`WorkflowGraph`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::Instrument;

use crate::error::{GraphError, WorkflowError};
use crate::port::ModelPort;
use crate::state::WorkflowState;
use crate::step::Step;

/// Name of the terminal marker
pub const END: &str = "__end__";

/// Where an edge leads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Node(String),
    End,
}

impl Target {
    pub fn node(name: impl Into<String>) -> Self {
        Target::Node(name.into())
    }

    pub fn label(&self) -> &str {
        match self {
            Target::Node(name) => name,
            Target::End => END,
        }
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        if name == END {
            Target::End
        } else {
            Target::Node(name.to_string())
        }
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Target::from(name.as_str())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Predicate choosing the next node from the state
pub type Router = Arc<dyn Fn(&WorkflowState) -> Target + Send + Sync>;

/// Outgoing edge of a node
#[derive(Clone)]
pub enum Edge {
    Unconditional(Target),
    Conditional {
        targets: Vec<Target>,
        router: Router,
        /// Shown on the diagram
        label: Option<String>,
    },
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Unconditional(target) => f.debug_tuple("Unconditional").field(target).finish(),
            Edge::Conditional { targets, label, .. } => f
                .debug_struct("Conditional")
                .field("targets", targets)
                .field("label", label)
                .finish_non_exhaustive(),
        }
    }
}

impl Edge {
    fn targets(&self) -> Vec<&Target> {
        match self {
            Edge::Unconditional(target) => vec![target],
            Edge::Conditional { targets, .. } => targets.iter().collect(),
        }
    }
}

/// Lifecycle of a node within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Not executed yet this run
    Pending,
    /// Executing; never observable outside the engine
    Running,
    /// Executed at least once
    Done,
}

/// Builder for [`WorkflowDefinition`]
///
/// Definition errors are collected and reported by [`GraphBuilder::build`].
pub struct GraphBuilder {
    name: String,
    nodes: IndexMap<String, Arc<dyn Step>>,
    edges: IndexMap<String, Edge>,
    entry: Option<String>,
    errors: Vec<GraphError>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
            entry: None,
            errors: Vec::new(),
        }
    }

    /// Add a step under its own name
    pub fn add_node(mut self, step: impl Step + 'static) -> Self {
        let name = step.name().to_string();
        if self.nodes.contains_key(&name) || name == END {
            self.errors.push(GraphError::DuplicateNode(name));
        } else {
            self.nodes.insert(name, Arc::new(step));
        }
        self
    }

    /// `from -> to`, always
    pub fn add_edge(self, from: impl Into<String>, to: impl Into<Target>) -> Self {
        self.insert_edge(from.into(), Edge::Unconditional(to.into()))
    }

    /// `from -> router(state)`, where the router must return one of `targets`
    pub fn add_conditional_edges<T, F>(self, from: impl Into<String>, targets: Vec<T>, router: F) -> Self
    where
        T: Into<Target>,
        F: Fn(&WorkflowState) -> Target + Send + Sync + 'static,
    {
        self.insert_edge(
            from.into(),
            Edge::Conditional {
                targets: targets.into_iter().map(Into::into).collect(),
                router: Arc::new(router),
                label: None,
            },
        )
    }

    /// Label the conditional edge of `from` on the diagram
    pub fn with_edge_label(mut self, from: &str, text: impl Into<String>) -> Self {
        if let Some(Edge::Conditional { label, .. }) = self.edges.get_mut(from) {
            *label = Some(text.into());
        }
        self
    }

    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    fn insert_edge(mut self, from: String, edge: Edge) -> Self {
        if self.edges.contains_key(&from) {
            self.errors.push(GraphError::DuplicateEdge(from));
        } else {
            self.edges.insert(from, edge);
        }
        self
    }

    /// Validate and freeze the graph
    pub fn build(self) -> Result<WorkflowDefinition, GraphError> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }

        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::UnknownNode(entry));
        }

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::UnknownNode(from.clone()));
            }
            if let Edge::Conditional { targets, .. } = edge {
                if targets.is_empty() {
                    return Err(GraphError::EmptyTargets(from.clone()));
                }
            }
            for target in edge.targets() {
                if let Target::Node(to) = target {
                    if !self.nodes.contains_key(to) {
                        return Err(GraphError::DanglingEdge {
                            from: from.clone(),
                            to: to.clone(),
                        });
                    }
                }
            }
        }

        if let Some(orphan) = self.nodes.keys().find(|name| !self.edges.contains_key(*name)) {
            return Err(GraphError::NoOutgoingEdge(orphan.clone()));
        }

        Ok(WorkflowDefinition {
            inner: Arc::new(DefinitionInner {
                name: self.name,
                nodes: self.nodes,
                edges: self.edges,
                entry,
            }),
        })
    }
}

struct DefinitionInner {
    name: String,
    nodes: IndexMap<String, Arc<dyn Step>>,
    edges: IndexMap<String, Edge>,
    entry: String,
}

/// A validated, immutable graph; cheap to clone and share across runs
#[derive(Clone)]
pub struct WorkflowDefinition {
    inner: Arc<DefinitionInner>,
}

impl fmt::Debug for WorkflowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowDefinition")
            .field("name", &self.inner.name)
            .field("entry", &self.inner.entry)
            .field("edges", &self.inner.edges)
            .finish()
    }
}

impl WorkflowDefinition {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn entry(&self) -> &str {
        &self.inner.entry
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.inner.nodes.keys().map(String::as_str)
    }

    /// Bind to a model for one run
    pub fn instantiate(&self, port: ModelPort) -> WorkflowGraph {
        let status = self
            .inner
            .nodes
            .keys()
            .map(|name| (name.clone(), NodeStatus::Pending))
            .collect();
        WorkflowGraph {
            definition: self.clone(),
            port,
            status,
        }
    }

    /// Mermaid flowchart of the graph
    ///
    /// Conditional edges are dashed and carry their label, if any.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");
        out.push_str("    __start__([start])\n");
        for name in self.inner.nodes.keys() {
            out.push_str(&format!("    {}[{}]\n", name, name));
        }
        out.push_str(&format!("    {}([end])\n", END));
        out.push_str(&format!("    __start__ --> {}\n", self.inner.entry));

        for (from, edge) in &self.inner.edges {
            match edge {
                Edge::Unconditional(to) => {
                    out.push_str(&format!("    {} --> {}\n", from, to));
                }
                Edge::Conditional { targets, label, .. } => {
                    for to in targets {
                        match label {
                            Some(text) => {
                                out.push_str(&format!("    {} -.->|{}| {}\n", from, text, to))
                            }
                            None => out.push_str(&format!("    {} -.-> {}\n", from, to)),
                        }
                    }
                }
            }
        }
        out
    }
}

/// Outcome of a completed graph run
#[derive(Debug, Clone)]
pub struct GraphRun {
    pub state: WorkflowState,
    /// Nodes in execution order, repeats included
    pub trace: Vec<String>,
    /// Final status of every node: `Done` if it ran, else `Pending`
    pub status: IndexMap<String, NodeStatus>,
}

impl GraphRun {
    pub fn nodes_executed(&self) -> usize {
        self.trace.len()
    }

    /// Status of `node`; unknown names report `Pending`
    pub fn status_of(&self, node: &str) -> NodeStatus {
        self.status.get(node).copied().unwrap_or(NodeStatus::Pending)
    }

    /// Nodes the traversal never reached
    pub fn pending_nodes(&self) -> Vec<&str> {
        self.status
            .iter()
            .filter(|(_, status)| **status == NodeStatus::Pending)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// A definition bound to one model; consumed by [`WorkflowGraph::run`]
pub struct WorkflowGraph {
    definition: WorkflowDefinition,
    port: ModelPort,
    status: IndexMap<String, NodeStatus>,
}

impl WorkflowGraph {
    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn to_mermaid(&self) -> String {
        self.definition.to_mermaid()
    }

    /// Execute from the entry node until the terminal marker
    ///
    /// Nodes run strictly one at a time. Any step error aborts the run and
    /// the partial state is dropped.
    pub async fn run(mut self, initial: WorkflowState) -> Result<GraphRun, WorkflowError> {
        let mut state = initial;
        let mut trace = Vec::new();
        let mut current = Target::node(self.definition.entry());

        while let Target::Node(name) = current {
            let step = self
                .definition
                .inner
                .nodes
                .get(&name)
                .cloned()
                .ok_or_else(|| GraphError::UnknownNode(name.clone()))?;

            if self.status.get(&name) == Some(&NodeStatus::Done) {
                tracing::debug!(node = %name, "Revisiting node");
            }
            self.status.insert(name.clone(), NodeStatus::Running);

            let span = tracing::debug_span!("node", name = %name);
            let result = step.execute(&self.port, &state).instrument(span).await?;
            state.merge(result);

            self.status.insert(name.clone(), NodeStatus::Done);
            current = self.next_target(&name, &state)?;
            trace.push(name);
        }

        tracing::debug!(workflow = %self.definition.name(), steps = trace.len(), "Workflow complete");
        Ok(GraphRun {
            state,
            trace,
            status: self.status,
        })
    }

    fn next_target(&self, node: &str, state: &WorkflowState) -> Result<Target, GraphError> {
        match self.definition.inner.edges.get(node) {
            Some(Edge::Unconditional(target)) => Ok(target.clone()),
            Some(Edge::Conditional { targets, router, .. }) => {
                let target = router(state);
                if targets.contains(&target) {
                    Ok(target)
                } else {
                    Err(GraphError::UndeclaredTarget {
                        node: node.to_string(),
                        target: target.label().to_string(),
                    })
                }
            }
            None => Err(GraphError::NoOutgoingEdge(node.to_string())),
        }
    }
}
