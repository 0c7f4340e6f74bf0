//! DAG of steps.
//!
//! The graph is an arena: it owns a vector of steps, a step id is its index,
//! and ports carry step indices only. Process steps hold the relational
//! operator chain, exchange steps the shuffle/forward/broadcast data plane,
//! and the deliver step is the terminal sink rooting the traversal.

use std::sync::{Arc, Mutex};

use bitflags::bitflags;

use crate::error::{ExecError, Result, Status};
use crate::exchange::{ExchangeKind, ForwardExchange, GroupExchange, GroupShuffleInfo};
use crate::io::RecordWriter;
use crate::memory::global_page_pool;
use crate::process::ops::RecordOperator;
use crate::process::variable_table::VariableTableInfo;

/// Identifier of a step within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub usize);

impl core::fmt::Display for StepId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "step{}", self.0)
    }
}

bitflags! {
    /// Lifecycle bits of a step.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct StepFlags: u8 {
        /// The step was inserted into a graph.
        const CREATED = 1;
        /// `activate` acquired the step's resources.
        const ACTIVATED = 1 << 1;
        /// `create_tasks` ran at least once.
        const TASKS_CREATED = 1 << 2;
        /// `deactivate` released the step's resources.
        const DEACTIVATED = 1 << 3;
    }
}

/// The operator chain and shape of one process step.
pub struct ProcessSpec {
    /// Variable-table shape of the step's single block.
    pub variable_info: Arc<VariableTableInfo>,
    /// The source operator driving the chain.
    pub source: Arc<dyn RecordOperator>,
}

impl core::fmt::Debug for ProcessSpec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcessSpec")
            .field("source", &self.source.kind())
            .finish()
    }
}

/// A process step: operator chain plus its task parallelism.
#[derive(Debug)]
pub struct ProcessStep {
    /// The operator chain.
    pub spec: Arc<ProcessSpec>,
    /// Task count when the step has no partitioned input (a scan step may run
    /// one task per storage partition).
    pub partitions: usize,
}

/// Data plane of an exchange step, created on activation.
#[derive(Debug)]
pub enum ExchangeData {
    /// Key-partitioned shuffle.
    Group(Arc<GroupExchange>),
    /// Pass-through queue.
    Forward(Arc<ForwardExchange>),
}

/// An exchange step connecting process steps.
#[derive(Debug)]
pub struct ExchangeStep {
    /// Transfer flavor.
    pub kind: ExchangeKind,
    /// Shuffle metadata; required for [`ExchangeKind::Shuffle`].
    pub info: Option<Arc<GroupShuffleInfo>>,
    /// Downstream partition count.
    pub partition_count: usize,
    data: Mutex<Option<ExchangeData>>,
}

impl ExchangeStep {
    /// The activated data plane, if any.
    pub fn data(&self) -> Option<ExchangeData> {
        let guard = self.data.lock().expect("poisoned");
        match &*guard {
            Some(ExchangeData::Group(g)) => Some(ExchangeData::Group(Arc::clone(g))),
            Some(ExchangeData::Forward(f)) => Some(ExchangeData::Forward(Arc::clone(f))),
            None => None,
        }
    }

    /// The activated group exchange; panics when the step is a forward.
    pub fn group_exchange(&self) -> Option<Arc<GroupExchange>> {
        match self.data() {
            Some(ExchangeData::Group(g)) => Some(g),
            _ => None,
        }
    }
}

/// Factory producing one result-writer handle per emitting task.
pub type ResultWriterFactory = Arc<dyn Fn() -> Box<dyn RecordWriter> + Send + Sync>;

/// The terminal sink of the DAG.
pub struct DeliverStep {
    /// Produces a writer handle for each task of the feeding process step.
    pub writer_factory: ResultWriterFactory,
}

impl core::fmt::Debug for DeliverStep {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("DeliverStep")
    }
}

/// The step payload.
#[derive(Debug)]
pub enum StepKind {
    /// Relational operator chain.
    Process(ProcessStep),
    /// Shuffle / forward / broadcast transfer.
    Exchange(ExchangeStep),
    /// Terminal sink.
    Deliver(DeliverStep),
}

/// One node of the DAG.
#[derive(Debug)]
pub struct StepNode {
    id: StepId,
    kind: StepKind,
    inputs: Vec<StepId>,
    outputs: Vec<StepId>,
    flags: StepFlags,
}

impl StepNode {
    /// The step's id within its graph.
    pub fn id(&self) -> StepId {
        self.id
    }

    /// The step payload.
    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    /// Upstream step ids in connection order.
    pub fn inputs(&self) -> &[StepId] {
        &self.inputs
    }

    /// Downstream step ids in connection order.
    pub fn outputs(&self) -> &[StepId] {
        &self.outputs
    }

    /// Lifecycle flags.
    pub fn flags(&self) -> StepFlags {
        self.flags
    }

    /// Acquires the step's runtime resources.
    pub fn activate(&mut self) {
        if self.flags.contains(StepFlags::ACTIVATED) {
            return;
        }
        if let StepKind::Exchange(exchange) = &mut self.kind {
            let data = match exchange.kind {
                ExchangeKind::Shuffle => {
                    let info = exchange.info.as_ref().expect("shuffle exchange without info");
                    ExchangeData::Group(Arc::new(GroupExchange::new(
                        Arc::clone(info),
                        exchange.partition_count.max(1),
                        global_page_pool(),
                    )))
                }
                ExchangeKind::Forward | ExchangeKind::Broadcast => {
                    ExchangeData::Forward(Arc::new(ForwardExchange::new()))
                }
            };
            *exchange.data.lock().expect("poisoned") = Some(data);
        }
        self.flags |= StepFlags::ACTIVATED;
    }

    /// Marks the task-creation phase.
    pub fn mark_tasks_created(&mut self) {
        self.flags |= StepFlags::TASKS_CREATED;
    }

    /// Releases reader/writer handles; the step stays in the graph for
    /// diagnostics.
    pub fn deactivate(&mut self) {
        if let StepKind::Exchange(exchange) = &mut self.kind {
            *exchange.data.lock().expect("poisoned") = None;
        }
        self.flags |= StepFlags::DEACTIVATED;
    }
}

/// Arena-owned DAG of steps.
#[derive(Debug, Default)]
pub struct StepGraph {
    steps: Vec<StepNode>,
}

impl StepGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, kind: StepKind) -> StepId {
        let id = StepId(self.steps.len());
        self.steps.push(StepNode {
            id,
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            flags: StepFlags::CREATED,
        });
        id
    }

    /// Inserts a process step.
    pub fn add_process(&mut self, spec: Arc<ProcessSpec>, partitions: usize) -> StepId {
        self.insert(StepKind::Process(ProcessStep { spec, partitions: partitions.max(1) }))
    }

    /// Inserts a shuffle exchange step.
    pub fn add_shuffle(&mut self, info: Arc<GroupShuffleInfo>, partition_count: usize) -> StepId {
        self.insert(StepKind::Exchange(ExchangeStep {
            kind: ExchangeKind::Shuffle,
            info: Some(info),
            partition_count: partition_count.max(1),
            data: Mutex::new(None),
        }))
    }

    /// Inserts a forward exchange step.
    pub fn add_forward(&mut self) -> StepId {
        self.insert(StepKind::Exchange(ExchangeStep {
            kind: ExchangeKind::Forward,
            info: None,
            partition_count: 1,
            data: Mutex::new(None),
        }))
    }

    /// Inserts the deliver step.
    pub fn add_deliver(&mut self, writer_factory: ResultWriterFactory) -> StepId {
        self.insert(StepKind::Deliver(DeliverStep { writer_factory }))
    }

    /// Connects `upstream` to `downstream` (the `>>` wiring).
    pub fn connect(&mut self, upstream: StepId, downstream: StepId) {
        debug_assert!(upstream.0 < self.steps.len() && downstream.0 < self.steps.len());
        self.steps[upstream.0].outputs.push(downstream);
        self.steps[downstream.0].inputs.push(upstream);
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True for a graph without steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The step with the given id.
    pub fn step(&self, id: StepId) -> Option<&StepNode> {
        self.steps.get(id.0)
    }

    /// Mutable access to the step with the given id.
    pub fn step_mut(&mut self, id: StepId) -> Option<&mut StepNode> {
        self.steps.get_mut(id.0)
    }

    /// All steps in insertion order.
    pub fn steps(&self) -> &[StepNode] {
        &self.steps
    }

    /// Removes every step.
    pub fn clear(&mut self) {
        self.steps.clear();
    }

    /// The deliver step's id, when present.
    pub fn deliver_step(&self) -> Option<StepId> {
        self.steps
            .iter()
            .find(|s| matches!(s.kind, StepKind::Deliver(_)))
            .map(|s| s.id)
    }

    /// Steps in topological order (inputs before outputs).
    pub fn topological_order(&self) -> Result<Vec<StepId>> {
        let n = self.steps.len();
        let mut in_degree: Vec<usize> = self.steps.iter().map(|s| s.inputs.len()).collect();
        let mut ready: Vec<StepId> =
            self.steps.iter().filter(|s| s.inputs.is_empty()).map(|s| s.id).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(id) = ready.pop() {
            order.push(id);
            for &out in &self.steps[id.0].outputs {
                in_degree[out.0] -= 1;
                if in_degree[out.0] == 0 {
                    ready.push(out);
                }
            }
        }
        if order.len() != n {
            return Err(ExecError::new(Status::InvalidArgument, "step graph contains a cycle"));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ops::Emit;
    use weir_plan::VariableId;
    use weir_types::DataType;

    fn spec() -> Arc<ProcessSpec> {
        let info = Arc::new(VariableTableInfo::new([(VariableId(0), DataType::Int4)]));
        Arc::new(ProcessSpec {
            variable_info: info,
            source: Arc::new(Emit::new(0, vec![VariableId(0)])),
        })
    }

    #[test]
    fn ids_are_unique_and_resolvable() {
        let mut g = StepGraph::new();
        let p0 = g.add_process(spec(), 1);
        let p1 = g.add_process(spec(), 1);
        let p2 = g.add_process(spec(), 1);
        assert_ne!(p0, p1);
        assert_ne!(p1, p2);
        assert_ne!(p2, p0);
        let step = g.step(p1).expect("inserted");
        assert_eq!(step.id(), p1);
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn clear_empties_the_graph() {
        let mut g = StepGraph::new();
        g.add_process(spec(), 1);
        g.add_forward();
        assert_eq!(g.len(), 2);
        g.clear();
        assert!(g.is_empty());
        assert!(g.steps().is_empty());
    }

    #[test]
    fn connect_wires_ports_by_index() {
        let mut g = StepGraph::new();
        let scan = g.add_process(spec(), 1);
        let xch = g.add_forward();
        let sink = g.add_process(spec(), 1);
        g.connect(scan, xch);
        g.connect(xch, sink);
        assert_eq!(g.step(scan).unwrap().outputs(), &[xch]);
        assert_eq!(g.step(xch).unwrap().inputs(), &[scan]);
        assert_eq!(g.step(sink).unwrap().inputs(), &[xch]);
    }

    #[test]
    fn topological_order_respects_edges() {
        let mut g = StepGraph::new();
        let a = g.add_process(spec(), 1);
        let x = g.add_forward();
        let b = g.add_process(spec(), 1);
        g.connect(a, x);
        g.connect(x, b);
        let order = g.topological_order().unwrap();
        let pos = |id: StepId| order.iter().position(|&s| s == id).unwrap();
        assert!(pos(a) < pos(x));
        assert!(pos(x) < pos(b));
    }

    #[test]
    fn lifecycle_flags_accumulate() {
        let mut g = StepGraph::new();
        let x = g.add_forward();
        let step = g.step_mut(x).unwrap();
        assert_eq!(step.flags(), StepFlags::CREATED);
        step.activate();
        assert!(step.flags().contains(StepFlags::ACTIVATED));
        step.mark_tasks_created();
        step.deactivate();
        assert!(step.flags().contains(StepFlags::DEACTIVATED));
        // the step remains in the graph for diagnostics
        assert!(g.step(x).is_some());
    }

    #[test]
    fn cycle_is_rejected() {
        let mut g = StepGraph::new();
        let a = g.add_forward();
        let b = g.add_forward();
        g.connect(a, b);
        g.connect(b, a);
        assert!(g.topological_order().is_err());
    }
}
