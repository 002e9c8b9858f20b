//! Core graph structures: the state machine and the dataflow inside each state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{JaceError, JaceResult};
use crate::value::HostArray;

use super::{DType, DataDescriptor, MapRange, Memlet};

/// Index of a state inside its [`Sdfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub usize);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Direct array-to-array copy. Elements are transferred in row-major order of the two
/// subsets, which therefore only need equal volume (this is how reshapes are expressed).
#[derive(Debug, Clone, PartialEq)]
pub struct CopyNode {
    pub src: Memlet,
    pub dst: Memlet,
}

/// Elementwise tasklet executed once per point of the map ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedTasklet {
    pub label: String,
    pub ranges: Vec<MapRange>,
    /// Connector name to the element it reads.
    pub inputs: BTreeMap<String, Memlet>,
    /// Map-level symbols whose value is read from a single array element before the map runs.
    pub dynamic_inputs: BTreeMap<String, Memlet>,
    /// One assignment, `__out = <expression>`.
    pub code: String,
    pub outputs: BTreeMap<String, Memlet>,
}

/// A child graph embedded as a single dataflow node.
#[derive(Debug, Clone)]
pub struct NestedSdfgNode {
    pub label: String,
    pub sdfg: Box<Sdfg>,
    /// Child argument name to the outer array bound to it.
    pub inputs: BTreeMap<String, String>,
    pub outputs: BTreeMap<String, String>,
    /// Child symbol to the outer symbol that provides its value.
    pub symbol_mapping: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub enum DataflowNode {
    Copy(CopyNode),
    MappedTasklet(MappedTasklet),
    Nested(NestedSdfgNode),
}

impl DataflowNode {
    /// Arrays this node reads.
    pub fn reads(&self) -> Vec<&str> {
        match self {
            DataflowNode::Copy(copy) => vec![copy.src.data.as_str()],
            DataflowNode::MappedTasklet(tasklet) => tasklet
                .inputs
                .values()
                .chain(tasklet.dynamic_inputs.values())
                .map(|m| m.data.as_str())
                .collect(),
            DataflowNode::Nested(nested) => nested.inputs.values().map(String::as_str).collect(),
        }
    }

    /// Arrays this node writes.
    pub fn writes(&self) -> Vec<&str> {
        match self {
            DataflowNode::Copy(copy) => vec![copy.dst.data.as_str()],
            DataflowNode::MappedTasklet(tasklet) => {
                tasklet.outputs.values().map(|m| m.data.as_str()).collect()
            }
            DataflowNode::Nested(nested) => nested.outputs.values().map(String::as_str).collect(),
        }
    }
}

/// A dataflow state; nodes run in insertion order.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub label: String,
    pub nodes: Vec<DataflowNode>,
}

impl State {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            nodes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add_copy(&mut self, src: Memlet, dst: Memlet) {
        self.nodes.push(DataflowNode::Copy(CopyNode { src, dst }));
    }

    pub fn add_mapped_tasklet(&mut self, tasklet: MappedTasklet) {
        self.nodes.push(DataflowNode::MappedTasklet(tasklet));
    }

    pub fn add_nested_sdfg(&mut self, nested: NestedSdfgNode) {
        self.nodes.push(DataflowNode::Nested(nested));
    }
}

/// Operand of an interstate condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymbolOperand {
    Symbol(String),
    Const(i64),
}

impl fmt::Display for SymbolOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolOperand::Symbol(name) => f.write_str(name),
            SymbolOperand::Const(value) => write!(f, "{value}"),
        }
    }
}

/// Transition guard `lhs == rhs`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Condition {
    pub lhs: SymbolOperand,
    pub rhs: i64,
}

impl Condition {
    pub fn equals(lhs: SymbolOperand, rhs: i64) -> Self {
        Self { lhs, rhs }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} == {}", self.lhs, self.rhs)
    }
}

/// Value bound to a symbol when an interstate edge is taken.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymbolValue {
    Const(i64),
    /// A single element of an array, addressed by constant indices.
    Element(Memlet),
}

impl fmt::Display for SymbolValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolValue::Const(value) => write!(f, "{value}"),
            SymbolValue::Element(memlet) => write!(f, "{memlet}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterstateEdge {
    pub src: StateId,
    pub dst: StateId,
    pub condition: Option<Condition>,
    pub assignments: BTreeMap<String, SymbolValue>,
}

impl InterstateEdge {
    /// Unconditional and assignment free.
    pub fn is_plain(&self) -> bool {
        self.condition.is_none() && self.assignments.is_empty()
    }
}

/// Stateful dataflow graph: named arrays plus a state machine of dataflow states.
#[derive(Debug, Clone)]
pub struct Sdfg {
    pub(super) name: String,
    pub(super) arrays: BTreeMap<String, DataDescriptor>,
    pub(super) constants: BTreeMap<String, HostArray>,
    pub(super) symbols: BTreeMap<String, DType>,
    pub(super) states: Vec<State>,
    pub(super) edges: Vec<InterstateEdge>,
    pub(super) start_state: StateId,
    pub(super) arg_names: Vec<String>,
}

impl Sdfg {
    /// A graph with a single empty start state labelled `initial_state`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arrays: BTreeMap::new(),
            constants: BTreeMap::new(),
            symbols: BTreeMap::new(),
            states: vec![State::new("initial_state")],
            edges: Vec::new(),
            start_state: StateId(0),
            arg_names: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn arrays(&self) -> &BTreeMap<String, DataDescriptor> {
        &self.arrays
    }

    pub fn array(&self, name: &str) -> Option<&DataDescriptor> {
        self.arrays.get(name)
    }

    pub fn array_mut(&mut self, name: &str) -> Option<&mut DataDescriptor> {
        self.arrays.get_mut(name)
    }

    pub fn contains_array(&self, name: &str) -> bool {
        self.arrays.contains_key(name)
    }

    pub fn add_array(&mut self, name: impl Into<String>, desc: DataDescriptor) -> JaceResult<()> {
        let name = name.into();
        if self.arrays.contains_key(&name) {
            return Err(JaceError::naming(format!(
                "array '{name}' already exists in SDFG '{}'",
                self.name
            )));
        }
        self.arrays.insert(name, desc);
        Ok(())
    }

    pub fn remove_array(&mut self, name: &str) -> Option<DataDescriptor> {
        self.constants.remove(name);
        self.arrays.remove(name)
    }

    /// Registers a transient array whose contents are fixed before the first state runs.
    pub fn add_constant(&mut self, name: impl Into<String>, value: HostArray) -> JaceResult<()> {
        let name = name.into();
        let desc = DataDescriptor::array(value.shape().to_vec(), value.dtype());
        self.add_array(name.clone(), desc)?;
        self.constants.insert(name, value);
        Ok(())
    }

    /// Attaches a fixed value to an existing transient array of the same size and dtype.
    pub fn bind_constant(&mut self, name: &str, value: HostArray) -> JaceResult<()> {
        let Some(desc) = self.arrays.get(name) else {
            return Err(JaceError::invariant(format!(
                "can not bind a constant to unknown array '{name}'"
            )));
        };
        if desc.dtype != value.dtype() || desc.element_count() != value.len() {
            return Err(JaceError::invariant(format!(
                "constant of type {}{:?} does not fit array '{name}' ({desc})",
                value.dtype(),
                value.shape()
            )));
        }
        let value = value.reshape(desc.shape.clone())?;
        self.constants.insert(name.to_string(), value);
        Ok(())
    }

    pub fn constants(&self) -> &BTreeMap<String, HostArray> {
        &self.constants
    }

    pub fn add_symbol(&mut self, name: impl Into<String>, dtype: DType) {
        self.symbols.insert(name.into(), dtype);
    }

    pub fn symbols(&self) -> &BTreeMap<String, DType> {
        &self.symbols
    }

    pub fn add_state(&mut self, label: impl Into<String>) -> StateId {
        self.states.push(State::new(label));
        StateId(self.states.len() - 1)
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    pub fn state_mut(&mut self, id: StateId) -> &mut State {
        &mut self.states[id.0]
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &State)> {
        self.states
            .iter()
            .enumerate()
            .map(|(idx, state)| (StateId(idx), state))
    }

    pub fn contains_state(&self, id: StateId) -> bool {
        id.0 < self.states.len()
    }

    pub fn add_edge(
        &mut self,
        src: StateId,
        dst: StateId,
        condition: Option<Condition>,
        assignments: BTreeMap<String, SymbolValue>,
    ) {
        self.edges.push(InterstateEdge {
            src,
            dst,
            condition,
            assignments,
        });
    }

    pub fn edges(&self) -> &[InterstateEdge] {
        &self.edges
    }

    pub fn in_edges(&self, id: StateId) -> impl Iterator<Item = &InterstateEdge> {
        self.edges.iter().filter(move |edge| edge.dst == id)
    }

    pub fn out_edges(&self, id: StateId) -> impl Iterator<Item = &InterstateEdge> {
        self.edges.iter().filter(move |edge| edge.src == id)
    }

    pub fn in_degree(&self, id: StateId) -> usize {
        self.in_edges(id).count()
    }

    pub fn out_degree(&self, id: StateId) -> usize {
        self.out_edges(id).count()
    }

    /// Number of states.
    pub fn number_of_nodes(&self) -> usize {
        self.states.len()
    }

    pub fn number_of_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn start_state(&self) -> StateId {
        self.start_state
    }

    pub fn set_start_state(&mut self, id: StateId) {
        self.start_state = id;
    }

    /// States without successors.
    pub fn sink_states(&self) -> Vec<StateId> {
        self.states()
            .map(|(id, _)| id)
            .filter(|id| self.out_degree(*id) == 0)
            .collect()
    }

    /// States reachable from the start state, in breadth-first order.
    pub fn reachable_states(&self) -> Vec<StateId> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue = std::collections::VecDeque::from([self.start_state]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            for edge in self.out_edges(id) {
                queue.push_back(edge.dst);
            }
        }
        order
    }

    /// Ordered parameter list of a finalized graph; empty while canonical.
    pub fn arg_names(&self) -> &[String] {
        &self.arg_names
    }

    pub fn set_arg_names(&mut self, names: Vec<String>) {
        self.arg_names = names;
    }

    /// Total number of dataflow nodes over all states.
    pub fn number_of_dataflow_nodes(&self) -> usize {
        self.states.iter().map(|state| state.nodes.len()).sum()
    }

    /// Removes a state and every edge touching it; later ids shift down by one.
    pub fn remove_state(&mut self, id: StateId) -> JaceResult<State> {
        if !self.contains_state(id) {
            return Err(JaceError::invariant(format!(
                "state {id} does not exist in SDFG '{}'",
                self.name
            )));
        }
        if id == self.start_state {
            return Err(JaceError::invariant(format!(
                "can not remove start state {id} of SDFG '{}'",
                self.name
            )));
        }
        let removed = self.states.remove(id.0);
        self.edges.retain(|edge| edge.src != id && edge.dst != id);
        let shift = |sid: &mut StateId| {
            if sid.0 > id.0 {
                sid.0 -= 1;
            }
        };
        for edge in &mut self.edges {
            shift(&mut edge.src);
            shift(&mut edge.dst);
        }
        shift(&mut self.start_state);
        Ok(removed)
    }
}
