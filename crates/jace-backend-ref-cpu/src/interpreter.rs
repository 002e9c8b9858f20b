//! Direct execution of a finalized SDFG on host buffers.
//!
//! Compilation parses every tasklet once and mirrors the state and node structure of the
//! graph, nested graphs included. Execution walks the state machine from the start state,
//! running the nodes of each state in order and following the first out-edge whose
//! condition holds; a state without such an edge ends the run.

use std::collections::BTreeMap;

use jace::backend::{BackendError, BackendResult, CompiledProgram};
use jace::sdfg::{
    CopyNode, DataflowNode, MappedTasklet, Memlet, Sdfg, StateId, Subscript, SymbolOperand,
    SymbolValue,
};
use jace::{HostArray, ScalarValue};

use crate::expr::{Assignment, Scope};

/// Upper bound on state transitions per state of a graph.
const TRANSITIONS_PER_STATE: usize = 1024;

enum Node {
    Copy(CopyNode),
    Map(Box<MapNode>),
    Nested(Box<NestedNode>),
}

struct MapNode {
    tasklet: MappedTasklet,
    body: Assignment,
    output: Memlet,
}

struct NestedNode {
    label: String,
    program: Program,
    inputs: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
    symbol_mapping: BTreeMap<String, String>,
}

/// A graph prepared for execution.
pub struct Program {
    sdfg: Sdfg,
    states: Vec<Vec<Node>>,
}

impl Program {
    pub fn compile(sdfg: &Sdfg) -> BackendResult<Self> {
        let mut states = Vec::new();
        for (_, state) in sdfg.states() {
            let nodes = state
                .nodes
                .iter()
                .map(prepare_node)
                .collect::<BackendResult<Vec<_>>>()?;
            states.push(nodes);
        }
        Ok(Self {
            sdfg: sdfg.clone(),
            states,
        })
    }

    pub fn sdfg(&self) -> &Sdfg {
        &self.sdfg
    }

    /// Runs the graph. `args` must hold every argument of the graph; non-transient arrays
    /// are updated in place.
    pub fn run(
        &self,
        args: &mut BTreeMap<String, HostArray>,
        symbols: BTreeMap<String, i64>,
    ) -> BackendResult<()> {
        let mut memory = self.allocate(args)?;
        let mut symbols = symbols;

        let limit = self.states.len().max(1) * TRANSITIONS_PER_STATE;
        let mut current = self.sdfg.start_state();
        let mut transitions = 0usize;
        loop {
            log::trace!(
                "{}: running state '{}'",
                self.sdfg.name(),
                self.sdfg.state(current).label
            );
            for node in &self.states[current.0] {
                self.run_node(node, &mut memory, &symbols)?;
            }
            let Some(next) = self.next_state(current, &memory, &mut symbols)? else {
                break;
            };
            current = next;
            transitions += 1;
            if transitions > limit {
                return Err(BackendError::execution(format!(
                    "'{}' did not terminate after {limit} state transitions",
                    self.sdfg.name()
                )));
            }
        }

        for (name, array) in args.iter_mut() {
            if let Some(result) = memory.remove(name) {
                *array = result;
            }
        }
        Ok(())
    }

    fn allocate(
        &self,
        args: &BTreeMap<String, HostArray>,
    ) -> BackendResult<BTreeMap<String, HostArray>> {
        let mut memory = BTreeMap::new();
        for (name, desc) in self.sdfg.arrays() {
            let array = if let Some(value) = self.sdfg.constants().get(name) {
                value.clone()
            } else if desc.transient {
                HostArray::for_descriptor(desc)
            } else {
                let arg = args.get(name).ok_or_else(|| {
                    BackendError::execution(format!(
                        "'{}' was called without argument '{name}'",
                        self.sdfg.name()
                    ))
                })?;
                if arg.dtype() != desc.dtype || arg.shape() != desc.shape.as_slice() {
                    return Err(BackendError::execution(format!(
                        "argument '{name}' is {}{:?}, expected {desc}",
                        arg.dtype(),
                        arg.shape()
                    )));
                }
                arg.clone()
            };
            memory.insert(name.clone(), array);
        }
        Ok(memory)
    }

    fn next_state(
        &self,
        current: StateId,
        memory: &BTreeMap<String, HostArray>,
        symbols: &mut BTreeMap<String, i64>,
    ) -> BackendResult<Option<StateId>> {
        for edge in self.sdfg.out_edges(current) {
            let taken = match &edge.condition {
                None => true,
                Some(condition) => {
                    let lhs = match &condition.lhs {
                        SymbolOperand::Const(value) => *value,
                        SymbolOperand::Symbol(name) => {
                            *symbols.get(name).ok_or_else(|| {
                                BackendError::execution(format!("symbol '{name}' is unset"))
                            })?
                        }
                    };
                    lhs == condition.rhs
                }
            };
            if !taken {
                continue;
            }
            let mut assigned = Vec::with_capacity(edge.assignments.len());
            for (symbol, value) in &edge.assignments {
                let value = match value {
                    SymbolValue::Const(value) => *value,
                    SymbolValue::Element(memlet) => {
                        read_element(memory, memlet, &|name: &str| symbols.get(name).copied())?
                            .as_i64()
                    }
                };
                assigned.push((symbol.clone(), value));
            }
            symbols.extend(assigned);
            return Ok(Some(edge.dst));
        }
        Ok(None)
    }

    fn run_node(
        &self,
        node: &Node,
        memory: &mut BTreeMap<String, HostArray>,
        symbols: &BTreeMap<String, i64>,
    ) -> BackendResult<()> {
        match node {
            Node::Copy(copy) => run_copy(copy, memory, symbols),
            Node::Map(map) => run_map(map, memory, symbols),
            Node::Nested(nested) => run_nested(nested, memory, symbols),
        }
    }
}

impl CompiledProgram for Program {
    fn call(&self, args: &mut BTreeMap<String, HostArray>) -> BackendResult<()> {
        self.run(args, BTreeMap::new())
    }
}

fn prepare_node(node: &DataflowNode) -> BackendResult<Node> {
    match node {
        DataflowNode::Copy(copy) => Ok(Node::Copy(copy.clone())),
        DataflowNode::MappedTasklet(tasklet) => {
            let body = Assignment::parse(&tasklet.code)?;
            let output = tasklet.outputs.get(&body.target).cloned().ok_or_else(|| {
                BackendError::execution(format!(
                    "tasklet '{}' assigns '{}' which is not an output connector",
                    tasklet.label, body.target
                ))
            })?;
            if tasklet.outputs.len() != 1 {
                return Err(BackendError::unimplemented(
                    "tasklet",
                    format!("'{}' has {} outputs", tasklet.label, tasklet.outputs.len()),
                ));
            }
            Ok(Node::Map(Box::new(MapNode {
                tasklet: tasklet.clone(),
                body,
                output,
            })))
        }
        DataflowNode::Nested(nested) => Ok(Node::Nested(Box::new(NestedNode {
            label: nested.label.clone(),
            program: Program::compile(&nested.sdfg)?,
            inputs: nested.inputs.clone(),
            outputs: nested.outputs.clone(),
            symbol_mapping: nested.symbol_mapping.clone(),
        }))),
    }
}

fn array<'m>(memory: &'m BTreeMap<String, HostArray>, name: &str) -> BackendResult<&'m HostArray> {
    memory
        .get(name)
        .ok_or_else(|| BackendError::execution(format!("unknown array '{name}'")))
}

fn array_mut<'m>(
    memory: &'m mut BTreeMap<String, HostArray>,
    name: &str,
) -> BackendResult<&'m mut HostArray> {
    memory
        .get_mut(name)
        .ok_or_else(|| BackendError::execution(format!("unknown array '{name}'")))
}

fn buffer_offset(array: &HostArray, name: &str, index: &[i64]) -> BackendResult<usize> {
    let unsigned: Option<Vec<usize>> = index
        .iter()
        .map(|&i| usize::try_from(i).ok())
        .collect();
    unsigned
        .and_then(|index| array.offset_of(&index))
        .ok_or_else(|| {
            BackendError::execution(format!(
                "index {index:?} is out of bounds for '{name}' of shape {:?}",
                array.shape()
            ))
        })
}

/// Evaluates an element memlet to a multi-index.
fn element_index(
    memlet: &Memlet,
    lookup: &dyn Fn(&str) -> Option<i64>,
) -> BackendResult<Vec<i64>> {
    memlet
        .subset
        .iter()
        .map(|sub| match sub {
            Subscript::Index(expr) => expr.eval(lookup).ok_or_else(|| {
                BackendError::execution(format!("unbound symbol in memlet {memlet}"))
            }),
            Subscript::Range { .. } => Err(BackendError::execution(format!(
                "memlet {memlet} is not a single element"
            ))),
        })
        .collect()
}

fn read_element(
    memory: &BTreeMap<String, HostArray>,
    memlet: &Memlet,
    lookup: &dyn Fn(&str) -> Option<i64>,
) -> BackendResult<ScalarValue> {
    let index = element_index(memlet, lookup)?;
    let source = array(memory, &memlet.data)?;
    Ok(source.get(buffer_offset(source, &memlet.data, &index)?))
}

/// All multi-indices of a subset in row-major order.
fn subset_indices(
    memlet: &Memlet,
    lookup: &dyn Fn(&str) -> Option<i64>,
) -> BackendResult<Vec<Vec<i64>>> {
    let mut axes: Vec<(i64, i64)> = Vec::with_capacity(memlet.subset.len());
    for sub in &memlet.subset {
        match sub {
            Subscript::Index(expr) => {
                let at = expr.eval(lookup).ok_or_else(|| {
                    BackendError::execution(format!("unbound symbol in memlet {memlet}"))
                })?;
                axes.push((at, at + 1));
            }
            Subscript::Range { start, end } => axes.push((*start, *end)),
        }
    }
    let mut indices = Vec::with_capacity(memlet.volume());
    if axes.iter().any(|(start, end)| end <= start) {
        return Ok(indices);
    }
    let mut current: Vec<i64> = axes.iter().map(|(start, _)| *start).collect();
    loop {
        indices.push(current.clone());
        let mut dim = axes.len();
        loop {
            if dim == 0 {
                return Ok(indices);
            }
            dim -= 1;
            current[dim] += 1;
            if current[dim] < axes[dim].1 {
                break;
            }
            current[dim] = axes[dim].0;
        }
    }
}

fn run_copy(
    copy: &CopyNode,
    memory: &mut BTreeMap<String, HostArray>,
    symbols: &BTreeMap<String, i64>,
) -> BackendResult<()> {
    let lookup = |name: &str| symbols.get(name).copied();
    let src_indices = subset_indices(&copy.src, &lookup)?;
    let dst_indices = subset_indices(&copy.dst, &lookup)?;
    if src_indices.len() != dst_indices.len() {
        return Err(BackendError::execution(format!(
            "copy {} -> {} moves {} elements into {}",
            copy.src,
            copy.dst,
            src_indices.len(),
            dst_indices.len()
        )));
    }
    let source = array(memory, &copy.src.data)?;
    let values = src_indices
        .iter()
        .map(|index| Ok(source.get(buffer_offset(source, &copy.src.data, index)?)))
        .collect::<BackendResult<Vec<_>>>()?;
    let target = array_mut(memory, &copy.dst.data)?;
    for (index, value) in dst_indices.iter().zip(values) {
        let offset = buffer_offset(target, &copy.dst.data, index)?;
        target.set(offset, value);
    }
    Ok(())
}

/// Names visible to one tasklet invocation.
struct PointScope<'a> {
    memory: &'a BTreeMap<String, HostArray>,
    /// Scalar connectors already read for this point.
    scalars: &'a BTreeMap<String, ScalarValue>,
    /// Array connectors: connector name to array name and range offsets.
    arrays: &'a BTreeMap<String, (String, Vec<i64>)>,
    symbols: &'a BTreeMap<String, i64>,
}

impl Scope for PointScope<'_> {
    fn value(&self, name: &str) -> Option<ScalarValue> {
        self.scalars
            .get(name)
            .copied()
            .or_else(|| self.symbols.get(name).map(|v| ScalarValue::Int(*v)))
    }

    fn element(&self, name: &str, index: &[i64]) -> BackendResult<ScalarValue> {
        let (data, offsets) = self.arrays.get(name).ok_or_else(|| {
            BackendError::execution(format!("'{name}' is not an array connector"))
        })?;
        if index.len() != offsets.len() {
            return Err(BackendError::execution(format!(
                "'{name}' indexed with {} subscripts, expected {}",
                index.len(),
                offsets.len()
            )));
        }
        let absolute: Vec<i64> = index.iter().zip(offsets).map(|(i, o)| i + o).collect();
        let source = array(self.memory, data)?;
        Ok(source.get(buffer_offset(source, data, &absolute)?))
    }
}

fn run_map(
    map: &MapNode,
    memory: &mut BTreeMap<String, HostArray>,
    symbols: &BTreeMap<String, i64>,
) -> BackendResult<()> {
    let tasklet = &map.tasklet;
    let mut env = symbols.clone();
    for (symbol, memlet) in &tasklet.dynamic_inputs {
        let value = read_element(memory, memlet, &|name: &str| env.get(name).copied())?;
        env.insert(symbol.clone(), value.as_i64());
    }

    let mut element_inputs: Vec<(&String, &Memlet)> = Vec::new();
    let mut array_inputs: BTreeMap<String, (String, Vec<i64>)> = BTreeMap::new();
    for (connector, memlet) in &tasklet.inputs {
        let ranges: Option<Vec<i64>> = memlet
            .subset
            .iter()
            .map(|sub| match sub {
                Subscript::Range { start, .. } => Some(*start),
                Subscript::Index(_) => None,
            })
            .collect();
        match ranges {
            Some(offsets) if !offsets.is_empty() => {
                array_inputs.insert(connector.clone(), (memlet.data.clone(), offsets));
            }
            _ => element_inputs.push((connector, memlet)),
        }
    }

    let map_range = Memlet::new(
        String::new(),
        tasklet
            .ranges
            .iter()
            .map(|range| Subscript::Range {
                start: range.start,
                end: range.end,
            })
            .collect(),
    );
    let points = subset_indices(&map_range, &|_: &str| None)?;
    let mut scalars: BTreeMap<String, ScalarValue> = BTreeMap::new();
    for point in points {
        for (range, value) in tasklet.ranges.iter().zip(&point) {
            env.insert(range.param.clone(), *value);
        }
        scalars.clear();
        for (connector, memlet) in &element_inputs {
            let value = read_element(memory, memlet, &|name: &str| env.get(name).copied())?;
            scalars.insert((*connector).clone(), value);
        }
        let result = {
            let scope = PointScope {
                memory: &*memory,
                scalars: &scalars,
                arrays: &array_inputs,
                symbols: &env,
            };
            map.body.value.eval(&scope)?
        };
        let index = element_index(&map.output, &|name: &str| env.get(name).copied())?;
        let target = array_mut(memory, &map.output.data)?;
        let offset = buffer_offset(target, &map.output.data, &index)?;
        target.set(offset, result);
    }
    Ok(())
}

/// Copies the logical contents of `src` into `dst`, which may be laid out differently.
fn assign_logical(dst: &mut HostArray, src: &HostArray) -> BackendResult<()> {
    if dst.len() != src.len() {
        return Err(BackendError::execution(format!(
            "can not assign {:?} to {:?}",
            src.shape(),
            dst.shape()
        )));
    }
    for (offset, value) in dst.logical_offsets().into_iter().zip(src.values()) {
        dst.set(offset, value);
    }
    Ok(())
}

fn run_nested(
    nested: &NestedNode,
    memory: &mut BTreeMap<String, HostArray>,
    symbols: &BTreeMap<String, i64>,
) -> BackendResult<()> {
    let child = nested.program.sdfg();
    let mut args = BTreeMap::new();
    for (inner, outer) in nested.inputs.iter().chain(&nested.outputs) {
        if args.contains_key(inner) {
            continue;
        }
        let desc = child.array(inner).ok_or_else(|| {
            BackendError::execution(format!(
                "nested SDFG '{}' has no argument '{inner}'",
                nested.label
            ))
        })?;
        let mut value = HostArray::for_descriptor(desc);
        assign_logical(&mut value, array(memory, outer)?)?;
        args.insert(inner.clone(), value);
    }

    let mut child_symbols = BTreeMap::new();
    for (inner, outer) in &nested.symbol_mapping {
        let value = symbols.get(outer).ok_or_else(|| {
            BackendError::execution(format!("symbol '{outer}' is unset"))
        })?;
        child_symbols.insert(inner.clone(), *value);
    }

    nested.program.run(&mut args, child_symbols)?;

    for (inner, outer) in &nested.outputs {
        let result = args.get(inner).ok_or_else(|| {
            BackendError::execution(format!(
                "nested SDFG '{}' lost output '{inner}'",
                nested.label
            ))
        })?;
        assign_logical(array_mut(memory, outer)?, result)?;
    }
    Ok(())
}
