//! Stateful dataflow graph (SDFG) model targeted by the translator.
//!
//! An [`Sdfg`] is a state machine. Each [`State`] holds an ordered list of dataflow units
//! (copies, mapped tasklets and nested graphs) that read and write named arrays described
//! by [`DataDescriptor`]s. Interstate edges carry an optional [`Condition`] and symbol
//! assignments. The model exposes exactly the graph-building surface the translator
//! needs plus the hooks consumed downstream: [`Sdfg::validate`], [`Sdfg::simplify`],
//! [`Sdfg::free_symbols`] and a textual dump.

mod data;
mod display;
mod dtype;
mod graph;
mod memlet;
mod simplify;
mod validate;

pub use data::{row_major_strides, DataDescriptor, StorageType};
pub use dtype::DType;
pub use graph::{
    Condition, CopyNode, DataflowNode, InterstateEdge, MappedTasklet, NestedSdfgNode, Sdfg,
    State, StateId, SymbolOperand, SymbolValue,
};
pub use memlet::{IndexExpr, MapRange, Memlet, Subscript};
