//! Structural validation and free-symbol analysis.

use std::collections::BTreeSet;

use crate::error::{JaceError, JaceResult};

use super::{
    DataflowNode, MappedTasklet, Memlet, NestedSdfgNode, Sdfg, StateId, Subscript, SymbolOperand,
    SymbolValue,
};

impl Sdfg {
    /// Checks that the graph is well formed.
    ///
    /// Every memlet must reference a known array with a subset of matching rank whose
    /// constant parts stay in bounds, every state must be reachable from the start state,
    /// and once `arg_names` is set it must list exactly the non-transient arrays.
    pub fn validate(&self) -> JaceResult<()> {
        let fail = |msg: String| Err(JaceError::validation(format!("SDFG '{}': {msg}", self.name)));

        if !self.contains_state(self.start_state) {
            return fail(format!("start state {} does not exist", self.start_state));
        }
        for edge in &self.edges {
            if !self.contains_state(edge.src) || !self.contains_state(edge.dst) {
                return fail(format!("edge {} -> {} has a dangling end", edge.src, edge.dst));
            }
            for (symbol, value) in &edge.assignments {
                if self.arrays.contains_key(symbol) {
                    return fail(format!("symbol '{symbol}' shadows an array"));
                }
                if let SymbolValue::Element(memlet) = value {
                    self.check_memlet(memlet, &BTreeSet::new())?;
                    if memlet.subset.iter().any(|s| !matches!(s, Subscript::Index(e) if e.is_constant())) {
                        return fail(format!("assignment of '{symbol}' must read one constant element"));
                    }
                }
            }
        }
        let reachable = self.reachable_states().len();
        if reachable != self.states.len() {
            return fail(format!(
                "{} of {} states are unreachable from the start state",
                self.states.len() - reachable,
                self.states.len()
            ));
        }

        for (id, state) in self.states() {
            for node in &state.nodes {
                self.check_node(id, node)?;
            }
        }

        for name in self.constants.keys() {
            match self.arrays.get(name) {
                Some(desc) if desc.transient => {}
                Some(_) => return fail(format!("constant '{name}' is not transient")),
                None => return fail(format!("constant '{name}' has no descriptor")),
            }
        }

        if !self.arg_names.is_empty() {
            let mut seen = BTreeSet::new();
            for arg in &self.arg_names {
                if !seen.insert(arg.as_str()) {
                    return fail(format!("argument '{arg}' is listed twice"));
                }
                match self.arrays.get(arg) {
                    Some(desc) if !desc.transient => {}
                    Some(_) => return fail(format!("argument '{arg}' is transient")),
                    None => return fail(format!("argument '{arg}' is not an array")),
                }
            }
            for (name, desc) in &self.arrays {
                if !desc.transient && !seen.contains(name.as_str()) {
                    return fail(format!("non-transient array '{name}' is not an argument"));
                }
            }
        }
        Ok(())
    }

    fn check_node(&self, state: StateId, node: &DataflowNode) -> JaceResult<()> {
        match node {
            DataflowNode::Copy(copy) => {
                let locals = BTreeSet::new();
                self.check_memlet(&copy.src, &locals)?;
                self.check_memlet(&copy.dst, &locals)?;
                if copy.src.volume() != copy.dst.volume() {
                    return Err(JaceError::validation(format!(
                        "SDFG '{}', state {state}: copy {} -> {} moves {} into {} elements",
                        self.name,
                        copy.src,
                        copy.dst,
                        copy.src.volume(),
                        copy.dst.volume()
                    )));
                }
                Ok(())
            }
            DataflowNode::MappedTasklet(tasklet) => self.check_tasklet(state, tasklet),
            DataflowNode::Nested(nested) => self.check_nested(state, nested),
        }
    }

    fn check_tasklet(&self, state: StateId, tasklet: &MappedTasklet) -> JaceResult<()> {
        let fail = |msg: String| {
            Err(JaceError::validation(format!(
                "SDFG '{}', state {state}, tasklet '{}': {msg}",
                self.name, tasklet.label
            )))
        };
        if tasklet.outputs.is_empty() {
            return fail("tasklet has no output".to_string());
        }
        if !tasklet.code.contains('=') {
            return fail(format!("code `{}` is not an assignment", tasklet.code));
        }
        let mut locals: BTreeSet<&str> = BTreeSet::new();
        for range in &tasklet.ranges {
            if range.end < range.start {
                return fail(format!("empty range {range}"));
            }
            if !locals.insert(range.param.as_str()) {
                return fail(format!("map parameter '{}' is used twice", range.param));
            }
        }
        for (symbol, memlet) in &tasklet.dynamic_inputs {
            self.check_memlet(memlet, &BTreeSet::new())?;
            if memlet.volume() != 1 {
                return fail(format!("dynamic input '{symbol}' must read a single element"));
            }
            locals.insert(symbol.as_str());
        }
        for memlet in tasklet.inputs.values().chain(tasklet.outputs.values()) {
            self.check_memlet(memlet, &locals)?;
        }
        Ok(())
    }

    fn check_nested(&self, state: StateId, nested: &NestedSdfgNode) -> JaceResult<()> {
        let fail = |msg: String| {
            Err(JaceError::validation(format!(
                "SDFG '{}', state {state}, nested '{}': {msg}",
                self.name, nested.label
            )))
        };
        nested.sdfg.validate()?;
        for (inner, outer) in nested.inputs.iter().chain(nested.outputs.iter()) {
            let Some(outer_desc) = self.arrays.get(outer) else {
                return fail(format!("outer array '{outer}' does not exist"));
            };
            let Some(inner_desc) = nested.sdfg.array(inner) else {
                return fail(format!("connector '{inner}' is not an array of the child"));
            };
            if inner_desc.transient {
                return fail(format!("connector '{inner}' is transient inside the child"));
            }
            if inner_desc.element_count() != outer_desc.element_count()
                || inner_desc.dtype != outer_desc.dtype
            {
                return fail(format!("connector '{inner}' does not match outer '{outer}'"));
            }
        }
        for child_symbol in nested.sdfg.free_symbols() {
            if !nested.symbol_mapping.contains_key(&child_symbol) {
                return fail(format!("child symbol '{child_symbol}' is not mapped"));
            }
        }
        Ok(())
    }

    fn check_memlet(&self, memlet: &Memlet, locals: &BTreeSet<&str>) -> JaceResult<()> {
        let fail = |msg: String| Err(JaceError::validation(format!("SDFG '{}': {msg}", self.name)));
        let Some(desc) = self.arrays.get(&memlet.data) else {
            return fail(format!("memlet {memlet} references an unknown array"));
        };
        if memlet.subset.len() != desc.rank() {
            return fail(format!(
                "memlet {memlet} has rank {} but '{}' has rank {}",
                memlet.subset.len(),
                memlet.data,
                desc.rank()
            ));
        }
        for (dim, (sub, &extent)) in memlet.subset.iter().zip(&desc.shape).enumerate() {
            match sub {
                Subscript::Range { start, end } => {
                    if *start < 0 || *end > extent as i64 || start > end {
                        return fail(format!("memlet {memlet} is out of bounds in dimension {dim}"));
                    }
                }
                Subscript::Index(expr) if expr.is_constant() => {
                    if expr.offset < 0 || expr.offset >= extent as i64 {
                        return fail(format!("memlet {memlet} is out of bounds in dimension {dim}"));
                    }
                }
                Subscript::Index(expr) => {
                    for symbol in &expr.symbols {
                        if !locals.contains(symbol.as_str()) && !self.symbols.contains_key(symbol) {
                            return fail(format!("memlet {memlet} uses unknown symbol '{symbol}'"));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Symbols that are used but never bound.
    ///
    /// Map parameters and dynamic map inputs bind locally; interstate assignments bind
    /// globally. Declared symbols that nothing assigns are free.
    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut used: BTreeSet<String> = self.symbols.keys().cloned().collect();
        let mut defined: BTreeSet<String> = BTreeSet::new();

        for edge in &self.edges {
            defined.extend(edge.assignments.keys().cloned());
            if let Some(cond) = &edge.condition {
                if let SymbolOperand::Symbol(name) = &cond.lhs {
                    used.insert(name.clone());
                }
            }
        }
        for state in &self.states {
            for node in &state.nodes {
                match node {
                    DataflowNode::Copy(copy) => {
                        used.extend(copy.src.symbols().map(str::to_string));
                        used.extend(copy.dst.symbols().map(str::to_string));
                    }
                    DataflowNode::MappedTasklet(tasklet) => {
                        let locals: BTreeSet<&str> = tasklet
                            .ranges
                            .iter()
                            .map(|r| r.param.as_str())
                            .chain(tasklet.dynamic_inputs.keys().map(String::as_str))
                            .collect();
                        for memlet in tasklet.inputs.values().chain(tasklet.outputs.values()) {
                            used.extend(
                                memlet
                                    .symbols()
                                    .filter(|s| !locals.contains(s))
                                    .map(str::to_string),
                            );
                        }
                    }
                    DataflowNode::Nested(nested) => {
                        used.extend(nested.symbol_mapping.values().cloned());
                    }
                }
            }
        }
        used.difference(&defined).cloned().collect()
    }
}
