//! The single black-box cleanup pass applied before compilation.

use super::{InterstateEdge, Sdfg, StateId};

impl Sdfg {
    /// Removes empty pass-through states and fuses linear chains of states.
    ///
    /// Returns the number of states that were eliminated. Observable results never change
    /// and the state count never grows.
    pub fn simplify(&mut self) -> usize {
        let before = self.number_of_nodes();
        loop {
            if self.drop_empty_start() || self.drop_pass_through_state() || self.fuse_chain() {
                continue;
            }
            break;
        }
        for state in &mut self.states {
            for node in &mut state.nodes {
                if let super::DataflowNode::Nested(nested) = node {
                    nested.sdfg.simplify();
                }
            }
        }
        let removed = before - self.number_of_nodes();
        log::debug!("simplify({}): removed {removed} states", self.name);
        removed
    }

    /// An empty start state whose only successor has no other predecessor.
    fn drop_empty_start(&mut self) -> bool {
        let start = self.start_state;
        if !self.state(start).is_empty() || self.in_degree(start) != 0 {
            return false;
        }
        let outs: Vec<&InterstateEdge> = self.out_edges(start).collect();
        let [edge] = outs.as_slice() else {
            return false;
        };
        if !edge.is_plain() || self.in_degree(edge.dst) != 1 {
            return false;
        }
        let next = edge.dst;
        self.start_state = next;
        self.remove_state(start).is_ok()
    }

    /// An empty state with one in-edge and one out-edge, at least one of them plain.
    fn drop_pass_through_state(&mut self) -> bool {
        let candidate = self.states().map(|(id, _)| id).find(|&id| {
            if id == self.start_state || !self.state(id).is_empty() {
                return false;
            }
            let ins: Vec<&InterstateEdge> = self.in_edges(id).collect();
            let outs: Vec<&InterstateEdge> = self.out_edges(id).collect();
            match (ins.as_slice(), outs.as_slice()) {
                ([inc], [out]) => {
                    (inc.is_plain() || out.is_plain())
                        && inc.src != id
                        && out.dst != id
                        && !self.has_edge(inc.src, out.dst)
                }
                _ => false,
            }
        });
        let Some(id) = candidate else {
            return false;
        };
        let inc = self
            .in_edges(id)
            .next()
            .cloned()
            .expect("pass-through state has one in-edge");
        let out = self
            .out_edges(id)
            .next()
            .cloned()
            .expect("pass-through state has one out-edge");
        let payload = if inc.is_plain() { &out } else { &inc };
        let merged = InterstateEdge {
            src: inc.src,
            dst: out.dst,
            condition: payload.condition.clone(),
            assignments: payload.assignments.clone(),
        };
        self.edges.push(merged);
        self.remove_state(id).is_ok()
    }

    /// `a -> b` plain, `a` has no other successor and `b` no other predecessor.
    fn fuse_chain(&mut self) -> bool {
        let candidate = self.edges.iter().position(|edge| {
            edge.is_plain()
                && edge.src != edge.dst
                && edge.dst != self.start_state
                && self.out_degree(edge.src) == 1
                && self.in_degree(edge.dst) == 1
        });
        let Some(edge_idx) = candidate else {
            return false;
        };
        let edge = self.edges.remove(edge_idx);
        let (head, tail) = (edge.src, edge.dst);
        let moved = std::mem::take(&mut self.state_mut(tail).nodes);
        self.state_mut(head).nodes.extend(moved);
        for edge in &mut self.edges {
            if edge.src == tail {
                edge.src = head;
            }
        }
        self.remove_state(tail).is_ok()
    }

    fn has_edge(&self, src: StateId, dst: StateId) -> bool {
        self.edges.iter().any(|e| e.src == src && e.dst == dst)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::sdfg::{Condition, DType, DataDescriptor, Memlet, Sdfg, SymbolOperand};

    fn chain(len: usize) -> Sdfg {
        let mut sdfg = Sdfg::new("chain");
        sdfg.add_array("a", DataDescriptor::array(vec![4], DType::F64))
            .unwrap();
        sdfg.add_array("b", DataDescriptor::array(vec![4], DType::F64))
            .unwrap();
        let mut prev = sdfg.start_state();
        for i in 0..len {
            let next = sdfg.add_state(format!("s{i}"));
            if i % 2 == 0 {
                let desc = sdfg.array("a").unwrap().clone();
                sdfg.state_mut(next)
                    .add_copy(Memlet::full("a", &desc), Memlet::full("b", &desc));
            }
            sdfg.add_edge(prev, next, None, BTreeMap::new());
            prev = next;
        }
        sdfg
    }

    #[test]
    fn linear_chain_collapses_into_one_state() {
        let mut sdfg = chain(5);
        assert_eq!(sdfg.number_of_nodes(), 6);
        let removed = sdfg.simplify();
        assert_eq!(removed, 5);
        assert_eq!(sdfg.number_of_nodes(), 1);
        assert_eq!(sdfg.number_of_dataflow_nodes(), 3);
        sdfg.validate().unwrap();
    }

    #[test]
    fn branches_survive() {
        let mut sdfg = Sdfg::new("branchy");
        sdfg.add_symbol("sel", DType::I64);
        let start = sdfg.start_state();
        let left = sdfg.add_state("left");
        let right = sdfg.add_state("right");
        let join = sdfg.add_state("join");
        let cond = |v| Some(Condition::equals(SymbolOperand::Symbol("sel".into()), v));
        sdfg.add_edge(start, left, cond(0), BTreeMap::new());
        sdfg.add_edge(start, right, cond(1), BTreeMap::new());
        sdfg.add_edge(left, join, None, BTreeMap::new());
        sdfg.add_edge(right, join, None, BTreeMap::new());
        sdfg.simplify();
        assert!(sdfg.number_of_nodes() >= 2);
        assert_eq!(sdfg.sink_states().len(), 1);
    }
}
