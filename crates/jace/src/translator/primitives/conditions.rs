use std::collections::BTreeMap;

use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Equation;
use crate::sdfg::{Condition, DType, IndexExpr, Memlet, StateId, SymbolOperand, SymbolValue};
use crate::translator::post_translation::{add_nested_sdfg, promote_literals_to_constants};
use crate::translator::{PrimitiveTranslator, TranslationBuilder};

/// `cond` with an integer selector, a switch without default branch.
///
/// The selector is bound to the symbol `{selector}_symb` on the edge into a fork state;
/// a literal selector is used as is. Every branch is translated in its own context and
/// embedded in a state guarded by `selector == i`, after which all branches meet in a
/// join state that becomes the new terminal state. A selector outside the branch range is
/// undefined behaviour.
pub struct CondTranslator;

impl PrimitiveTranslator for CondTranslator {
    fn primitive(&self) -> &str {
        "cond"
    }

    fn translate(
        &self,
        builder: &mut TranslationBuilder,
        in_names: &[Option<String>],
        out_names: &mut Vec<String>,
        eqn: &Equation,
        eqn_state: StateId,
    ) -> JaceResult<Option<StateId>> {
        let Some(selector) = eqn.invars.first() else {
            return Err(JaceError::invariant("cond without a selector"));
        };
        if selector.dtype() == DType::Bool {
            return Err(JaceError::unsupported("cond with a boolean selector"));
        }
        let branches = eqn.params.jaxprs("branches")?;
        let pattern = builder.sdfg()?.state(eqn_state).label.clone();

        let branch_inputs =
            promote_literals_to_constants(builder, &in_names[1..], &eqn.invars[1..], &pattern)?;

        let (selection, selection_state) = match (&in_names[0], selector.as_literal()) {
            (None, Some(lit)) => (SymbolOperand::Const(lit.value().value().as_i64()), eqn_state),
            (Some(name), _) => {
                let symbol = format!("{name}_symb");
                let assignment = SymbolValue::Element(Memlet::element(
                    name,
                    vec![IndexExpr::constant(0)],
                ));
                let fork = builder.append_new_node(
                    Some(&format!("{pattern}_fork")),
                    None,
                    BTreeMap::from([(symbol.clone(), assignment)]),
                    Some(eqn_state),
                )?;
                builder.sdfg_mut()?.add_symbol(symbol.clone(), DType::I64);
                (SymbolOperand::Symbol(symbol), fork)
            }
            (None, None) => {
                return Err(JaceError::invariant("the cond selector has no array"));
            }
        };

        let mut branch_states = Vec::with_capacity(branches.len());
        for (i, branch) in branches.iter().enumerate() {
            let child = builder.translate(branch, Some(&format!("{pattern}_sdfg_branch_{i}")))?;
            // Only the first branch state moves the terminal state.
            let state = builder.append_new_node(
                Some(&format!("{pattern}_state_branch_{i}")),
                Some(Condition::equals(selection.clone(), i as i64)),
                BTreeMap::new(),
                Some(selection_state),
            )?;
            add_nested_sdfg(builder, state, &child, &branch_inputs, out_names)?;
            branch_states.push(state);
        }

        let Some((&first, rest)) = branch_states.split_first() else {
            return Err(JaceError::invariant("cond without branches"));
        };
        let join = builder.append_new_node(
            Some(&format!("{pattern}_join")),
            None,
            BTreeMap::new(),
            Some(first),
        )?;
        let sdfg = builder.sdfg_mut()?;
        for &state in rest {
            sdfg.add_edge(state, join, None, BTreeMap::new());
        }
        Ok(Some(join))
    }
}
