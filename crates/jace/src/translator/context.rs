use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Var;
use crate::sdfg::{Sdfg, StateId};

use super::naming;

static UNNAMED_SDFGS: AtomicU64 = AtomicU64::new(0);

/// Working state of one translation unit.
///
/// Owns the graph under construction, its start and terminal states, the variable map
/// and, once known, the input and output names. The builder keeps contexts on a stack;
/// a finished context is handed out by value and can only be consumed by the
/// post-processing functions.
#[derive(Debug)]
pub struct TranslationContext {
    pub(crate) sdfg: Sdfg,
    pub(crate) inp_names: Option<Vec<String>>,
    pub(crate) out_names: Option<Vec<String>>,
    pub(crate) start_state: StateId,
    pub(crate) terminal_state: StateId,
    pub(crate) var_map: HashMap<Var, String>,
}

impl TranslationContext {
    pub(crate) fn new(name: Option<&str>) -> JaceResult<Self> {
        let name = match name {
            Some(name) if !naming::is_valid_name(name) => {
                return Err(JaceError::naming(format!("'{name}' is not a valid SDFG name")));
            }
            Some(name) => name.to_string(),
            None => format!(
                "unnamed_SDFG_{}",
                UNNAMED_SDFGS.fetch_add(1, Ordering::Relaxed)
            ),
        };
        let sdfg = Sdfg::new(name);
        let start = sdfg.start_state();
        Ok(Self {
            sdfg,
            inp_names: None,
            out_names: None,
            start_state: start,
            terminal_state: start,
            var_map: HashMap::new(),
        })
    }

    pub fn sdfg(&self) -> &Sdfg {
        &self.sdfg
    }

    pub fn inp_names(&self) -> &[String] {
        self.inp_names.as_deref().unwrap_or_default()
    }

    pub fn out_names(&self) -> &[String] {
        self.out_names.as_deref().unwrap_or_default()
    }

    pub fn start_state(&self) -> StateId {
        self.start_state
    }

    pub fn terminal_state(&self) -> StateId {
        self.terminal_state
    }

    /// Checks the bookkeeping of the unfinished graph; the graph itself is not validated.
    pub fn validate(&self) -> JaceResult<()> {
        let fail = |msg: String| {
            Err(JaceError::invariant(format!(
                "translation context of '{}': {msg}",
                self.sdfg.name()
            )))
        };
        if self.start_state != self.sdfg.start_state() {
            return fail(format!(
                "expected start state {} but the graph starts at {}",
                self.start_state,
                self.sdfg.start_state()
            ));
        }
        let sinks = self.sdfg.sink_states();
        if sinks != [self.terminal_state] {
            return fail(format!(
                "expected {} as the only terminal state, found {sinks:?}",
                self.terminal_state
            ));
        }
        for (kind, names) in [("input", &self.inp_names), ("output", &self.out_names)] {
            let Some(names) = names else { continue };
            if let Some(missing) = names.iter().find(|n| !self.sdfg.contains_array(n)) {
                return fail(format!("{kind} '{missing}' is not an array of the graph"));
            }
        }
        Ok(())
    }
}
