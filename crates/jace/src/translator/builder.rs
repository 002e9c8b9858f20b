use std::collections::{BTreeMap, HashMap};

use crate::env;
use crate::error::{JaceError, JaceResult};
use crate::jaxpr::{Atom, ClosedJaxpr, Equation, Var};
use crate::sdfg::{Condition, DataDescriptor, Memlet, Sdfg, StateId, SymbolValue};

use super::context::TranslationContext;
use super::naming;
use super::registry::PrimitiveTranslatorRegistry;

/// Prefix of the arrays that hold jaxpr constants.
pub const CONSTANT_PREFIX: &str = "__const_";
/// Prefix of the alias outputs created for equation-free jaxprs.
pub const NULL_OUTPUT_PREFIX: &str = "_zero_equation_output_for_";

/// Controls [`TranslationBuilder::resolve_or_create`].
#[derive(Debug, Clone, Copy, Default)]
pub struct VarListOptions {
    /// Every variable must already be mapped.
    pub prevent_creation: bool,
    /// No variable may be mapped yet.
    pub only_creation: bool,
    /// Literals are passed through as `None` instead of being rejected.
    pub allow_literals: bool,
    /// Record newly created arrays in the variable map.
    pub update_mapping: bool,
    pub name_prefix: Option<&'static str>,
}

/// Turns jaxprs into canonical SDFGs.
///
/// The builder owns a stack of [`TranslationContext`]s. [`TranslationBuilder::translate`]
/// pushes a fresh context, so a translator that is itself running inside a translation
/// can translate a nested jaxpr without disturbing the outer one. Names synthesized for
/// unnamed variables come from one counter shared by all contexts of a translation; it
/// is reset when the outermost context is popped.
pub struct TranslationBuilder {
    registry: PrimitiveTranslatorRegistry,
    ctx_stack: Vec<TranslationContext>,
    family_names: usize,
}

impl TranslationBuilder {
    pub fn new(registry: PrimitiveTranslatorRegistry) -> Self {
        Self {
            registry,
            ctx_stack: Vec::new(),
            family_names: 0,
        }
    }

    pub fn registry(&self) -> &PrimitiveTranslatorRegistry {
        &self.registry
    }

    /// Translates `jaxpr` in a new context and returns that context, unfinished.
    pub fn translate(
        &mut self,
        jaxpr: &ClosedJaxpr,
        name: Option<&str>,
    ) -> JaceResult<TranslationContext> {
        if !jaxpr.effects().is_empty() {
            return Err(JaceError::unsupported(format!(
                "jaxpr with side effects {:?}",
                jaxpr.effects()
            )));
        }
        self.push_context(name)?;
        log::debug!(
            "translate '{}': {} equations, depth {}",
            self.sdfg()?.name(),
            jaxpr.eqns().len(),
            self.ctx_stack.len()
        );
        let outcome = self.translate_allocated(jaxpr);
        let mut ctx = self
            .pop_context()
            .ok_or_else(|| JaceError::invariant("translation context vanished"))?;
        ctx.out_names = Some(outcome?);
        log::debug!(
            "translated '{}': {} states, {} arrays",
            ctx.sdfg.name(),
            ctx.sdfg.number_of_nodes(),
            ctx.sdfg.arrays().len()
        );
        Ok(ctx)
    }

    /// Starts a new, empty translation unit on top of the stack.
    pub fn push_context(&mut self, name: Option<&str>) -> JaceResult<()> {
        self.ctx_stack.push(TranslationContext::new(name)?);
        Ok(())
    }

    /// Removes the active translation unit and returns it.
    pub fn pop_context(&mut self) -> Option<TranslationContext> {
        if self.ctx_stack.len() == 1 {
            self.family_names = 0;
        }
        self.ctx_stack.pop()
    }

    pub fn is_allocated(&self) -> bool {
        !self.ctx_stack.is_empty()
    }

    pub fn is_root_translator(&self) -> JaceResult<bool> {
        if !self.is_allocated() {
            return Err(JaceError::invariant("builder is not allocated"));
        }
        Ok(self.ctx_stack.len() == 1)
    }

    fn ctx(&self) -> JaceResult<&TranslationContext> {
        self.ctx_stack
            .last()
            .ok_or_else(|| JaceError::invariant("builder has no active translation context"))
    }

    fn ctx_mut(&mut self) -> JaceResult<&mut TranslationContext> {
        self.ctx_stack
            .last_mut()
            .ok_or_else(|| JaceError::invariant("builder has no active translation context"))
    }

    /// Read access to the active context.
    pub fn context(&self) -> JaceResult<&TranslationContext> {
        self.ctx()
    }

    pub fn sdfg(&self) -> JaceResult<&Sdfg> {
        Ok(&self.ctx()?.sdfg)
    }

    pub fn sdfg_mut(&mut self) -> JaceResult<&mut Sdfg> {
        Ok(&mut self.ctx_mut()?.sdfg)
    }

    pub fn start_state(&self) -> JaceResult<StateId> {
        Ok(self.ctx()?.start_state)
    }

    pub fn terminal_state(&self) -> JaceResult<StateId> {
        Ok(self.ctx()?.terminal_state)
    }

    pub fn arrays(&self) -> JaceResult<&BTreeMap<String, DataDescriptor>> {
        Ok(self.sdfg()?.arrays())
    }

    pub fn array(&self, name: &str) -> JaceResult<&DataDescriptor> {
        self.sdfg()?
            .array(name)
            .ok_or_else(|| JaceError::naming(format!("array '{name}' is not known")))
    }

    /// Creates a new state with an edge from `after`, by default the terminal state.
    ///
    /// The terminal state only moves to the new state when it is appended to the
    /// terminal state; appending elsewhere creates a branch.
    pub fn append_new_node(
        &mut self,
        label: Option<&str>,
        condition: Option<Condition>,
        assignments: BTreeMap<String, SymbolValue>,
        after: Option<StateId>,
    ) -> JaceResult<StateId> {
        if let Some(label) = label {
            if !naming::is_valid_name(label) {
                return Err(JaceError::naming(format!(
                    "can not create a state with the invalid label '{label}'"
                )));
            }
        }
        let ctx = self.ctx_mut()?;
        let (src, advance) = match after {
            None => (ctx.terminal_state, true),
            Some(state) if !ctx.sdfg.contains_state(state) => {
                return Err(JaceError::invariant(format!("state {state} does not exist")));
            }
            Some(state) => (state, state == ctx.terminal_state),
        };
        let label = match label {
            Some(label) => label.to_string(),
            None => format!("state_{}", ctx.sdfg.number_of_nodes()),
        };
        let state = ctx.sdfg.add_state(label);
        ctx.sdfg.add_edge(src, state, condition, assignments);
        if advance {
            ctx.terminal_state = state;
        }
        Ok(state)
    }

    /// Creates a transient array for `var` and returns its name.
    ///
    /// Rank-0 variables become arrays of shape `(1,)`. Mapped variables propose their
    /// mapped name, named variables their own name, all others the next free name of the
    /// letter sequence. The name is then prefixed and must be unused, valid and allowed.
    pub fn add_array(
        &mut self,
        var: &Var,
        name_prefix: Option<&str>,
        update_mapping: bool,
    ) -> JaceResult<String> {
        if var.is_drop() {
            return Err(JaceError::naming("can not create an array for a drop variable"));
        }
        let prefix = name_prefix.unwrap_or_default();
        let name = format!("{prefix}{}", self.propose_name(var, prefix)?);
        let sdfg = self.sdfg()?;
        if sdfg.contains_array(&name) {
            return Err(JaceError::naming(format!(
                "add_array({var}): the proposed name '{name}' is used"
            )));
        }
        if !naming::is_valid_name(&name) {
            return Err(JaceError::naming(format!(
                "add_array({var}): the proposed name '{name}' is invalid"
            )));
        }
        if naming::is_forbidden_name(&name) {
            return Err(JaceError::naming(format!(
                "add_array({var}): the proposed name '{name}' is forbidden"
            )));
        }

        let shape = match var.shape() {
            [] => vec![1],
            dims => dims.to_vec(),
        };
        self.sdfg_mut()?
            .add_array(name.clone(), DataDescriptor::array(shape, var.dtype()))?;

        if update_mapping {
            if let Err(err) = self.map_variable(var, &name) {
                self.sdfg_mut()?.remove_array(&name);
                return Err(err);
            }
        }
        Ok(name)
    }

    fn propose_name(&self, var: &Var, prefix: &str) -> JaceResult<String> {
        let ctx = self.ctx()?;
        if let Some(mapped) = ctx.var_map.get(var) {
            return Ok(mapped.clone());
        }
        if let Some(explicit) = var.explicit_name() {
            return Ok(explicit.to_string());
        }
        let mut counter = self.family_names;
        loop {
            let mut name = naming::propose_name(counter);
            if naming::is_forbidden_name(&name) {
                name = format!("{}{name}", naming::FORBIDDEN_PREFIX);
            }
            if !ctx.sdfg.contains_array(&format!("{prefix}{name}")) {
                return Ok(name);
            }
            counter += 1;
        }
    }

    /// Maps `var` to the existing array `name`; mapping again to the same name is a no-op.
    pub fn map_variable(&mut self, var: &Var, name: &str) -> JaceResult<()> {
        let ctx = self.ctx_mut()?;
        if let Some(existing) = ctx.var_map.get(var) {
            if existing == name {
                return Ok(());
            }
            return Err(JaceError::naming(format!(
                "can not change the mapping of '{var}' from '{existing}' to '{name}'"
            )));
        }
        if !ctx.sdfg.contains_array(name) {
            return Err(JaceError::naming(format!(
                "mapping '{var}' -> '{name}': the array is unknown"
            )));
        }
        if naming::is_forbidden_name(name) {
            return Err(JaceError::naming(format!(
                "mapping '{var}' -> '{name}': forbidden name"
            )));
        }
        ctx.var_map.insert(var.clone(), name.to_string());
        self.family_names += 1;
        Ok(())
    }

    fn unmap_variable(&mut self, var: &Var) -> JaceResult<()> {
        if self.ctx_mut()?.var_map.remove(var).is_some() {
            self.family_names = self.family_names.saturating_sub(1);
        }
        Ok(())
    }

    /// Name of the array `var` maps to, `None` if it is not mapped.
    pub fn try_lookup(&self, var: &Var) -> JaceResult<Option<String>> {
        let ctx = self.ctx()?;
        let Some(name) = ctx.var_map.get(var) else {
            return Ok(None);
        };
        if !ctx.sdfg.contains_array(name) {
            return Err(JaceError::invariant(format!(
                "'{var}' maps to '{name}' but no such array exists"
            )));
        }
        Ok(Some(name.clone()))
    }

    pub fn lookup(&self, var: &Var) -> JaceResult<String> {
        self.try_lookup(var)?
            .ok_or_else(|| JaceError::naming(format!("the variable '{var}' was never registered")))
    }

    /// Resolves or creates the arrays of `atoms`, one entry per atom.
    pub fn resolve_or_create(
        &mut self,
        atoms: &[Atom],
        options: VarListOptions,
    ) -> JaceResult<Vec<Option<String>>> {
        if options.only_creation && options.prevent_creation {
            return Err(JaceError::invariant(
                "specified both 'only_creation' and 'prevent_creation'",
            ));
        }
        let mut names = Vec::with_capacity(atoms.len());
        for atom in atoms {
            let var = match atom {
                Atom::Literal(_) if options.allow_literals => {
                    names.push(None);
                    continue;
                }
                Atom::Literal(lit) => {
                    return Err(JaceError::naming(format!(
                        "encountered the literal '{lit}' where only variables are accepted"
                    )));
                }
                Atom::Var(var) => var,
            };
            let name = match self.try_lookup(var)? {
                None if options.prevent_creation => {
                    return Err(JaceError::naming(format!(
                        "'prevent_creation' given but '{var}' has no array"
                    )));
                }
                None => self.add_array(var, options.name_prefix, options.update_mapping)?,
                Some(_) if options.only_creation => {
                    return Err(JaceError::naming(format!(
                        "'only_creation' given but '{var}' already exists"
                    )));
                }
                Some(existing) => existing,
            };
            names.push(Some(name));
        }
        Ok(names)
    }

    fn create_vars(
        &mut self,
        vars: &[Var],
        name_prefix: Option<&'static str>,
    ) -> JaceResult<Vec<String>> {
        let atoms: Vec<Atom> = vars.iter().map(Atom::from).collect();
        let names = self.resolve_or_create(
            &atoms,
            VarListOptions {
                only_creation: true,
                update_mapping: true,
                name_prefix,
                ..VarListOptions::default()
            },
        )?;
        Ok(names.into_iter().flatten().collect())
    }

    fn translate_allocated(&mut self, jaxpr: &ClosedJaxpr) -> JaceResult<Vec<String>> {
        self.create_constants(jaxpr)?;
        let inputs = self.create_vars(jaxpr.invars(), None)?;
        self.ctx_mut()?.inp_names = Some(inputs);

        let mut translated = 0usize;
        for eqn in jaxpr.eqns() {
            if eqn.outvars.iter().any(Var::is_drop) {
                if !eqn.outvars.iter().all(Var::is_drop) {
                    return Err(JaceError::invariant(
                        "equation mixes dropped and used outputs",
                    )
                    .in_equation(eqn.to_string()));
                }
                continue;
            }
            self.translate_equation(eqn)
                .map_err(|err| err.in_equation(eqn.to_string()))?;
            translated += 1;
        }

        if translated == 0 {
            return self.handle_null_jaxpr(jaxpr);
        }
        let names = self.resolve_or_create(
            jaxpr.outvars(),
            VarListOptions {
                prevent_creation: true,
                ..VarListOptions::default()
            },
        )?;
        Ok(names.into_iter().flatten().collect())
    }

    fn create_constants(&mut self, jaxpr: &ClosedJaxpr) -> JaceResult<()> {
        if jaxpr.consts().is_empty() {
            return Ok(());
        }
        let names = self.create_vars(&jaxpr.jaxpr().constvars, Some(CONSTANT_PREFIX))?;
        for (name, value) in names.iter().zip(jaxpr.consts()) {
            self.sdfg_mut()?.bind_constant(name, value.clone())?;
        }
        Ok(())
    }

    fn translate_equation(&mut self, eqn: &Equation) -> JaceResult<()> {
        if eqn.effectful {
            return Err(JaceError::unsupported("equation has side effects"));
        }
        let in_names = self.resolve_or_create(
            &eqn.invars,
            VarListOptions {
                prevent_creation: true,
                allow_literals: true,
                ..VarListOptions::default()
            },
        )?;
        let mut out_names = self.create_vars(&eqn.outvars, None)?;

        let translator = self.registry.get(&eqn.primitive).cloned().ok_or_else(|| {
            JaceError::unsupported(format!("no translator known to handle '{}'", eqn.primitive))
        })?;

        log::trace!("dispatching `{eqn}`");
        let label = format!("{}_{}", eqn.primitive, out_names.join("_"));
        let eqn_state = self.append_new_node(Some(&label), None, BTreeMap::new(), None)?;

        let new_terminal =
            translator.translate(self, &in_names, &mut out_names, eqn, eqn_state)?;

        let ctx = self.ctx_mut()?;
        let new_terminal = match new_terminal {
            Some(state) => state,
            None if ctx.terminal_state != eqn_state => {
                return Err(JaceError::invariant(format!(
                    "translator for '{}' moved the terminal state without reporting it",
                    eqn.primitive
                )));
            }
            None => eqn_state,
        };
        ctx.terminal_state = new_terminal;
        if env::validate_each_equation() {
            ctx.validate()?;
        }
        Ok(())
    }

    /// Wires every output of an equation-free jaxpr to a fresh alias array.
    ///
    /// An input that is also an output would otherwise be both an input and an output
    /// connector of the same name once the graph is nested.
    fn handle_null_jaxpr(&mut self, jaxpr: &ClosedJaxpr) -> JaceResult<Vec<String>> {
        let ctx = self.ctx()?;
        if ctx.terminal_state != ctx.start_state {
            return Err(JaceError::invariant(
                "equation-free jaxpr but the terminal state moved",
            ));
        }
        let start = ctx.start_state;

        let mut aliases: HashMap<Var, String> = HashMap::new();
        let mut out_names = Vec::with_capacity(jaxpr.outvars().len());
        for atom in jaxpr.outvars() {
            let Atom::Var(var) = atom else {
                return Err(JaceError::unsupported(format!(
                    "literal output '{atom}' of an equation-free jaxpr"
                )));
            };
            if let Some(alias) = aliases.get(var) {
                out_names.push(alias.clone());
                continue;
            }
            let in_name = self.lookup(var)?;
            let out_name = self.add_array(var, Some(NULL_OUTPUT_PREFIX), false)?;
            let desc = self.array(&in_name)?.clone();
            self.sdfg_mut()?
                .state_mut(start)
                .add_copy(Memlet::full(&in_name, &desc), Memlet::full(&out_name, &desc));
            aliases.insert(var.clone(), out_name.clone());
            out_names.push(out_name);
        }
        for var in aliases.keys() {
            self.unmap_variable(var)?;
        }
        Ok(out_names)
    }
}
