//! CPA engine: constraint semantics and inter-procedural binding
//!
//! Implements [`ConstraintEvaluator`] for the worklist solver. Calls resolve
//! against the objects flowing into their callee slot, discover `(code, context)`
//! invocations (extracting their constraints once, reusing them afterwards) and
//! bind arguments, defaults, `*args`, return values and escaping exceptions with
//! assignment constraints.

use super::builtins::{self, Intrinsic};
use super::call_resolver::{self, Candidate};
use crate::config::{CpaConfig, UnresolvedCallPolicy};
use crate::errors::CpaError;
use crate::features::cpa::domain::{
    AllocSite, CallConstraint, CallTarget, CallTargets, Constraint, ConstraintId, ContextElement,
    ContextId, ContextPolicy, Diagnostic, FieldId, Invocation, InvocationId, InvocationStatus,
    ObjectId, OpRef, SlotId, TypeDesc, TypeTest,
};
use crate::features::cpa::infrastructure::constraint_extractor;
use crate::features::cpa::infrastructure::{ContextTable, ObjectSet, StoreGraph};
use crate::features::cpa::ports::ConstraintEvaluator;
use crate::features::ir::{BuiltinType, ClassId, CodeId, GlobalDef, NodeId, Program};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Heap effects of one operation in one context, by field id
#[derive(Debug, Clone, Default)]
pub(crate) struct RawEffects {
    pub reads: BTreeSet<(ObjectId, FieldId)>,
    pub modifies: BTreeSet<(ObjectId, FieldId)>,
    pub allocates: BTreeSet<ObjectId>,
}

pub struct CpaEngine<'p> {
    program: &'p Program,
    policy: ContextPolicy,
    heap_depth: usize,
    unresolved_policy: UnresolvedCallPolicy,
    pub(crate) store: StoreGraph,
    pub(crate) contexts: ContextTable,
    pub(crate) invocations: Vec<Invocation>,
    invocation_index: FxHashMap<(CodeId, ContextId), InvocationId>,
    pending: Vec<Constraint>,
    assign_edges: FxHashSet<(SlotId, SlotId)>,
    bound: FxHashSet<(ConstraintId, InvocationId)>,
    injected: FxHashSet<(NodeId, ContextId)>,
    pub(crate) call_sites: BTreeMap<(NodeId, ContextId), CallTargets>,
    pub(crate) call_edges: BTreeSet<(InvocationId, NodeId, InvocationId)>,
    pub(crate) effects: BTreeMap<(NodeId, ContextId), RawEffects>,
    pub(crate) diagnostics: BTreeSet<Diagnostic>,
    unknown: ObjectId,
}

impl<'p> CpaEngine<'p> {
    pub fn new(program: &'p Program, config: &CpaConfig) -> Self {
        let mut store = StoreGraph::new();
        let unknown = store.unknown();

        // module-level functions and classes are pre-stored on the module object
        let module = store.module();
        for (name, def) in program.globals() {
            let ty = match def {
                GlobalDef::Function(code) => TypeDesc::Function(code),
                GlobalDef::Class(class) => TypeDesc::Class(class),
            };
            let field = store.intern_field(name);
            let object = store.existing(ty);
            store.add_edge(module, field, object);
        }

        Self {
            program,
            policy: config.context_policy,
            heap_depth: config.heap_depth,
            unresolved_policy: config.unresolved_call_policy,
            store,
            contexts: ContextTable::new(config.context_depth_k, config.widening),
            invocations: Vec::new(),
            invocation_index: FxHashMap::default(),
            pending: Vec::new(),
            assign_edges: FxHashSet::default(),
            bound: FxHashSet::default(),
            injected: FxHashSet::default(),
            call_sites: BTreeMap::new(),
            call_edges: BTreeSet::new(),
            effects: BTreeMap::new(),
            diagnostics: BTreeSet::new(),
            unknown,
        }
    }

    #[inline]
    pub fn program(&self) -> &'p Program {
        self.program
    }

    #[inline]
    pub fn store(&self) -> &StoreGraph {
        &self.store
    }

    #[inline]
    pub fn invocation(&self, id: InvocationId) -> &Invocation {
        &self.invocations[id.0 as usize]
    }

    pub fn find_invocation(&self, code: CodeId, context: ContextId) -> Option<InvocationId> {
        self.invocation_index.get(&(code, context)).copied()
    }

    /// Objects currently held by a local
    pub fn local_objects(&self, code: CodeId, name: &str, context: ContextId) -> ObjectSet {
        self.find_invocation(code, context)
            .and_then(|inv| self.invocation(inv).body.as_ref())
            .and_then(|body| body.locals.get(name))
            .map(|slot| self.store.objects_in(*slot).clone())
            .unwrap_or_default()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Invocations and entry points
    // ═══════════════════════════════════════════════════════════════════════

    /// Existing invocation of `(code, context)`, or a newly extracted one
    pub fn ensure_invocation(&mut self, code: CodeId, context: ContextId) -> InvocationId {
        if let Some(id) = self.find_invocation(code, context) {
            return id;
        }

        let id = InvocationId(self.invocations.len() as u32);
        self.invocation_index.insert((code, context), id);
        self.invocations.push(Invocation {
            id,
            code,
            context,
            status: InvocationStatus::Analyzed,
            body: None,
        });

        match constraint_extractor::extract(self.program, &mut self.store, code, id) {
            Ok(extracted) => {
                for (slot, ty) in extracted.seeds {
                    let object = self.store.existing(ty);
                    self.store.add_to_slot(slot, object);
                }
                let mut body = extracted.body;
                if let Some(slot) = extracted.vararg {
                    let heap = self.contexts.truncate_newest(context, self.heap_depth);
                    let tuple = self.store.canonicalize(
                        AllocSite::VarArgs(code),
                        heap,
                        TypeDesc::Builtin(BuiltinType::Tuple),
                    );
                    self.store.add_to_slot(slot, tuple);
                    body.vararg = Some((slot, tuple));
                }
                debug!(
                    invocation = %id,
                    code = %self.program.qualified_name(code),
                    context = %context,
                    constraints = extracted.constraints.len(),
                    "new invocation"
                );
                self.pending.extend(extracted.constraints);
                self.invocations[id.0 as usize].body = Some(body);
            }
            Err(err) => {
                let reason = match err {
                    CpaError::MalformedIr { reason, .. } => reason,
                    other => other.to_string(),
                };
                warn!(
                    code = %self.program.qualified_name(code),
                    context = %context,
                    reason = %reason,
                    "skipping malformed invocation"
                );
                self.diagnostics.insert(Diagnostic::MalformedIr {
                    code,
                    context,
                    reason: reason.clone(),
                });
                self.invocations[id.0 as usize].status = InvocationStatus::Malformed(reason);
            }
        }
        id
    }

    /// Seed a function entry point in the root context
    pub fn enter_function(&mut self, code: CodeId) -> InvocationId {
        let inv = self.ensure_invocation(code, ContextId::ROOT);
        self.seed_entry_params(inv, 0);
        inv
    }

    /// Seed every method of a class with a shared synthetic receiver
    pub fn enter_class(&mut self, class: ClassId) -> Vec<InvocationId> {
        let receiver = self.store.canonicalize(
            AllocSite::EntryInstance(class),
            ContextId::ROOT,
            TypeDesc::Instance(class),
        );
        let program = self.program;
        let methods = &program.class(class).methods;
        let mut entered = Vec::with_capacity(methods.len());
        for &code in methods.values() {
            let inv = self.ensure_invocation(code, ContextId::ROOT);
            if let Some(&this) = self
                .invocation(inv)
                .body
                .as_ref()
                .and_then(|body| body.params.first())
            {
                self.store.add_to_slot(this, receiver);
            }
            self.seed_entry_params(inv, 1);
            entered.push(inv);
        }
        entered
    }

    /// Synthetic arguments from annotations, or defaults when unannotated
    fn seed_entry_params(&mut self, inv: InvocationId, skip: usize) {
        let Some(params) = self.invocation(inv).body.as_ref().map(|b| b.params.clone()) else {
            return;
        };
        let code_id = self.invocation(inv).code;
        let program = self.program;
        let code = program.code(code_id);
        for (index, (param, slot)) in code.params.iter().zip(params).enumerate().skip(skip) {
            let object = match (&param.annotation, &param.default) {
                (Some(annotation), _) => self.entry_argument(code_id, index, annotation),
                (None, Some(default)) => self.store.existing(TypeDesc::Builtin(default.builtin_type())),
                (None, None) => continue,
            };
            self.store.add_to_slot(slot, object);
        }
    }

    fn entry_argument(&mut self, entry: CodeId, index: usize, annotation: &str) -> ObjectId {
        let site = AllocSite::EntryArg {
            entry,
            index: index as u32,
        };
        if let Some(class) = self.program.class_by_name(annotation) {
            return self
                .store
                .canonicalize(site, ContextId::ROOT, TypeDesc::Instance(class));
        }
        match BuiltinType::from_name(annotation) {
            Some(ty) if ty.is_container() => {
                self.store
                    .canonicalize(site, ContextId::ROOT, TypeDesc::Builtin(ty))
            }
            Some(ty) => self.store.existing(TypeDesc::Builtin(ty)),
            None => self.unknown,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════

    #[inline]
    fn context_of(&self, invocation: InvocationId) -> ContextId {
        self.invocations[invocation.0 as usize].context
    }

    fn heap_context(&mut self, context: ContextId) -> ContextId {
        self.contexts.truncate_newest(context, self.heap_depth)
    }

    /// Derived assignment, created once per edge
    fn add_assign(&mut self, src: SlotId, dst: SlotId) {
        if src != dst && self.assign_edges.insert((src, dst)) {
            self.pending.push(Constraint::Assign { src, dst });
        }
    }

    fn effects_mut(&mut self, op: OpRef) -> &mut RawEffects {
        let context = self.context_of(op.invocation);
        self.effects.entry((op.node, context)).or_default()
    }

    fn targets_mut(&mut self, op: OpRef) -> &mut CallTargets {
        let context = self.context_of(op.invocation);
        self.call_sites.entry((op.node, context)).or_default()
    }

    fn fresh(&self, slot: SlotId, processed: &mut ObjectSet) -> Vec<ObjectId> {
        let fresh = self.store.objects_in(slot).difference(processed);
        for object in &fresh {
            processed.insert(*object);
        }
        fresh
    }

    fn callee_context(&mut self, op: OpRef, receiver: Option<ObjectId>) -> ContextId {
        let caller = self.context_of(op.invocation);
        match (self.policy, receiver) {
            (ContextPolicy::CallString, _) => {
                self.contexts.extend(caller, ContextElement::CallSite(op.node))
            }
            (ContextPolicy::ObjectSensitive, Some(receiver)) => {
                let object = self.store.object(receiver);
                let (heap, site) = (object.context, object.site);
                self.contexts.extend(heap, ContextElement::Receiver(site))
            }
            (ContextPolicy::ObjectSensitive, None) => caller,
        }
    }

    fn matches_test(&self, ty: TypeDesc, test: TypeTest) -> bool {
        match (ty, test) {
            (TypeDesc::Instance(class), TypeTest::Class(of)) => self.program.is_subclass(class, of),
            (TypeDesc::Builtin(actual), TypeTest::Builtin(expected)) => actual == expected,
            _ => false,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Constraint evaluation
    // ═══════════════════════════════════════════════════════════════════════

    fn eval_is(
        &mut self,
        tested: SlotId,
        test: TypeTest,
        on_true: SlotId,
        on_false: SlotId,
        processed: &mut ObjectSet,
    ) {
        for object in self.fresh(tested, processed) {
            let ty = self.store.object(object).ty;
            if ty.is_unknown() {
                self.store.add_to_slot(on_true, object);
                self.store.add_to_slot(on_false, object);
            } else if self.matches_test(ty, test) {
                self.store.add_to_slot(on_true, object);
            } else {
                self.store.add_to_slot(on_false, object);
            }
        }
    }

    fn eval_load(&mut self, op: OpRef, base: SlotId, field: FieldId, dst: SlotId, processed: &mut ObjectSet) {
        for object in self.fresh(base, processed) {
            let ty = self.store.object(object).ty;
            if ty.is_unknown() {
                self.store.add_to_slot(dst, self.unknown);
                continue;
            }
            let slot = self.store.field_slot(object, field);
            self.add_assign(slot, dst);
            self.effects_mut(op).reads.insert((object, field));

            // attribute reads of methods produce bound or plain function objects
            let attr = self.store.field_name(field);
            match ty {
                TypeDesc::Instance(class) => {
                    if let Some(code) = self.program.lookup_method(class, attr) {
                        let bound = self.store.canonicalize(
                            AllocSite::BoundMethod {
                                receiver: object,
                                code,
                            },
                            ContextId::ROOT,
                            TypeDesc::BoundMethod(code),
                        );
                        self.store.add_to_slot(dst, bound);
                    }
                }
                TypeDesc::Class(class) => {
                    if let Some(code) = self.program.lookup_method(class, attr) {
                        let function = self.store.existing(TypeDesc::Function(code));
                        self.store.add_to_slot(dst, function);
                    }
                }
                _ => {}
            }
        }
    }

    fn eval_store(&mut self, op: OpRef, base: SlotId, field: FieldId, src: SlotId, processed: &mut ObjectSet) {
        for object in self.fresh(base, processed) {
            if self.store.object(object).ty.is_unknown() {
                continue;
            }
            let slot = self.store.field_slot(object, field);
            self.add_assign(src, slot);
            self.effects_mut(op).modifies.insert((object, field));
        }
    }

    fn eval_allocate(&mut self, op: OpRef, ty: TypeDesc, dst: SlotId) {
        let context = self.context_of(op.invocation);
        let heap = self.heap_context(context);
        let object = self.store.canonicalize(AllocSite::Node(op.node), heap, ty);
        self.store.add_to_slot(dst, object);
        self.effects_mut(op).allocates.insert(object);
    }

    fn eval_call(&mut self, id: ConstraintId, call: &CallConstraint, processed: &mut ObjectSet) {
        let argc = call.args.len();
        let (slot, attr) = match call.target {
            CallTarget::Value(slot) => (slot, None),
            CallTarget::Method { receiver, attr } => (receiver, Some(attr)),
        };
        for object in self.fresh(slot, processed) {
            let callee = self.store.object(object);
            let candidate = match attr {
                None => call_resolver::resolve_value(self.program, callee, argc),
                Some(attr) => call_resolver::resolve_method(
                    self.program,
                    callee,
                    self.store.field_name(attr),
                    attr,
                    argc,
                ),
            };
            match candidate {
                Some(candidate) => self.apply(id, call, candidate),
                None => debug!(node = %call.op.node, callee = %object, "callee does not accept this call"),
            }
        }
    }

    fn apply(&mut self, id: ConstraintId, call: &CallConstraint, candidate: Candidate) {
        match candidate {
            Candidate::Code { code, receiver } => {
                let context = self.callee_context(call.op, receiver);
                let inv = self.ensure_invocation(code, context);
                self.bind(id, call, inv, receiver, true);
                self.targets_mut(call.op).invocations.insert((code, context));
            }
            Candidate::Construct { class, init } => {
                let caller = self.context_of(call.op.invocation);
                let heap = self.heap_context(caller);
                let instance = self.store.canonicalize(
                    AllocSite::Construct {
                        node: call.op.node,
                        class,
                    },
                    heap,
                    TypeDesc::Instance(class),
                );
                self.store.add_to_slot(call.ret, instance);
                self.effects_mut(call.op).allocates.insert(instance);
                self.targets_mut(call.op).constructs.insert(class);
                if let Some(init) = init {
                    let context = self.callee_context(call.op, Some(instance));
                    let inv = self.ensure_invocation(init, context);
                    self.bind(id, call, inv, Some(instance), false);
                    self.targets_mut(call.op).invocations.insert((init, context));
                }
            }
            Candidate::Intrinsic {
                receiver,
                ty,
                method,
            } => {
                let attr = match call.target {
                    CallTarget::Method { attr, .. } => self.store.field_name(attr).to_string(),
                    CallTarget::Value(_) => String::new(),
                };
                self.apply_intrinsic(call, receiver, method.intrinsic);
                self.targets_mut(call.op)
                    .intrinsics
                    .insert(builtins::qualified_name(ty, &attr));
            }
            Candidate::FieldFallback { object, attr } => {
                let slot = self.store.field_slot(object, attr);
                self.effects_mut(call.op).reads.insert((object, attr));
                self.pending.push(Constraint::Call(CallConstraint {
                    op: call.op,
                    target: CallTarget::Value(slot),
                    args: call.args.clone(),
                    ret: call.ret,
                }));
            }
            Candidate::Unknown => {
                self.targets_mut(call.op).unknown = true;
                if self.unresolved_policy == UnresolvedCallPolicy::Conservative {
                    self.store.add_to_slot(call.ret, self.unknown);
                }
            }
        }
    }

    fn apply_intrinsic(&mut self, call: &CallConstraint, receiver: ObjectId, intrinsic: Intrinsic) {
        let element = self.store.element_field();
        let none = self.store.existing(TypeDesc::Builtin(BuiltinType::None));
        match intrinsic {
            Intrinsic::Returns(ty) => {
                let object = self.store.existing(TypeDesc::Builtin(ty));
                self.store.add_to_slot(call.ret, object);
            }
            Intrinsic::ReturnsReceiver => {
                self.store.add_to_slot(call.ret, receiver);
            }
            Intrinsic::ReadElements => {
                let slot = self.store.field_slot(receiver, element);
                self.add_assign(slot, call.ret);
                self.effects_mut(call.op).reads.insert((receiver, element));
            }
            Intrinsic::WriteElement(index) => {
                let slot = self.store.field_slot(receiver, element);
                if let Some(&arg) = call.args.get(index) {
                    self.add_assign(arg, slot);
                }
                self.store.add_to_slot(call.ret, none);
                self.effects_mut(call.op).modifies.insert((receiver, element));
            }
            Intrinsic::SetItem => {
                let is_dict = self.store.object(receiver).ty == TypeDesc::Builtin(BuiltinType::Dict);
                if let [key, value] = call.args[..] {
                    if is_dict {
                        let key_field = self.store.key_field();
                        let keys = self.store.field_slot(receiver, key_field);
                        self.add_assign(key, keys);
                        self.effects_mut(call.op).modifies.insert((receiver, key_field));
                    }
                    let slot = self.store.field_slot(receiver, element);
                    self.add_assign(value, slot);
                }
                self.store.add_to_slot(call.ret, none);
                self.effects_mut(call.op).modifies.insert((receiver, element));
            }
            Intrinsic::ExtendFrom(index) => {
                let slot = self.store.field_slot(receiver, element);
                if let Some(&source) = call.args.get(index) {
                    self.pending.push(Constraint::Load {
                        op: call.op,
                        base: source,
                        field: element,
                        dst: slot,
                    });
                }
                self.store.add_to_slot(call.ret, none);
                self.effects_mut(call.op).modifies.insert((receiver, element));
            }
            Intrinsic::GetWithDefault => {
                let slot = self.store.field_slot(receiver, element);
                self.add_assign(slot, call.ret);
                match call.args.get(1) {
                    Some(&default) => self.add_assign(default, call.ret),
                    None => {
                        self.store.add_to_slot(call.ret, none);
                    }
                }
                self.effects_mut(call.op).reads.insert((receiver, element));
            }
        }
    }

    /// Bind a call to an invocation
    ///
    /// The receiver is added on every call; argument, default, return and exception
    /// bindings happen once per (call constraint, invocation).
    fn bind(
        &mut self,
        id: ConstraintId,
        call: &CallConstraint,
        inv: InvocationId,
        receiver: Option<ObjectId>,
        bind_ret: bool,
    ) {
        let callee = &self.invocations[inv.0 as usize];
        let Some(body) = callee.body.as_ref() else {
            // malformed callee: keep the edge for reachability only
            self.call_edges.insert((call.op.invocation, call.op.node, inv));
            return;
        };
        let params = body.params.clone();
        let vararg = body.vararg.map(|(_, tuple)| tuple);
        let (callee_ret, callee_exception) = (body.ret, body.exception);
        let code = callee.code;

        let offset = usize::from(receiver.is_some());
        if let Some(receiver) = receiver {
            match (params.first(), vararg) {
                (Some(&this), _) => {
                    self.store.add_to_slot(this, receiver);
                }
                // `def m(*args)`: the receiver is the first surplus argument
                (None, Some(tuple)) => {
                    let element = self.store.element_field();
                    let slot = self.store.field_slot(tuple, element);
                    self.store.add_to_slot(slot, receiver);
                }
                (None, None) => {}
            }
        }
        if !self.bound.insert((id, inv)) {
            return;
        }
        debug!(node = %call.op.node, callee = %inv, "bind call");

        for (index, &arg) in call.args.iter().enumerate() {
            match params.get(index + offset) {
                Some(&param) => self.add_assign(arg, param),
                None => {
                    if let Some(tuple) = vararg {
                        let element = self.store.element_field();
                        let slot = self.store.field_slot(tuple, element);
                        self.add_assign(arg, slot);
                    }
                }
            }
        }
        let program = self.program;
        let declared = &program.code(code).params;
        for index in (call.args.len() + offset)..params.len() {
            if let Some(default) = &declared[index].default {
                let object = self.store.existing(TypeDesc::Builtin(default.builtin_type()));
                self.store.add_to_slot(params[index], object);
            }
        }

        if bind_ret {
            self.add_assign(callee_ret, call.ret);
        }
        if let Some(caller_exception) = self.invocations[call.op.invocation.0 as usize]
            .body
            .as_ref()
            .map(|b| b.exception)
        {
            self.add_assign(callee_exception, caller_exception);
        }
        self.call_edges.insert((call.op.invocation, call.op.node, inv));
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Unresolved calls
    // ═══════════════════════════════════════════════════════════════════════

    /// Every target is known; a call reached by the unknown object is not resolved
    pub fn is_resolved(&self, node: NodeId, context: ContextId) -> bool {
        self.call_sites
            .get(&(node, context))
            .is_some_and(CallTargets::is_complete)
    }

    fn has_unknown_result(&self, node: NodeId, context: ContextId) -> bool {
        self.call_sites
            .get(&(node, context))
            .is_some_and(|targets| targets.unknown)
    }

    /// Give every unresolved call the unknown object as result, once per call site
    pub fn inject_unknown_results(&mut self, constraints: &[Constraint]) -> usize {
        let mut injected = 0;
        for constraint in constraints {
            let Constraint::Call(call) = constraint else {
                continue;
            };
            let context = self.context_of(call.op.invocation);
            if self.is_resolved(call.op.node, context) || self.has_unknown_result(call.op.node, context) {
                continue;
            }
            if self.injected.insert((call.op.node, context)) {
                debug!(node = %call.op.node, context = %context, "unresolved call returns unknown");
                injected += 1;
            }
            self.store.add_to_slot(call.ret, self.unknown);
        }
        injected
    }

    /// Whether [`inject_unknown_results`](Self::inject_unknown_results) would reach a new call site
    pub fn has_pending_unknown_results(&self, constraints: &[Constraint]) -> bool {
        constraints.iter().any(|constraint| match constraint {
            Constraint::Call(call) => {
                let context = self.context_of(call.op.invocation);
                !self.is_resolved(call.op.node, context)
                    && !self.has_unknown_result(call.op.node, context)
                    && !self.injected.contains(&(call.op.node, context))
            }
            _ => false,
        })
    }

    /// Unresolved call sites at quiescence, sorted
    pub fn unresolved_calls(&self, constraints: &[Constraint]) -> BTreeSet<(NodeId, ContextId, CodeId)> {
        constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::Call(call) => Some(call.op),
                _ => None,
            })
            .filter_map(|op| {
                let invocation = &self.invocations[op.invocation.0 as usize];
                (!self.is_resolved(op.node, invocation.context))
                    .then_some((op.node, invocation.context, invocation.code))
            })
            .collect()
    }
}

impl<'p> ConstraintEvaluator for CpaEngine<'p> {
    fn evaluate(&mut self, id: ConstraintId, constraint: &Constraint, processed: &mut ObjectSet) {
        match constraint {
            Constraint::Assign { src, dst } => {
                self.store.union_slots(*src, *dst);
            }
            Constraint::Is {
                tested,
                test,
                on_true,
                on_false,
            } => self.eval_is(*tested, *test, *on_true, *on_false, processed),
            Constraint::Load {
                op,
                base,
                field,
                dst,
            } => self.eval_load(*op, *base, *field, *dst, processed),
            Constraint::Store {
                op,
                base,
                field,
                src,
            } => self.eval_store(*op, *base, *field, *src, processed),
            Constraint::Allocate { op, ty, dst } => self.eval_allocate(*op, *ty, *dst),
            Constraint::Call(call) => self.eval_call(id, call, processed),
        }
    }

    fn register(&mut self, id: ConstraintId, constraint: &Constraint) {
        for slot in constraint.reads() {
            self.store.add_reader(slot, id);
        }
    }

    fn take_pending(&mut self) -> Vec<Constraint> {
        std::mem::take(&mut self.pending)
    }

    fn drain_dirty(&mut self) -> Vec<ConstraintId> {
        let mut dirty = Vec::new();
        for slot in self.store.drain_changed() {
            dirty.extend_from_slice(self.store.readers(slot));
        }
        dirty
    }
}
