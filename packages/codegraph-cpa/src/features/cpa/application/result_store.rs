//! Result Store
//!
//! Immutable snapshot of the solved analysis, built once at quiescence (or when the
//! budget runs out, in which case every set is a lower bound). All maps are sorted so
//! iteration and JSON export are deterministic.

use super::engine::CpaEngine;
use crate::errors::Result;
use crate::features::cpa::domain::{
    AbstractObject, CallResolution, CallTargets, Constraint, ContextElement, ContextId,
    FieldId, Invocation, InvocationId, ObjectId, TypeDesc,
};
use crate::features::cpa::infrastructure::ObjectSet;
use crate::features::cpa::ports::PointsToQuery;
use crate::features::ir::{ClassId, CodeId, NodeId};
use crate::shared::AnnotationStore;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

static EMPTY: ObjectSet = ObjectSet::new();

/// Heap effects of one operation in one context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpEffects {
    /// `(object, field)` pairs read
    pub reads: BTreeSet<(ObjectId, FieldName)>,
    /// `(object, field)` pairs written
    pub modifies: BTreeSet<(ObjectId, FieldName)>,
    pub allocates: BTreeSet<ObjectId>,
}

pub type FieldName = String;

/// Call resolution of one node merged over all contexts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallAnnotation {
    pub callees: BTreeSet<CodeId>,
    pub constructs: BTreeSet<ClassId>,
    pub intrinsics: BTreeSet<String>,
    /// Unresolved, or reached by the unknown object, in at least one context
    pub unresolved: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    locals: BTreeMap<(CodeId, ContextId), BTreeMap<String, ObjectSet>>,
    returns: BTreeMap<(CodeId, ContextId), ObjectSet>,
    raises: BTreeMap<(CodeId, ContextId), ObjectSet>,
    globals: BTreeMap<String, ObjectSet>,
    call_sites: BTreeMap<(NodeId, ContextId), CallTargets>,
    reached_calls: BTreeSet<(NodeId, ContextId)>,
    objects: Vec<AbstractObject>,
    fields: BTreeMap<ObjectId, BTreeMap<FieldName, ObjectSet>>,
    contexts: Vec<Vec<ContextElement>>,
    invocations: Vec<Invocation>,
    call_edges: BTreeSet<(InvocationId, NodeId, InvocationId)>,
    effects: BTreeMap<(NodeId, ContextId), OpEffects>,
}

impl ResultStore {
    /// Snapshot the engine state; `constraints` are all constraints the solver holds
    pub(crate) fn build(engine: &CpaEngine<'_>, constraints: &[Constraint]) -> Self {
        let store = engine.store();

        let mut locals = BTreeMap::new();
        let mut returns = BTreeMap::new();
        let mut raises = BTreeMap::new();
        for invocation in &engine.invocations {
            let Some(body) = invocation.body.as_ref() else {
                continue;
            };
            let key = (invocation.code, invocation.context);
            let vars: BTreeMap<String, ObjectSet> = body
                .locals
                .iter()
                .map(|(name, slot)| (name.clone(), store.objects_in(*slot).clone()))
                .collect();
            locals.insert(key, vars);
            returns.insert(key, store.objects_in(body.ret).clone());
            raises.insert(key, store.objects_in(body.exception).clone());
        }

        let mut fields: BTreeMap<ObjectId, BTreeMap<FieldName, ObjectSet>> = BTreeMap::new();
        for object in store.objects() {
            let named: BTreeMap<FieldName, ObjectSet> = store
                .fields_of(object.id)
                .filter(|(_, targets)| !targets.is_empty())
                .map(|(field, targets)| (store.field_name(field).to_string(), targets.clone()))
                .collect();
            if !named.is_empty() {
                fields.insert(object.id, named);
            }
        }
        let globals = fields.get(&store.module()).cloned().unwrap_or_default();

        let reached_calls = constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::Call(call) => Some(call.op),
                _ => None,
            })
            .map(|op| (op.node, engine.invocation(op.invocation).context))
            .collect();

        let field_name = |(object, field): &(ObjectId, FieldId)| (*object, store.field_name(*field).to_string());
        let effects = engine
            .effects
            .iter()
            .map(|(key, raw)| {
                let named = OpEffects {
                    reads: raw.reads.iter().map(field_name).collect(),
                    modifies: raw.modifies.iter().map(field_name).collect(),
                    allocates: raw.allocates.clone(),
                };
                (*key, named)
            })
            .collect();

        let contexts = (0..engine.contexts.len())
            .map(|id| engine.contexts.elements(ContextId(id as u32)).to_vec())
            .collect();

        Self {
            locals,
            returns,
            raises,
            globals,
            call_sites: engine.call_sites.clone(),
            reached_calls,
            objects: store.objects().to_vec(),
            fields,
            contexts,
            invocations: engine.invocations.clone(),
            call_edges: engine.call_edges.clone(),
            effects,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Points-to
    // ═══════════════════════════════════════════════════════════════════════

    /// Local variable of `code` under `context`
    pub fn points_to(&self, code: CodeId, var: &str, context: ContextId) -> &ObjectSet {
        self.locals
            .get(&(code, context))
            .and_then(|vars| vars.get(var))
            .unwrap_or(&EMPTY)
    }

    /// Union over every context `code` was analyzed in
    pub fn points_to_all_contexts(&self, code: CodeId, var: &str) -> ObjectSet {
        let mut merged = ObjectSet::new();
        let range = (code, ContextId(0))..=(code, ContextId(u32::MAX));
        for vars in self.locals.range(range).map(|(_, vars)| vars) {
            if let Some(objects) = vars.get(var) {
                merged.union_with(objects);
            }
        }
        merged
    }

    /// Module-level variable
    pub fn global(&self, name: &str) -> &ObjectSet {
        self.globals.get(name).unwrap_or(&EMPTY)
    }

    /// Objects returned by `code` under `context`
    pub fn returns(&self, code: CodeId, context: ContextId) -> &ObjectSet {
        self.returns.get(&(code, context)).unwrap_or(&EMPTY)
    }

    /// Exceptions escaping `code` under `context`
    pub fn raises(&self, code: CodeId, context: ContextId) -> &ObjectSet {
        self.raises.get(&(code, context)).unwrap_or(&EMPTY)
    }

    pub fn types_of(&self, code: CodeId, var: &str, context: ContextId) -> BTreeSet<TypeDesc> {
        self.points_to(code, var, context)
            .iter()
            .map(|o| self.object(o).ty)
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Calls
    // ═══════════════════════════════════════════════════════════════════════

    pub fn resolved_callees(&self, node: NodeId, context: ContextId) -> CallResolution {
        match self.call_sites.get(&(node, context)) {
            Some(targets) if targets.is_complete() => CallResolution::Resolved(targets.clone()),
            Some(targets) if !targets.is_empty() => CallResolution::Partial(targets.clone()),
            _ if self.reached_calls.contains(&(node, context)) => CallResolution::Unresolved,
            _ => CallResolution::NotReached,
        }
    }

    /// Contexts in which a call node was reached
    pub fn call_contexts(&self, node: NodeId) -> impl Iterator<Item = ContextId> + '_ {
        self.reached_calls
            .range((node, ContextId(0))..=(node, ContextId(u32::MAX)))
            .map(|(_, context)| *context)
    }

    /// Attach a [`CallAnnotation`] to every reached call node
    pub fn annotate_calls(&self, annotations: &mut AnnotationStore) {
        for &(node, context) in &self.reached_calls {
            if annotations.get::<CallAnnotation>(node).is_none() {
                annotations.insert(node, CallAnnotation::default());
            }
            let Some(entry) = annotations.get_mut::<CallAnnotation>(node) else {
                continue;
            };
            match self.call_sites.get(&(node, context)) {
                Some(targets) => {
                    entry.callees.extend(targets.invocations.iter().map(|(code, _)| *code));
                    entry.constructs.extend(targets.constructs.iter().copied());
                    entry.intrinsics.extend(targets.intrinsics.iter().cloned());
                    entry.unresolved |= !targets.is_complete();
                }
                None => entry.unresolved = true,
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Heap
    // ═══════════════════════════════════════════════════════════════════════

    #[inline]
    pub fn object(&self, id: ObjectId) -> &AbstractObject {
        &self.objects[id.0 as usize]
    }

    #[inline]
    pub fn objects(&self) -> &[AbstractObject] {
        &self.objects
    }

    pub fn field_targets(&self, object: ObjectId, field: &str) -> &ObjectSet {
        self.fields
            .get(&object)
            .and_then(|fields| fields.get(field))
            .unwrap_or(&EMPTY)
    }

    /// Non-empty fields of an object, sorted by name
    pub fn fields_of(&self, object: ObjectId) -> impl Iterator<Item = (&str, &ObjectSet)> + '_ {
        self.fields
            .get(&object)
            .into_iter()
            .flat_map(|fields| fields.iter().map(|(name, set)| (name.as_str(), set)))
    }

    pub fn effects(&self, node: NodeId, context: ContextId) -> Option<&OpEffects> {
        self.effects.get(&(node, context))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Invocations and contexts
    // ═══════════════════════════════════════════════════════════════════════

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    pub fn invocation(&self, id: InvocationId) -> &Invocation {
        &self.invocations[id.0 as usize]
    }

    /// Contexts `code` was analyzed in, in context-id order
    pub fn contexts_of(&self, code: CodeId) -> BTreeSet<ContextId> {
        self.invocations
            .iter()
            .filter(|inv| inv.code == code)
            .map(|inv| inv.context)
            .collect()
    }

    pub fn context_elements(&self, context: ContextId) -> &[ContextElement] {
        self.contexts
            .get(context.0 as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Invocation call graph; node index `i` is invocation `i`, edges carry the call node
    pub fn call_graph(&self) -> DiGraph<InvocationId, NodeId> {
        let mut graph = DiGraph::with_capacity(self.invocations.len(), self.call_edges.len());
        for inv in &self.invocations {
            graph.add_node(inv.id);
        }
        for &(caller, node, callee) in &self.call_edges {
            graph.add_edge(NodeIndex::new(caller.0 as usize), NodeIndex::new(callee.0 as usize), node);
        }
        graph
    }

    /// Invocations reachable from `root` along call edges, including `root`
    pub fn invocations_reachable_from(&self, root: InvocationId) -> BTreeSet<InvocationId> {
        let graph = self.call_graph();
        let mut reached = BTreeSet::new();
        if root.0 as usize >= graph.node_count() {
            return reached;
        }
        let mut dfs = Dfs::new(&graph, NodeIndex::new(root.0 as usize));
        while let Some(index) = dfs.next(&graph) {
            reached.insert(graph[index]);
        }
        reached
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Export
    // ═══════════════════════════════════════════════════════════════════════

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }

    fn export(&self) -> Export<'_> {
        Export {
            objects: &self.objects,
            contexts: &self.contexts,
            invocations: &self.invocations,
            locals: self
                .locals
                .iter()
                .flat_map(|(&(code, context), vars)| {
                    vars.iter().map(move |(var, objects)| LocalRecord {
                        code,
                        context,
                        var,
                        objects,
                    })
                })
                .collect(),
            call_sites: self
                .reached_calls
                .iter()
                .map(|&(node, context)| CallSiteRecord {
                    node,
                    context,
                    resolution: self.resolved_callees(node, context),
                })
                .collect(),
            fields: self
                .fields
                .iter()
                .flat_map(|(&object, fields)| {
                    fields.iter().map(move |(field, targets)| FieldRecord {
                        object,
                        field,
                        targets,
                    })
                })
                .collect(),
            call_edges: self.call_edges.iter().copied().collect(),
        }
    }
}

// JSON object keys must be strings, so keyed maps are exported as record lists

#[derive(Serialize)]
struct Export<'a> {
    objects: &'a [AbstractObject],
    contexts: &'a [Vec<ContextElement>],
    invocations: &'a [Invocation],
    locals: Vec<LocalRecord<'a>>,
    call_sites: Vec<CallSiteRecord>,
    fields: Vec<FieldRecord<'a>>,
    call_edges: Vec<(InvocationId, NodeId, InvocationId)>,
}

#[derive(Serialize)]
struct LocalRecord<'a> {
    code: CodeId,
    context: ContextId,
    var: &'a str,
    objects: &'a ObjectSet,
}

#[derive(Serialize)]
struct CallSiteRecord {
    node: NodeId,
    context: ContextId,
    resolution: CallResolution,
}

#[derive(Serialize)]
struct FieldRecord<'a> {
    object: ObjectId,
    field: &'a str,
    targets: &'a ObjectSet,
}

impl PointsToQuery for ResultStore {
    fn points_to(&self, code: CodeId, var: &str, context: ContextId) -> &ObjectSet {
        ResultStore::points_to(self, code, var, context)
    }

    fn resolved_callees(&self, node: NodeId, context: ContextId) -> CallResolution {
        ResultStore::resolved_callees(self, node, context)
    }

    fn types_of(&self, code: CodeId, var: &str, context: ContextId) -> BTreeSet<TypeDesc> {
        ResultStore::types_of(self, code, var, context)
    }
}
