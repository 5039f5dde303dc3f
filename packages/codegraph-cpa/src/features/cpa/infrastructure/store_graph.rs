//! Store Graph
//!
//! Arena of canonical abstract objects plus every slot that holds an object set:
//! locals and temporaries of invocations, and field slots `(object, field)`.
//! Objects refer to each other only through field slots holding [`ObjectId`]s, so
//! cyclic heaps need no ownership tricks. Nothing is removed once solving has seen
//! it; only a failed extraction rolls back the slots and field names it created.
//!
//! Every growing slot is appended to a change log; the engine drains it to mark the
//! slot's readers dirty.

use super::object_set::ObjectSet;
use crate::features::cpa::domain::{
    AbstractObject, AllocSite, ConstraintId, ContextId, FieldId, InvocationId, ObjectId, SlotId,
    TypeDesc,
};
use crate::features::ir::BuiltinType;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Field holding the elements of containers and `*args` tuples
pub const ELEMENT_FIELD: &str = "[]";

/// Field holding the keys of dicts
pub const KEY_FIELD: &str = "<key>";

static EMPTY: ObjectSet = ObjectSet::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotOwner {
    /// Named local or parameter of an invocation
    Local(InvocationId),
    /// Intermediate value of an invocation
    Temp(InvocationId),
    Field(ObjectId, FieldId),
    /// The slot holding the module object
    Module,
}

#[derive(Debug, Clone)]
pub struct Slot {
    pub owner: SlotOwner,
    pub objects: ObjectSet,
    readers: Vec<ConstraintId>,
}

/// Store size at a point in time, see [`StoreGraph::rollback`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    slots: usize,
    fields: usize,
}

#[derive(Debug)]
pub struct StoreGraph {
    objects: Vec<AbstractObject>,
    object_fields: Vec<BTreeMap<FieldId, SlotId>>,
    canonical: FxHashMap<(AllocSite, ContextId), ObjectId>,
    slots: Vec<Slot>,
    field_names: Vec<String>,
    field_index: FxHashMap<String, FieldId>,
    changed: Vec<SlotId>,
    module: ObjectId,
    module_slot: SlotId,
    element_field: FieldId,
    key_field: FieldId,
}

impl Default for StoreGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            objects: Vec::new(),
            object_fields: Vec::new(),
            canonical: FxHashMap::default(),
            slots: Vec::new(),
            field_names: Vec::new(),
            field_index: FxHashMap::default(),
            changed: Vec::new(),
            module: ObjectId(0),
            module_slot: SlotId(0),
            element_field: FieldId(0),
            key_field: FieldId(0),
        };
        graph.element_field = graph.intern_field(ELEMENT_FIELD);
        graph.key_field = graph.intern_field(KEY_FIELD);
        graph.module = graph.existing(TypeDesc::Builtin(BuiltinType::Module));
        graph.module_slot = graph.new_slot(SlotOwner::Module);
        graph.add_to_slot(graph.module_slot, graph.module);
        graph.changed.clear();
        graph
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Objects
    // ═══════════════════════════════════════════════════════════════════════

    /// Canonical object for `(site, heap_context)`
    ///
    /// Idempotent: the same pair always yields the same id. Existing objects ignore
    /// the context and live in [`ContextId::ROOT`].
    pub fn canonicalize(&mut self, site: AllocSite, heap_context: ContextId, ty: TypeDesc) -> ObjectId {
        let context = if site.is_context_free() {
            ContextId::ROOT
        } else {
            heap_context
        };
        if let Some(&id) = self.canonical.get(&(site, context)) {
            return id;
        }
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(AbstractObject {
            id,
            site,
            context,
            ty,
        });
        self.object_fields.push(BTreeMap::new());
        self.canonical.insert((site, context), id);
        id
    }

    /// The existing object of a type descriptor
    #[inline]
    pub fn existing(&mut self, ty: TypeDesc) -> ObjectId {
        self.canonicalize(AllocSite::Existing(ty), ContextId::ROOT, ty)
    }

    #[inline]
    pub fn unknown(&mut self) -> ObjectId {
        self.existing(TypeDesc::Unknown)
    }

    /// Lookup without creating
    pub fn find(&self, site: AllocSite, heap_context: ContextId) -> Option<ObjectId> {
        let context = if site.is_context_free() {
            ContextId::ROOT
        } else {
            heap_context
        };
        self.canonical.get(&(site, context)).copied()
    }

    #[inline]
    pub fn object(&self, id: ObjectId) -> &AbstractObject {
        &self.objects[id.0 as usize]
    }

    pub fn objects(&self) -> &[AbstractObject] {
        &self.objects
    }

    #[inline]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn module(&self) -> ObjectId {
        self.module
    }

    #[inline]
    pub fn module_slot(&self) -> SlotId {
        self.module_slot
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Fields
    // ═══════════════════════════════════════════════════════════════════════

    pub fn intern_field(&mut self, name: &str) -> FieldId {
        if let Some(&id) = self.field_index.get(name) {
            return id;
        }
        let id = FieldId(self.field_names.len() as u32);
        self.field_names.push(name.to_string());
        self.field_index.insert(name.to_string(), id);
        id
    }

    pub fn lookup_field(&self, name: &str) -> Option<FieldId> {
        self.field_index.get(name).copied()
    }

    #[inline]
    pub fn field_name(&self, field: FieldId) -> &str {
        &self.field_names[field.0 as usize]
    }

    #[inline]
    pub fn element_field(&self) -> FieldId {
        self.element_field
    }

    #[inline]
    pub fn key_field(&self) -> FieldId {
        self.key_field
    }

    /// Slot of `base.field`, created on first use
    pub fn field_slot(&mut self, base: ObjectId, field: FieldId) -> SlotId {
        if let Some(&slot) = self.object_fields[base.0 as usize].get(&field) {
            return slot;
        }
        let slot = self.new_slot(SlotOwner::Field(base, field));
        self.object_fields[base.0 as usize].insert(field, slot);
        slot
    }

    pub fn existing_field_slot(&self, base: ObjectId, field: FieldId) -> Option<SlotId> {
        self.object_fields[base.0 as usize].get(&field).copied()
    }

    /// Add `target` to `base.field`; returns whether the edge is new
    pub fn add_edge(&mut self, base: ObjectId, field: FieldId, target: ObjectId) -> bool {
        let slot = self.field_slot(base, field);
        self.add_to_slot(slot, target)
    }

    pub fn field_targets(&self, base: ObjectId, field: FieldId) -> &ObjectSet {
        match self.existing_field_slot(base, field) {
            Some(slot) => &self.slots[slot.0 as usize].objects,
            None => &EMPTY,
        }
    }

    /// Fields of an object in field-id order
    pub fn fields_of(&self, base: ObjectId) -> impl Iterator<Item = (FieldId, &ObjectSet)> + '_ {
        self.object_fields[base.0 as usize]
            .iter()
            .map(|(field, slot)| (*field, &self.slots[slot.0 as usize].objects))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Slots
    // ═══════════════════════════════════════════════════════════════════════

    pub fn new_slot(&mut self, owner: SlotOwner) -> SlotId {
        let id = SlotId(self.slots.len() as u32);
        self.slots.push(Slot {
            owner,
            objects: ObjectSet::new(),
            readers: Vec::new(),
        });
        id
    }

    #[inline]
    pub fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id.0 as usize]
    }

    #[inline]
    pub fn objects_in(&self, id: SlotId) -> &ObjectSet {
        &self.slots[id.0 as usize].objects
    }

    #[inline]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            slots: self.slots.len(),
            fields: self.field_names.len(),
        }
    }

    /// Drop every slot and field name created since `checkpoint`
    ///
    /// Only valid while no constraint refers to them.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        if self.slots.len() > checkpoint.slots {
            for fields in &mut self.object_fields {
                fields.retain(|_, slot| (slot.0 as usize) < checkpoint.slots);
            }
            self.slots.truncate(checkpoint.slots);
            self.changed.retain(|slot| (slot.0 as usize) < checkpoint.slots);
        }
        for name in self.field_names.drain(checkpoint.fields..) {
            self.field_index.remove(&name);
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn add_to_slot(&mut self, slot: SlotId, object: ObjectId) -> bool {
        let grew = self.slots[slot.0 as usize].objects.insert(object);
        if grew {
            self.changed.push(slot);
        }
        grew
    }

    /// `pts(dst) ⊇ pts(src)`; returns whether `dst` grew
    pub fn union_slots(&mut self, src: SlotId, dst: SlotId) -> bool {
        if src == dst {
            return false;
        }
        let (s, d) = (src.0 as usize, dst.0 as usize);
        let grew = if s < d {
            let (head, tail) = self.slots.split_at_mut(d);
            tail[0].objects.union_with(&head[s].objects)
        } else {
            let (head, tail) = self.slots.split_at_mut(s);
            head[d].objects.union_with(&tail[0].objects)
        };
        if grew {
            self.changed.push(dst);
        }
        grew
    }

    pub fn add_reader(&mut self, slot: SlotId, constraint: ConstraintId) {
        let readers = &mut self.slots[slot.0 as usize].readers;
        if !readers.contains(&constraint) {
            readers.push(constraint);
        }
    }

    #[inline]
    pub fn readers(&self, slot: SlotId) -> &[ConstraintId] {
        &self.slots[slot.0 as usize].readers
    }

    /// Slots that grew since the last drain, in growth order
    pub fn drain_changed(&mut self) -> Vec<SlotId> {
        std::mem::take(&mut self.changed)
    }
}
