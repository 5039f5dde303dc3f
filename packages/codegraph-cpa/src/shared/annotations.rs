//! Downstream-owned annotations keyed by IR node
//!
//! Later passes attach their own data to nodes without the analysis core knowing
//! the types: each value is stored under `(NodeId, TypeId)`.

use crate::features::ir::NodeId;
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};

#[derive(Default)]
pub struct AnnotationStore {
    entries: FxHashMap<(NodeId, TypeId), Box<dyn Any + Send + Sync>>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `value` to `node`, returning the previous value of the same type
    pub fn insert<T: Any + Send + Sync>(&mut self, node: NodeId, value: T) -> Option<T> {
        self.entries
            .insert((node, TypeId::of::<T>()), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T: Any + Send + Sync>(&self, node: NodeId) -> Option<&T> {
        self.entries
            .get(&(node, TypeId::of::<T>()))
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any + Send + Sync>(&mut self, node: NodeId) -> Option<&mut T> {
        self.entries
            .get_mut(&(node, TypeId::of::<T>()))
            .and_then(|value| value.downcast_mut::<T>())
    }

    pub fn remove<T: Any + Send + Sync>(&mut self, node: NodeId) -> Option<T> {
        self.entries
            .remove(&(node, TypeId::of::<T>()))
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for AnnotationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}
