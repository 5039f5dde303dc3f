//! Context interning and k-limiting
//!
//! Contexts are interned as shared immutable slices: equal sequences get equal ids,
//! so comparison and hashing are O(1). The table only grows.

use crate::features::cpa::domain::{ContextElement, ContextId, WideningStrategy};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// One widening event, recorded once per `(caller, element)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Overflow {
    pub caller: ContextId,
    pub element: ContextElement,
    pub widened: ContextId,
}

#[derive(Debug)]
pub struct ContextTable {
    k: usize,
    widening: WideningStrategy,
    contexts: Vec<Arc<[ContextElement]>>,
    index: FxHashMap<Arc<[ContextElement]>, ContextId>,
    overflows: BTreeSet<Overflow>,
}

impl ContextTable {
    pub fn new(k: usize, widening: WideningStrategy) -> Self {
        let empty: Arc<[ContextElement]> = Arc::from(Vec::new());
        let mut index = FxHashMap::default();
        index.insert(empty.clone(), ContextId::ROOT);
        Self {
            k,
            widening,
            // TOP shares the empty sequence but is never reachable through the index
            contexts: vec![empty.clone(), empty],
            index,
            overflows: BTreeSet::new(),
        }
    }

    #[inline]
    pub fn depth_limit(&self) -> usize {
        self.k
    }

    pub fn intern(&mut self, elements: &[ContextElement]) -> ContextId {
        if let Some(&id) = self.index.get(elements) {
            return id;
        }
        let id = ContextId(self.contexts.len() as u32);
        let shared: Arc<[ContextElement]> = Arc::from(elements);
        self.contexts.push(shared.clone());
        self.index.insert(shared, id);
        id
    }

    #[inline]
    pub fn elements(&self, id: ContextId) -> &[ContextElement] {
        &self.contexts[id.0 as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Append `element` to `caller`, widening once the sequence would exceed `k`
    pub fn extend(&mut self, caller: ContextId, element: ContextElement) -> ContextId {
        if self.k == 0 {
            return ContextId::ROOT;
        }
        if caller.is_top() {
            return ContextId::TOP;
        }

        let current = self.elements(caller);
        if current.len() < self.k {
            let mut next = current.to_vec();
            next.push(element);
            return self.intern(&next);
        }

        let widened = match self.widening {
            WideningStrategy::DropOldest => {
                let mut next = current[current.len() + 1 - self.k..].to_vec();
                next.push(element);
                self.intern(&next)
            }
            WideningStrategy::CollapseToTop => ContextId::TOP,
        };
        let event = Overflow {
            caller,
            element,
            widened,
        };
        if self.overflows.insert(event) {
            debug!(caller = %caller, widened = %widened, "context depth exceeded, widening");
        }
        widened
    }

    /// Keep only the newest `depth` elements
    pub fn truncate_newest(&mut self, id: ContextId, depth: usize) -> ContextId {
        if id.is_top() {
            return if depth == 0 { ContextId::ROOT } else { ContextId::TOP };
        }
        let current = self.elements(id);
        if current.len() <= depth {
            return id;
        }
        let tail = current[current.len() - depth..].to_vec();
        self.intern(&tail)
    }

    pub fn overflows(&self) -> impl Iterator<Item = &Overflow> {
        self.overflows.iter()
    }
}
