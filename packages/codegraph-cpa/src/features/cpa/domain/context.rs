//! Calling contexts
//!
//! A context is an interned, immutable sequence of at most `k` elements. Ids are
//! compared instead of sequences; see
//! [`ContextTable`](crate::features::cpa::infrastructure::context_table::ContextTable).

use super::abstract_object::AllocSite;
use crate::features::ir::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(pub u32);

impl ContextId {
    /// The empty context
    pub const ROOT: ContextId = ContextId(0);

    /// Collapse sentinel for contexts that exceeded the depth limit
    pub const TOP: ContextId = ContextId(1);

    #[inline]
    pub fn is_top(&self) -> bool {
        *self == Self::TOP
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ContextId::ROOT => f.write_str("ctx:root"),
            ContextId::TOP => f.write_str("ctx:top"),
            ContextId(id) => write!(f, "ctx#{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContextElement {
    /// Call-string sensitivity: the call node
    CallSite(NodeId),
    /// Object sensitivity: allocation site of the receiver
    Receiver(AllocSite),
}

/// How callee contexts are derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextPolicy {
    /// k most recent call sites
    #[default]
    CallString,
    /// k most recent receiver allocation sites
    ObjectSensitive,
}

impl ContextPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextPolicy::CallString => "call-string",
            ContextPolicy::ObjectSensitive => "object-sensitive",
        }
    }
}

/// What `extend` does once a context is already `k` long
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WideningStrategy {
    /// Keep the newest `k` elements
    #[default]
    DropOldest,
    /// Collapse to [`ContextId::TOP`]; `TOP` absorbs further extension
    CollapseToTop,
}
