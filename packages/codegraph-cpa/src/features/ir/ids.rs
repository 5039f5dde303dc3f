//! Identifiers for IR entities
//!
//! All ids are dense indices assigned by [`ProgramBuilder`](super::builder::ProgramBuilder),
//! so ordering by id is ordering by definition.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Expression node that can be a call site or an allocation site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Placeholder used by expression constructors; replaced at build time
    pub const PENDING: NodeId = NodeId(u32::MAX);

    #[inline]
    pub fn is_pending(&self) -> bool {
        *self == Self::PENDING
    }
}

/// A function or method body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodeId(pub u32);

/// A user-defined class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for CodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code#{}", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}
