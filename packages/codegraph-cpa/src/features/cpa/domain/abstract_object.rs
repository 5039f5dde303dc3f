//! Abstract Heap Objects
//!
//! Concrete runtime objects are abstracted to `(allocation site, heap context)`.
//! Class objects, function objects, primitive values and the module object are
//! *existing* objects: one per type descriptor, always in the root context.
//!
//! # Example
//! ```text
//! // Line 10: a = Box()      -> Construct { node: n10, class: Box } @ [n3]
//! // Line 10, second caller  -> Construct { node: n10, class: Box } @ [n7]
//! // x = 1; y = 2            -> Existing(Builtin(int))   (shared)
//! ```

use super::context::ContextId;
use crate::features::ir::{BuiltinType, ClassId, CodeId, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Arena handle of an [`AbstractObject`] inside the store graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{}", self.0)
    }
}

/// Interned field name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(pub u32);

/// Extended type descriptor of an abstract object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeDesc {
    Instance(ClassId),
    Class(ClassId),
    Function(CodeId),
    /// A method already bound to a receiver
    BoundMethod(CodeId),
    Builtin(BuiltinType),
    /// Anything; produced by conservative handling of unresolved calls
    Unknown,
}

impl TypeDesc {
    #[inline]
    pub fn is_unknown(&self) -> bool {
        matches!(self, TypeDesc::Unknown)
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Instance(c) => write!(f, "instance({})", c),
            TypeDesc::Class(c) => write!(f, "class({})", c),
            TypeDesc::Function(c) => write!(f, "function({})", c),
            TypeDesc::BoundMethod(c) => write!(f, "bound({})", c),
            TypeDesc::Builtin(b) => f.write_str(b.as_str()),
            TypeDesc::Unknown => f.write_str("?"),
        }
    }
}

/// Where an abstract object comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AllocSite {
    /// Allocation expression in the IR (`New`, container literals)
    Node(NodeId),
    /// Instance created by calling a class object at a call node
    Construct { node: NodeId, class: ClassId },
    /// Context-free object identified by its type
    Existing(TypeDesc),
    /// Synthetic argument of an entry point, built from a parameter annotation
    EntryArg { entry: CodeId, index: u32 },
    /// Synthetic receiver of a class entry point
    EntryInstance(ClassId),
    /// Implicit `*args` tuple of an invocation
    VarArgs(CodeId),
    /// Method looked up on a receiver
    BoundMethod { receiver: ObjectId, code: CodeId },
}

impl AllocSite {
    /// Existing objects ignore the allocating context
    #[inline]
    pub fn is_existing(&self) -> bool {
        matches!(self, AllocSite::Existing(_))
    }

    /// Sites whose identity already encodes a context-sensitive object
    #[inline]
    pub fn is_context_free(&self) -> bool {
        matches!(
            self,
            AllocSite::Existing(_)
                | AllocSite::EntryArg { .. }
                | AllocSite::EntryInstance(_)
                | AllocSite::BoundMethod { .. }
        )
    }
}

/// A canonical abstract object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractObject {
    pub id: ObjectId,
    pub site: AllocSite,
    /// Heap context (already truncated to the configured heap depth)
    pub context: ContextId,
    pub ty: TypeDesc,
}
