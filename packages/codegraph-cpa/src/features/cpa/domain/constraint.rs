//! CPA Constraints
//!
//! Six constraint kinds over slots (storage locations holding object sets):
//! - ASSIGN:   dst = src           → pts(dst) ⊇ pts(src)
//! - IS:       split by type test  → pts(on_true) ⊇ {o ∈ pts(x) | o : C}, rest to on_false
//! - LOAD:     dst = base.f        → ∀o ∈ pts(base): ASSIGN(o.f → dst)
//! - STORE:    base.f = src        → ∀o ∈ pts(base): ASSIGN(src → o.f)
//! - ALLOCATE: dst = new T         → pts(dst) ∋ canonical(site, ctx)
//! - CALL:     ret = f(args)       → ∀o ∈ pts(f): resolve, ensure invocation, bind
//!
//! Load, Store and Call derive new constraints while solving; constraints are
//! never removed.

use super::abstract_object::{FieldId, TypeDesc};
use super::invocation::InvocationId;
use crate::features::ir::{BuiltinType, ClassId, NodeId};
use serde::{Deserialize, Serialize};

/// Handle of a slot in the store graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub u32);

/// Index of a constraint in the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstraintId(pub u32);

/// The IR operation a constraint was extracted from, in the invocation that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpRef {
    pub node: NodeId,
    pub invocation: InvocationId,
}

/// Type test of an `Is` constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTest {
    /// Instances of the class or one of its subclasses
    Class(ClassId),
    Builtin(BuiltinType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallTarget {
    /// `f(args)`: call every object in the slot
    Value(SlotId),
    /// `x.attr(args)`: dispatch on every receiver object
    Method { receiver: SlotId, attr: FieldId },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallConstraint {
    pub op: OpRef,
    pub target: CallTarget,
    pub args: Vec<SlotId>,
    pub ret: SlotId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constraint {
    Assign {
        src: SlotId,
        dst: SlotId,
    },
    Is {
        tested: SlotId,
        test: TypeTest,
        on_true: SlotId,
        on_false: SlotId,
    },
    Load {
        op: OpRef,
        base: SlotId,
        field: FieldId,
        dst: SlotId,
    },
    Store {
        op: OpRef,
        base: SlotId,
        field: FieldId,
        src: SlotId,
    },
    Allocate {
        op: OpRef,
        ty: TypeDesc,
        dst: SlotId,
    },
    Call(CallConstraint),
}

/// Constraint kind, for statistics and traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConstraintKind {
    Assign,
    Is,
    Load,
    Store,
    Allocate,
    Call,
}

impl ConstraintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::Assign => "ASSIGN",
            ConstraintKind::Is => "IS",
            ConstraintKind::Load => "LOAD",
            ConstraintKind::Store => "STORE",
            ConstraintKind::Allocate => "ALLOCATE",
            ConstraintKind::Call => "CALL",
        }
    }
}

/// Lifecycle of a constraint inside the worklist
///
/// `Clean → Dirty → Processing → Clean`; a constraint dirtied while it is
/// being processed goes back to `Dirty` and is re-enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConstraintState {
    Clean,
    #[default]
    Dirty,
    Processing,
}

impl Constraint {
    #[inline]
    pub fn kind(&self) -> ConstraintKind {
        match self {
            Constraint::Assign { .. } => ConstraintKind::Assign,
            Constraint::Is { .. } => ConstraintKind::Is,
            Constraint::Load { .. } => ConstraintKind::Load,
            Constraint::Store { .. } => ConstraintKind::Store,
            Constraint::Allocate { .. } => ConstraintKind::Allocate,
            Constraint::Call(_) => ConstraintKind::Call,
        }
    }

    /// Slots whose growth requires this constraint to run again
    pub fn reads(&self) -> Vec<SlotId> {
        match self {
            Constraint::Assign { src, .. } => vec![*src],
            Constraint::Is { tested, .. } => vec![*tested],
            Constraint::Load { base, .. } | Constraint::Store { base, .. } => vec![*base],
            Constraint::Allocate { .. } => Vec::new(),
            Constraint::Call(call) => match call.target {
                CallTarget::Value(slot) => vec![slot],
                CallTarget::Method { receiver, .. } => vec![receiver],
            },
        }
    }

    pub fn op(&self) -> Option<OpRef> {
        match self {
            Constraint::Assign { .. } | Constraint::Is { .. } => None,
            Constraint::Load { op, .. }
            | Constraint::Store { op, .. }
            | Constraint::Allocate { op, .. } => Some(*op),
            Constraint::Call(call) => Some(call.op),
        }
    }
}
