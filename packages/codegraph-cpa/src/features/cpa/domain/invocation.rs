//! Invocations: one analyzed copy of a code body per calling context

use super::abstract_object::ObjectId;
use super::constraint::SlotId;
use super::context::ContextId;
use crate::features::ir::{ClassId, CodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvocationId(pub u32);

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inv#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvocationStatus {
    Analyzed,
    /// Extraction failed; no constraints were committed
    Malformed(String),
}

/// Slots of one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationBody {
    /// Named locals, parameters included
    pub locals: BTreeMap<String, SlotId>,
    /// Parameter slots in declaration order
    pub params: Vec<SlotId>,
    /// `*args` local and the tuple object it holds
    pub vararg: Option<(SlotId, ObjectId)>,
    pub ret: SlotId,
    /// Exceptions raised in this invocation or escaping its callees
    pub exception: SlotId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub id: InvocationId,
    pub code: CodeId,
    pub context: ContextId,
    pub status: InvocationStatus,
    /// `None` until extraction succeeded
    pub body: Option<InvocationBody>,
}

impl Invocation {
    #[inline]
    pub fn is_malformed(&self) -> bool {
        matches!(self.status, InvocationStatus::Malformed(_))
    }
}

/// Everything a call site resolved to in one context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTargets {
    /// Bound callees as `(code, callee context)`
    pub invocations: BTreeSet<(CodeId, ContextId)>,
    /// Classes instantiated by calling a class object
    pub constructs: BTreeSet<ClassId>,
    /// Builtin operations modelled without a code body, e.g. `list.append`
    pub intrinsics: BTreeSet<String>,
    /// The unknown object reached the callee or receiver, so anything may be called
    #[serde(default)]
    pub unknown: bool,
}

impl CallTargets {
    /// No known target; says nothing about `unknown`
    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty() && self.constructs.is_empty() && self.intrinsics.is_empty()
    }

    /// Every possible target is known
    #[inline]
    pub fn is_complete(&self) -> bool {
        !self.is_empty() && !self.unknown
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallResolution {
    Resolved(CallTargets),
    /// Some callees are known, but the unknown object also reached the call
    Partial(CallTargets),
    /// Reached, but no callee was found
    Unresolved,
    /// The call site was never analyzed in this context
    NotReached,
}

impl CallResolution {
    /// Bound callees, empty unless resolved
    pub fn callees(&self) -> BTreeSet<(CodeId, ContextId)> {
        match self {
            CallResolution::Resolved(targets) | CallResolution::Partial(targets) => {
                targets.invocations.clone()
            }
            _ => BTreeSet::new(),
        }
    }

    /// The only possible callee, if the call can be devirtualized
    pub fn single_callee(&self) -> Option<(CodeId, ContextId)> {
        match self {
            CallResolution::Resolved(targets)
                if targets.invocations.len() == 1
                    && targets.constructs.is_empty()
                    && targets.intrinsics.is_empty() =>
            {
                targets.invocations.iter().next().copied()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(codes: &[u32], unknown: bool) -> CallTargets {
        CallTargets {
            invocations: codes.iter().map(|&c| (CodeId(c), ContextId::ROOT)).collect(),
            unknown,
            ..CallTargets::default()
        }
    }

    #[test]
    fn test_single_callee_only_when_complete() {
        let one = targets(&[3], false);
        assert!(one.is_complete());
        assert_eq!(
            CallResolution::Resolved(one.clone()).single_callee(),
            Some((CodeId(3), ContextId::ROOT))
        );

        let two = targets(&[3, 4], false);
        assert_eq!(CallResolution::Resolved(two).single_callee(), None);

        let partial = targets(&[3], true);
        assert!(!partial.is_complete());
        assert!(!partial.is_empty());
        assert_eq!(CallResolution::Partial(partial.clone()).single_callee(), None);
        assert_eq!(CallResolution::Partial(partial).callees().len(), 1);
    }

    #[test]
    fn test_unknown_only_targets_are_empty() {
        let unknown = targets(&[], true);
        assert!(unknown.is_empty());
        assert!(!unknown.is_complete());
    }
}
