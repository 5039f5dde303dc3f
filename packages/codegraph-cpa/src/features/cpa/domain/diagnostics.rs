//! Non-fatal analysis outcomes
//!
//! Diagnostics are facts about the analysis, not errors: they are accumulated in a
//! sorted set next to the results.

use super::context::{ContextElement, ContextId};
use super::constraint::ConstraintKind;
use crate::features::ir::{CodeId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Diagnostic {
    /// An invocation could not be extracted and was skipped
    MalformedIr {
        code: CodeId,
        context: ContextId,
        reason: String,
    },
    /// A reached call site with no callee at quiescence
    UnresolvedCall {
        node: NodeId,
        context: ContextId,
        caller: CodeId,
    },
    /// Context extension beyond `k`, resolved by widening
    ContextOverflow {
        caller: ContextId,
        element: ContextElement,
        widened: ContextId,
    },
    /// The iteration budget ran out before quiescence
    NonConvergence { iterations: usize },
}

impl Diagnostic {
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::MalformedIr { .. } => "malformed-ir",
            Diagnostic::UnresolvedCall { .. } => "unresolved-call",
            Diagnostic::ContextOverflow { .. } => "context-overflow",
            Diagnostic::NonConvergence { .. } => "non-convergence",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MalformedIr {
                code,
                context,
                reason,
            } => write!(f, "malformed IR in {} @ {}: {}", code, context, reason),
            Diagnostic::UnresolvedCall {
                node,
                context,
                caller,
            } => write!(f, "unresolved call {} in {} @ {}", node, caller, context),
            Diagnostic::ContextOverflow {
                caller, widened, ..
            } => write!(f, "context overflow from {} widened to {}", caller, widened),
            Diagnostic::NonConvergence { iterations } => {
                write!(f, "no fixpoint after {} iterations", iterations)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStatus {
    Converged,
    /// Results are a lower bound of the fixpoint
    NotConverged { iterations: usize },
}

impl AnalysisStatus {
    #[inline]
    pub fn is_converged(&self) -> bool {
        matches!(self, AnalysisStatus::Converged)
    }
}

/// Session statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub iterations: usize,
    pub constraints: usize,
    pub constraints_by_kind: BTreeMap<ConstraintKind, usize>,
    pub invocations: usize,
    pub objects: usize,
    pub contexts: usize,
    pub slots: usize,
    pub unresolved_calls: usize,
}
