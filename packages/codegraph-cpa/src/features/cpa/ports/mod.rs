//! Ports (Interfaces) for the CPA
//!
//! - [`ConstraintEvaluator`]: what the worklist solver calls to give constraints meaning
//! - [`PointsToQuery`]: the read-only view downstream passes consume

use crate::features::cpa::domain::{
    CallResolution, Constraint, ConstraintId, ContextId, TypeDesc,
};
use crate::features::cpa::infrastructure::ObjectSet;
use crate::features::ir::{CodeId, NodeId};
use std::collections::BTreeSet;

/// Constraint semantics, driven by
/// [`WorklistSolver`](crate::features::cpa::infrastructure::WorklistSolver)
///
/// Evaluation must be monotone: it may only grow slots and add constraints.
pub trait ConstraintEvaluator {
    /// Apply one constraint. `processed` holds the input objects this constraint
    /// has already handled and is updated by the evaluator.
    fn evaluate(&mut self, id: ConstraintId, constraint: &Constraint, processed: &mut ObjectSet);

    /// Record `id` as a reader of every slot `constraint` reads
    fn register(&mut self, id: ConstraintId, constraint: &Constraint);

    /// Constraints created since the last call
    fn take_pending(&mut self) -> Vec<Constraint>;

    /// Readers of slots that grew since the last call
    fn drain_dirty(&mut self) -> Vec<ConstraintId>;
}

/// Read-only points-to queries
///
/// # Example
/// ```ignore
/// fn callees_of<Q: PointsToQuery>(q: &Q, node: NodeId) -> usize {
///     q.resolved_callees(node, ContextId::ROOT).callees().len()
/// }
/// ```
pub trait PointsToQuery {
    /// Objects a local may reference in `code` under `context`
    fn points_to(&self, code: CodeId, var: &str, context: ContextId) -> &ObjectSet;

    /// Callees of a call node under `context`
    fn resolved_callees(&self, node: NodeId, context: ContextId) -> CallResolution;

    /// Type descriptors of the objects a local may reference
    fn types_of(&self, code: CodeId, var: &str, context: ContextId) -> BTreeSet<TypeDesc>;

    /// Whether two locals of the same invocation may reference a common object
    fn may_alias(&self, code: CodeId, a: &str, b: &str, context: ContextId) -> bool {
        let left = self.points_to(code, a, context);
        let right = self.points_to(code, b, context);
        left.iter().any(|o| right.contains(o))
    }
}
