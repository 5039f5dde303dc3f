//! Domain layer: abstract objects, contexts, constraints, invocations, diagnostics

pub mod abstract_object;
pub mod constraint;
pub mod context;
pub mod diagnostics;
pub mod invocation;

pub use abstract_object::{AbstractObject, AllocSite, FieldId, ObjectId, TypeDesc};
pub use constraint::{
    CallConstraint, CallTarget, Constraint, ConstraintId, ConstraintKind, ConstraintState, OpRef,
    SlotId, TypeTest,
};
pub use context::{ContextElement, ContextId, ContextPolicy, WideningStrategy};
pub use diagnostics::{AnalysisStats, AnalysisStatus, Diagnostic};
pub use invocation::{
    CallResolution, CallTargets, Invocation, InvocationBody, InvocationId, InvocationStatus,
};
