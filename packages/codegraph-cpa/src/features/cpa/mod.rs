//! # Context-sensitive Cartesian Product points-to analysis
//!
//! Inter-procedural, field-sensitive inclusion analysis with dynamic dispatch resolved
//! from points-to facts:
//! - **Store Graph**: arena of abstract objects and their field edges
//! - **Context Model**: interned k-limited call-string or receiver contexts
//! - **Worklist Solver**: FIFO fixpoint over six constraint kinds
//! - **IPA driver**: discovers `(code, context)` invocations and binds calls
//! - **Result Store**: read-only queries and JSON export
//!
//! ## Usage
//! ```text
//! use codegraph_cpa::features::cpa::{analyze, PointsToQuery};
//!
//! let report = analyze(&program, &CpaConfig::default())?;
//! let objects = report.results.points_to(main, "x", ContextId::ROOT);
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use application::{
    analyze, analyze_batch, AnalysisReport, AnalysisSession, CallAnnotation, EntryPoint,
    OpEffects, ResultStore,
};
pub use domain::{
    AbstractObject, AllocSite, AnalysisStats, AnalysisStatus, CallResolution, CallTargets,
    ContextElement, ContextId, ContextPolicy, Diagnostic, ObjectId, TypeDesc, WideningStrategy,
};
pub use infrastructure::{ObjectSet, StepOutcome, TraceEvent};
pub use ports::{ConstraintEvaluator, PointsToQuery};
