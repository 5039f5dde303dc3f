//! Application layer: constraint semantics, call resolution and the session driver

pub mod builtins;
pub mod call_resolver;
pub mod engine;
pub mod result_store;
pub mod session;

pub use engine::CpaEngine;
pub use result_store::{CallAnnotation, OpEffects, ResultStore};
pub use session::{analyze, analyze_batch, AnalysisReport, AnalysisSession, EntryPoint};
