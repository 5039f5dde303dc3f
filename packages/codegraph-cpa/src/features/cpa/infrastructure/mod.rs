//! Infrastructure: storage, interning, extraction and the worklist

pub mod constraint_extractor;
pub mod context_table;
pub mod object_set;
pub mod store_graph;
pub mod worklist_solver;

pub use context_table::ContextTable;
pub use object_set::ObjectSet;
pub use store_graph::{Checkpoint, SlotOwner, StoreGraph, ELEMENT_FIELD, KEY_FIELD};
pub use worklist_solver::{StepOutcome, TraceEvent, WorklistSolver};
