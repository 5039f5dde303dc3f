/*
 * Codegraph CPA - Context-sensitive points-to analysis
 *
 * Feature-First Hexagonal Architecture:
 * - config/    : CpaConfig, presets, YAML loading
 * - features/  : ir (program model) and cpa (analysis)
 * - shared/    : Node annotations owned by downstream passes
 *
 * Performance:
 * - Arena + integer handles for the cyclic heap graph
 * - Interned contexts, O(1) comparison
 * - Rayon for independent sessions
 */

#![allow(clippy::too_many_arguments)] // Constraint evaluation takes many slots
#![allow(clippy::type_complexity)] // Composite map keys
#![allow(clippy::new_without_default)] // Default impl not always needed
#![allow(clippy::module_inception)] // Module naming intentional

pub mod config;
pub mod errors;
pub mod features;
pub mod shared;

pub use config::{CpaConfig, Preset, UnresolvedCallPolicy};
pub use errors::{CpaError, Result};
pub use features::cpa::{
    analyze, analyze_batch, AnalysisReport, AnalysisSession, EntryPoint, PointsToQuery,
    ResultStore,
};
pub use features::ir::{Program, ProgramBuilder};
