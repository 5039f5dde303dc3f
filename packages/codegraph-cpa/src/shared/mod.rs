//! Shared utilities

pub mod annotations;

pub use annotations::AnnotationStore;
