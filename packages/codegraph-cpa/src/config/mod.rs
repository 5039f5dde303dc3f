//! Configuration
//!
//! `CpaConfig` can be built from a [`Preset`], adjusted with builder setters or
//! loaded from YAML; `validate()` runs before a session starts.

pub mod cpa_config;
pub mod error;
pub mod preset;

pub use cpa_config::{CpaConfig, UnresolvedCallPolicy, MAX_CONTEXT_DEPTH};
pub use error::{ConfigError, ConfigResult};
pub use preset::Preset;
