//! Analysis session configuration

use super::error::{ConfigError, ConfigResult};
use super::preset::Preset;
use crate::features::cpa::domain::{ContextPolicy, WideningStrategy};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound for `context_depth_k`
pub const MAX_CONTEXT_DEPTH: usize = 8;

/// What happens to a call that has no callee at quiescence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedCallPolicy {
    /// The call's result receives the unknown object and solving resumes
    #[default]
    Conservative,
    /// The call is only reported
    Ignore,
}

/// CPA configuration
///
/// # Example
/// ```
/// use codegraph_cpa::config::{CpaConfig, Preset};
/// use codegraph_cpa::features::cpa::domain::ContextPolicy;
///
/// let config = CpaConfig::from_preset(Preset::Fast)
///     .context_policy(ContextPolicy::ObjectSensitive)
///     .context_depth_k(1)
///     .heap_depth(1);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CpaConfig {
    pub context_policy: ContextPolicy,

    /// Maximum context length; 0 is context-insensitive
    pub context_depth_k: usize,

    pub widening: WideningStrategy,

    /// Heap-context length, at most `context_depth_k`
    pub heap_depth: usize,

    /// Function or class names; empty means every module-level definition
    pub entry_points: Vec<String>,

    pub unresolved_call_policy: UnresolvedCallPolicy,

    /// Maximum worklist pops (None=unlimited)
    pub iteration_budget: Option<usize>,

    /// Record every worklist pop in the report
    pub record_trace: bool,
}

impl CpaConfig {
    /// Build from preset
    pub fn from_preset(preset: Preset) -> Self {
        let base = Self {
            context_policy: ContextPolicy::CallString,
            context_depth_k: 2,
            widening: WideningStrategy::DropOldest,
            heap_depth: 1,
            entry_points: Vec::new(),
            unresolved_call_policy: UnresolvedCallPolicy::Conservative,
            iteration_budget: Some(1_000_000),
            record_trace: cfg!(feature = "trace"),
        };
        match preset {
            Preset::Fast => Self {
                context_depth_k: 0,
                heap_depth: 0,
                iteration_budget: Some(100_000),
                ..base
            },
            Preset::Balanced => base,
            Preset::Thorough => Self {
                context_policy: ContextPolicy::ObjectSensitive,
                context_depth_k: 3,
                heap_depth: 2,
                iteration_budget: None,
                ..base
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.context_depth_k > MAX_CONTEXT_DEPTH {
            return Err(ConfigError::range_with_hint(
                "context_depth_k",
                self.context_depth_k,
                0,
                MAX_CONTEXT_DEPTH,
                "Context count grows exponentially with k",
            ));
        }

        if self.heap_depth > self.context_depth_k {
            return Err(ConfigError::Conflict {
                issue: format!(
                    "heap_depth {} exceeds context_depth_k {}",
                    self.heap_depth, self.context_depth_k
                ),
                fix: "Set heap_depth <= context_depth_k".to_string(),
            });
        }

        if let Some(n) = self.iteration_budget {
            if n == 0 {
                return Err(ConfigError::Validation(
                    "iteration_budget must be at least 1 or None for unlimited".to_string(),
                ));
            }
        }

        if let Some(blank) = self.entry_points.iter().find(|e| e.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "entry point name must not be blank: {:?}",
                blank
            )));
        }

        Ok(())
    }

    /// Parse and validate YAML
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Builder: Set context_policy
    pub fn context_policy(mut self, v: ContextPolicy) -> Self {
        self.context_policy = v;
        self
    }

    /// Builder: Set context_depth_k
    pub fn context_depth_k(mut self, v: usize) -> Self {
        self.context_depth_k = v;
        self
    }

    /// Builder: Set widening
    pub fn widening(mut self, v: WideningStrategy) -> Self {
        self.widening = v;
        self
    }

    /// Builder: Set heap_depth
    pub fn heap_depth(mut self, v: usize) -> Self {
        self.heap_depth = v;
        self
    }

    /// Builder: Set entry_points
    pub fn entry_points<I, S>(mut self, v: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entry_points = v.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: Set unresolved_call_policy
    pub fn unresolved_call_policy(mut self, v: UnresolvedCallPolicy) -> Self {
        self.unresolved_call_policy = v;
        self
    }

    /// Builder: Set iteration_budget
    pub fn iteration_budget(mut self, v: Option<usize>) -> Self {
        self.iteration_budget = v;
        self
    }

    /// Builder: Set record_trace
    pub fn record_trace(mut self, v: bool) -> Self {
        self.record_trace = v;
        self
    }
}

impl Default for CpaConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Balanced)
    }
}
