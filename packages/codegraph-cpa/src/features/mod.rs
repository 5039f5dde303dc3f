//! Feature modules
//!
//! - ir/  - normalized program model consumed by the analysis
//! - cpa/ - points-to analysis (domain, ports, application, infrastructure)

pub mod cpa;
pub mod ir;
