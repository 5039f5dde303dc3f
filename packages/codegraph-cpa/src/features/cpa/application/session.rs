//! Analysis session (IPA driver)
//!
//! One session owns all analysis state for one program: store graph, context table,
//! invocations and the worklist. Sessions share nothing, so independent programs can
//! be analyzed in parallel (see [`analyze_batch`]).
//!
//! # Usage
//! ```
//! use codegraph_cpa::config::CpaConfig;
//! use codegraph_cpa::features::cpa::application::analyze;
//! use codegraph_cpa::features::ir::{Expr, Param, ProgramBuilder, Stmt};
//!
//! let mut b = ProgramBuilder::new();
//! let ident = b.function("ident", vec![Param::new("x")], vec![Stmt::ret(Expr::local("x"))]);
//! b.function(
//!     "main",
//!     vec![],
//!     vec![Stmt::assign("y", Expr::call(Expr::global("ident"), vec![Expr::int(1)]))],
//! );
//! let program = b.build().unwrap();
//!
//! let report = analyze(&program, &CpaConfig::default().entry_points(["main"])).unwrap();
//! assert!(report.status.is_converged());
//! assert_eq!(report.results.contexts_of(ident).len(), 1);
//! ```

use super::engine::CpaEngine;
use super::result_store::ResultStore;
use crate::config::{CpaConfig, UnresolvedCallPolicy};
use crate::errors::{CpaError, Result};
use crate::features::cpa::domain::{
    AnalysisStats, AnalysisStatus, ConstraintKind, ContextId, Diagnostic, InvocationId,
};
use crate::features::cpa::infrastructure::{ObjectSet, StepOutcome, TraceEvent, WorklistSolver};
use crate::features::ir::{ClassId, CodeId, GlobalDef, Program};
use crate::shared::AnnotationStore;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Where analysis starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryPoint {
    Function(CodeId),
    /// Every method of the class, with `self` bound to one synthetic instance
    Class(ClassId),
}

/// Everything a finished session produces
#[derive(Debug)]
pub struct AnalysisReport {
    pub status: AnalysisStatus,
    pub results: ResultStore,
    /// Sorted, without duplicates
    pub diagnostics: Vec<Diagnostic>,
    /// Entry points that reach a malformed invocation
    pub incomplete_entry_points: Vec<String>,
    pub stats: AnalysisStats,
    /// Worklist pops, empty unless `record_trace` is set
    pub trace: Vec<TraceEvent>,
    /// Node annotations; the analysis attaches a
    /// [`CallAnnotation`](super::result_store::CallAnnotation) to every reached call
    pub annotations: AnnotationStore,
}

impl AnalysisReport {
    pub fn diagnostics_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.diagnostics.iter().filter(move |d| d.kind() == kind)
    }
}

pub struct AnalysisSession<'p> {
    program: &'p Program,
    config: CpaConfig,
    engine: CpaEngine<'p>,
    solver: WorklistSolver,
    entries: Vec<(String, Vec<InvocationId>)>,
}

impl<'p> AnalysisSession<'p> {
    pub fn new(program: &'p Program, config: CpaConfig) -> Result<Self> {
        config.validate()?;
        info!(
            policy = config.context_policy.as_str(),
            k = config.context_depth_k,
            heap_depth = config.heap_depth,
            codes = program.codes().count(),
            classes = program.classes().count(),
            "cpa session created"
        );
        Ok(Self {
            program,
            engine: CpaEngine::new(program, &config),
            solver: WorklistSolver::new(config.iteration_budget, config.record_trace),
            config,
            entries: Vec::new(),
        })
    }

    #[inline]
    pub fn config(&self) -> &CpaConfig {
        &self.config
    }

    /// Seed entry points in the root context
    pub fn register_entry_points(&mut self, entries: &[EntryPoint]) {
        for entry in entries {
            let (name, invocations) = match *entry {
                EntryPoint::Function(code) => (
                    self.program.qualified_name(code),
                    vec![self.engine.enter_function(code)],
                ),
                EntryPoint::Class(class) => (
                    self.program.class(class).name.clone(),
                    self.engine.enter_class(class),
                ),
            };
            debug!(entry = %name, invocations = invocations.len(), "entry point registered");
            self.entries.push((name, invocations));
        }
    }

    /// Seed the entry points named in the configuration
    ///
    /// Names are module-level functions or classes, or `Class.method`. An empty list
    /// selects every module-level definition in name order.
    pub fn register_configured_entry_points(&mut self) -> Result<usize> {
        let entries = if self.config.entry_points.is_empty() {
            self.program
                .globals()
                .map(|(_, def)| Self::entry_of(def))
                .collect::<Vec<_>>()
        } else {
            self.config
                .entry_points
                .iter()
                .map(|name| self.resolve_entry(name))
                .collect::<Result<Vec<_>>>()?
        };
        self.register_entry_points(&entries);
        Ok(entries.len())
    }

    fn entry_of(def: GlobalDef) -> EntryPoint {
        match def {
            GlobalDef::Function(code) => EntryPoint::Function(code),
            GlobalDef::Class(class) => EntryPoint::Class(class),
        }
    }

    fn resolve_entry(&self, name: &str) -> Result<EntryPoint> {
        let name = name.trim();
        self.program
            .global(name)
            .map(Self::entry_of)
            .or_else(|| self.program.code_by_name(name).map(EntryPoint::Function))
            .ok_or_else(|| CpaError::UnknownEntryPoint(name.to_string()))
    }

    /// Evaluate a single constraint
    ///
    /// `Quiescent` is only returned once unresolved calls have been handled, so a
    /// session driven by `step` reaches the same fixpoint as [`run`](Self::run).
    pub fn step(&mut self) -> StepOutcome {
        loop {
            match self.solver.step(&mut self.engine) {
                StepOutcome::Quiescent if self.resume_unresolved() => continue,
                outcome => return outcome,
            }
        }
    }

    /// Solve to quiescence or until the budget runs out
    ///
    /// With the conservative policy, every unresolved call's result receives the
    /// unknown object and solving resumes until no new unresolved call appears.
    pub fn run(&mut self) -> AnalysisStatus {
        loop {
            match self.solver.run(&mut self.engine) {
                StepOutcome::Quiescent if self.resume_unresolved() => continue,
                StepOutcome::Quiescent => return AnalysisStatus::Converged,
                _ => {
                    return AnalysisStatus::NotConverged {
                        iterations: self.solver.iterations(),
                    }
                }
            }
        }
    }

    /// Inject unknown results at quiescence; true if solving must resume
    fn resume_unresolved(&mut self) -> bool {
        if self.config.unresolved_call_policy != UnresolvedCallPolicy::Conservative {
            return false;
        }
        let injected = self.engine.inject_unknown_results(self.solver.constraints());
        if injected > 0 {
            debug!(calls = injected, "resuming after unknown call results");
        }
        injected > 0
    }

    /// Quiescent, with nothing left to inject
    fn is_settled(&self) -> bool {
        self.solver.queued() == 0
            && (self.config.unresolved_call_policy != UnresolvedCallPolicy::Conservative
                || !self.engine.has_pending_unknown_results(self.solver.constraints()))
    }

    /// Current objects of a local; grows monotonically while solving
    pub fn current_points_to(&self, code: CodeId, var: &str, context: ContextId) -> ObjectSet {
        self.engine.local_objects(code, var, context)
    }

    /// Result snapshot of the current state
    pub fn snapshot(&self) -> ResultStore {
        ResultStore::build(&self.engine, self.solver.constraints())
    }

    #[inline]
    pub fn iterations(&self) -> usize {
        self.solver.iterations()
    }

    /// Finish the session and build the report
    ///
    /// A session that was not solved to its fixpoint reports `NotConverged`, and its
    /// results are a lower bound.
    pub fn finish(mut self) -> AnalysisReport {
        self.solver.sync(&mut self.engine);
        let status = if self.is_settled() {
            AnalysisStatus::Converged
        } else {
            AnalysisStatus::NotConverged {
                iterations: self.solver.iterations(),
            }
        };
        let constraints = self.solver.constraints();

        let results = ResultStore::build(&self.engine, constraints);

        let mut diagnostics = self.engine.diagnostics.clone();
        diagnostics.extend(self.engine.contexts.overflows().map(|o| Diagnostic::ContextOverflow {
            caller: o.caller,
            element: o.element,
            widened: o.widened,
        }));
        let unresolved = self.engine.unresolved_calls(constraints);
        if !unresolved.is_empty() {
            warn!(calls = unresolved.len(), "unresolved calls at fixpoint");
        }
        diagnostics.extend(
            unresolved
                .iter()
                .map(|&(node, context, caller)| Diagnostic::UnresolvedCall {
                    node,
                    context,
                    caller,
                }),
        );
        if let AnalysisStatus::NotConverged { iterations } = status {
            diagnostics.insert(Diagnostic::NonConvergence { iterations });
        }

        let incomplete_entry_points = self
            .entries
            .iter()
            .filter(|(_, invocations)| {
                invocations.iter().any(|&root| {
                    results
                        .invocations_reachable_from(root)
                        .into_iter()
                        .any(|inv| results.invocation(inv).is_malformed())
                })
            })
            .map(|(name, _)| name.clone())
            .collect();

        let mut constraints_by_kind: BTreeMap<ConstraintKind, usize> = BTreeMap::new();
        for constraint in constraints {
            *constraints_by_kind.entry(constraint.kind()).or_default() += 1;
        }
        let stats = AnalysisStats {
            iterations: self.solver.iterations(),
            constraints: constraints.len(),
            constraints_by_kind,
            invocations: self.engine.invocations.len(),
            objects: self.engine.store.object_count(),
            contexts: self.engine.contexts.len(),
            slots: self.engine.store.slot_count(),
            unresolved_calls: unresolved.len(),
        };

        let mut annotations = AnnotationStore::new();
        results.annotate_calls(&mut annotations);

        info!(
            converged = status.is_converged(),
            iterations = stats.iterations,
            constraints = stats.constraints,
            invocations = stats.invocations,
            objects = stats.objects,
            diagnostics = diagnostics.len(),
            "cpa session finished"
        );

        AnalysisReport {
            status,
            results,
            diagnostics: diagnostics.into_iter().collect(),
            incomplete_entry_points,
            stats,
            trace: self.solver.take_trace(),
            annotations,
        }
    }
}

/// Analyze one program from its configured entry points
pub fn analyze(program: &Program, config: &CpaConfig) -> Result<AnalysisReport> {
    let mut session = AnalysisSession::new(program, config.clone())?;
    session.register_configured_entry_points()?;
    session.run();
    Ok(session.finish())
}

/// Analyze independent programs, in parallel with the `parallel` feature
pub fn analyze_batch(programs: &[Program], config: &CpaConfig) -> Vec<Result<AnalysisReport>> {
    #[cfg(feature = "parallel")]
    {
        programs.par_iter().map(|p| analyze(p, config)).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        programs.iter().map(|p| analyze(p, config)).collect()
    }
}
