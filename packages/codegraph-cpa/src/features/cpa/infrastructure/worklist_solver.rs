//! Worklist Solver
//!
//! FIFO worklist over constraints with per-constraint state:
//! - every added constraint starts `Dirty` and is enqueued in insertion order
//! - a pop moves it to `Processing`; after evaluation it becomes `Clean`
//! - slot growth marks the slot's readers `Dirty` and enqueues each at most once
//! - a constraint dirtied while `Processing` is re-enqueued
//!
//! Each constraint also keeps the set of input objects it has already processed, so
//! derived work is done once per (constraint, object).
//!
//! The solver does not know what constraints mean; evaluation is delegated to a
//! [`ConstraintEvaluator`].

use super::object_set::ObjectSet;
use crate::features::cpa::domain::{Constraint, ConstraintId, ConstraintKind, ConstraintState};
use crate::features::cpa::ports::ConstraintEvaluator;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{trace, warn};

/// One worklist pop, recorded when tracing is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub iteration: usize,
    pub constraint: ConstraintId,
    pub kind: ConstraintKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// One constraint was evaluated
    Processed(ConstraintId),
    /// Nothing left to do
    Quiescent,
    /// The iteration budget is exhausted with work still queued
    BudgetExhausted,
}

#[derive(Debug, Clone, Default)]
struct Entry {
    state: ConstraintState,
    processed: ObjectSet,
}

#[derive(Debug)]
pub struct WorklistSolver {
    constraints: Vec<Constraint>,
    entries: Vec<Entry>,
    queue: VecDeque<ConstraintId>,
    iterations: usize,
    budget: Option<usize>,
    trace: Option<Vec<TraceEvent>>,
}

impl WorklistSolver {
    pub fn new(budget: Option<usize>, record_trace: bool) -> Self {
        Self {
            constraints: Vec::new(),
            entries: Vec::new(),
            queue: VecDeque::new(),
            iterations: 0,
            budget,
            trace: record_trace.then(Vec::new),
        }
    }

    /// Add a constraint; it starts `Dirty` and is enqueued
    pub fn add<E: ConstraintEvaluator + ?Sized>(
        &mut self,
        constraint: Constraint,
        evaluator: &mut E,
    ) -> ConstraintId {
        let id = ConstraintId(self.constraints.len() as u32);
        evaluator.register(id, &constraint);
        self.constraints.push(constraint);
        self.entries.push(Entry::default());
        self.queue.push_back(id);
        id
    }

    /// Schedule a constraint to run again
    pub fn mark_dirty(&mut self, id: ConstraintId) {
        let entry = &mut self.entries[id.0 as usize];
        match entry.state {
            ConstraintState::Dirty => {}
            ConstraintState::Clean | ConstraintState::Processing => {
                entry.state = ConstraintState::Dirty;
                self.queue.push_back(id);
            }
        }
    }

    /// Pull new constraints and dirty marks from the evaluator
    pub fn sync<E: ConstraintEvaluator + ?Sized>(&mut self, evaluator: &mut E) {
        loop {
            let pending = evaluator.take_pending();
            let dirty = evaluator.drain_dirty();
            if pending.is_empty() && dirty.is_empty() {
                break;
            }
            for constraint in pending {
                self.add(constraint, evaluator);
            }
            for id in dirty {
                self.mark_dirty(id);
            }
        }
    }

    /// Pop and evaluate one constraint
    pub fn step<E: ConstraintEvaluator + ?Sized>(&mut self, evaluator: &mut E) -> StepOutcome {
        self.sync(evaluator);
        if self.queue.is_empty() {
            return StepOutcome::Quiescent;
        }
        if let Some(budget) = self.budget {
            if self.iterations >= budget {
                return StepOutcome::BudgetExhausted;
            }
        }

        let Some(id) = self.queue.pop_front() else {
            return StepOutcome::Quiescent;
        };
        let index = id.0 as usize;
        self.iterations += 1;
        self.entries[index].state = ConstraintState::Processing;

        let constraint = &self.constraints[index];
        trace!(iteration = self.iterations, constraint = id.0, kind = constraint.kind().as_str(), "evaluate");
        if let Some(trace) = self.trace.as_mut() {
            trace.push(TraceEvent {
                iteration: self.iterations,
                constraint: id,
                kind: constraint.kind(),
            });
        }
        evaluator.evaluate(id, constraint, &mut self.entries[index].processed);

        // marks raised by this evaluation may hit the constraint itself
        self.sync(evaluator);
        let entry = &mut self.entries[index];
        if entry.state == ConstraintState::Processing {
            entry.state = ConstraintState::Clean;
        }
        StepOutcome::Processed(id)
    }

    /// Run until quiescence or budget exhaustion
    pub fn run<E: ConstraintEvaluator + ?Sized>(&mut self, evaluator: &mut E) -> StepOutcome {
        loop {
            match self.step(evaluator) {
                StepOutcome::Processed(_) => continue,
                StepOutcome::BudgetExhausted => {
                    warn!(
                        iterations = self.iterations,
                        queued = self.queue.len(),
                        "iteration budget exhausted before fixpoint"
                    );
                    return StepOutcome::BudgetExhausted;
                }
                StepOutcome::Quiescent => return StepOutcome::Quiescent,
            }
        }
    }

    #[inline]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    #[inline]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn state(&self, id: ConstraintId) -> ConstraintState {
        self.entries[id.0 as usize].state
    }

    #[inline]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn take_trace(&mut self) -> Vec<TraceEvent> {
        self.trace.as_mut().map(std::mem::take).unwrap_or_default()
    }
}
