//! Cancellation-safe access to the decision procedure.
//!
//! Every satisfiability query issued by the refinement loop goes through
//! [`CancellationManager::check`]. A cancellation requested from any thread, at
//! any time, is either observed before the query starts (the procedure is never
//! invoked) or forwarded to the procedure that is running, and the query then
//! reports [`PredAbsError::Cancelled`].
//!
//! The running procedure and the cancellation flag live behind a single mutex so
//! that recording the running procedure, testing the flag and clearing the
//! running procedure are atomic with respect to [`CancellationManager::cancel`].
//! The lock is never held while the procedure runs.
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

use crate::{
    term::Term,
    utils::error::{PredAbsError, PredAbsResult},
};

/// Raw answer of a decision procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverAnswer {
    Sat,
    Unsat,
    /// No definite answer; carries the procedure's explanation.
    Unknown(String),
}

/// Definite answer of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
}

/// An incremental decision procedure supporting cooperative interruption.
///
/// `cancel` may be called from another thread while `check` runs and must make
/// `check` return promptly. After an interrupted call, `reset_cancel` is invoked
/// before the procedure is used again.
pub trait DecisionProcedure: Send + Sync {
    fn assert_formula(&self, formula: Term);

    /// Check the satisfiability of the asserted formulas under `assumptions`.
    fn check(&self, assumptions: &[Term]) -> SolverAnswer;

    fn cancel(&self);

    fn reset_cancel(&self);
}

/// Assert every formula of `formulas`.
pub fn assert_all<S: DecisionProcedure + ?Sized>(solver: &S, formulas: &[Term]) {
    for f in formulas {
        solver.assert_formula(*f);
    }
}

#[derive(Default)]
struct CancelState {
    running: Option<Arc<dyn DecisionProcedure>>,
    cancel_requested: bool,
}

/// Mediates between one query issuer and any number of cancellation requesters.
#[derive(Default)]
pub struct CancellationManager {
    state: Mutex<CancelState>,
}

/// Clears the running procedure if the query unwinds.
struct RunningGuard<'a> {
    manager: &'a CancellationManager,
    armed: bool,
}

impl RunningGuard<'_> {
    /// Clear the running procedure and return whether cancellation was requested,
    /// in one critical section.
    fn release(mut self) -> bool {
        self.armed = false;
        let mut state = self.manager.state.lock();
        state.running = None;
        state.cancel_requested
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.manager.state.lock().running = None;
        }
    }
}

impl CancellationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the current and every future query until
    /// [`CancellationManager::reset_cancel`] is called.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancel_requested = true;
        if let Some(solver) = &state.running {
            trace!("Interrupting the running decision procedure");
            solver.cancel();
        }
    }

    /// Clear a pending cancellation request. No query may be running.
    pub fn reset_cancel(&self) {
        let mut state = self.state.lock();
        assert!(
            state.running.is_none(),
            "Cancellation reset while a query is running"
        );
        state.cancel_requested = false;
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.state.lock().cancel_requested
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running.is_some()
    }

    /// Run `solver.check(assumptions)` unless cancellation has been requested.
    ///
    /// Returns [`PredAbsError::Cancelled`] if cancellation was requested before or
    /// during the call, and [`PredAbsError::SolverFailure`] if the procedure gave
    /// no definite answer. Calling `check` while another `check` on the same
    /// manager is running panics.
    pub fn check<S>(&self, solver: &Arc<S>, assumptions: &[Term]) -> PredAbsResult<SatResult>
    where
        S: DecisionProcedure + 'static,
    {
        let solver: Arc<dyn DecisionProcedure> = solver.clone();
        self.check_dyn(&solver, assumptions)
    }

    /// [`CancellationManager::check`] for a procedure behind a trait object.
    pub fn check_dyn(
        &self,
        solver: &Arc<dyn DecisionProcedure>,
        assumptions: &[Term],
    ) -> PredAbsResult<SatResult> {
        {
            let mut state = self.state.lock();
            if state.cancel_requested {
                trace!("Query cancelled before it started");
                return Err(PredAbsError::Cancelled);
            }
            assert!(state.running.is_none(), "Reentrant query on a cancellation manager");
            state.running = Some(solver.clone());
        }

        let guard = RunningGuard {
            manager: self,
            armed: true,
        };
        let answer = solver.check(assumptions);
        if guard.release() {
            solver.reset_cancel();
            trace!("Query cancelled while running");
            return Err(PredAbsError::Cancelled);
        }

        match answer {
            SolverAnswer::Sat => Ok(SatResult::Sat),
            SolverAnswer::Unsat => Ok(SatResult::Unsat),
            SolverAnswer::Unknown(diagnostic) => {
                trace!("Decision procedure failed: {diagnostic}");
                Err(PredAbsError::SolverFailure { diagnostic })
            }
        }
    }
}
