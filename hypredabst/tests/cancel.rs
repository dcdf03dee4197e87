use std::sync::{
    Arc, Barrier,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use crossbeam::channel::{Receiver, Sender, bounded};
use hypredabst::cancel::{CancellationManager, DecisionProcedure, SatResult, SolverAnswer, assert_all};
use hypredabst::term::{Sort, Term, TermManager};
use parking_lot::Mutex;

/// Answers a fixed result and records how it was driven.
struct ScriptedSolver {
    answer: SolverAnswer,
    asserted: Mutex<Vec<Term>>,
    checks: AtomicUsize,
    resets: AtomicUsize,
}

impl ScriptedSolver {
    fn new(answer: SolverAnswer) -> Arc<Self> {
        Arc::new(Self {
            answer,
            asserted: Mutex::new(Vec::new()),
            checks: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
        })
    }
}

impl DecisionProcedure for ScriptedSolver {
    fn assert_formula(&self, formula: Term) {
        self.asserted.lock().push(formula);
    }

    fn check(&self, _assumptions: &[Term]) -> SolverAnswer {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }

    fn cancel(&self) {}

    fn reset_cancel(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Blocks its first check until interrupted, answering `Unknown` as a cooperative
/// procedure would. Later checks answer `Sat` right away.
struct BlockingSolver {
    started: Sender<()>,
    interrupt_tx: Sender<()>,
    interrupt_rx: Receiver<()>,
    blocked_once: AtomicBool,
    resets: AtomicUsize,
}

impl DecisionProcedure for BlockingSolver {
    fn assert_formula(&self, _formula: Term) {}

    fn check(&self, _assumptions: &[Term]) -> SolverAnswer {
        if self.blocked_once.swap(true, Ordering::SeqCst) {
            return SolverAnswer::Sat;
        }
        self.started.send(()).unwrap();
        self.interrupt_rx.recv().unwrap();
        SolverAnswer::Unknown("interrupted".to_string())
    }

    fn cancel(&self) {
        let _ = self.interrupt_tx.try_send(());
    }

    fn reset_cancel(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
        while self.interrupt_rx.try_recv().is_ok() {}
    }
}

#[test]
fn definite_answers_pass_through() {
    let manager = CancellationManager::new();
    let sat = ScriptedSolver::new(SolverAnswer::Sat);
    let unsat = ScriptedSolver::new(SolverAnswer::Unsat);

    assert_eq!(manager.check(&sat, &[]).unwrap(), SatResult::Sat);
    assert_eq!(manager.check(&unsat, &[]).unwrap(), SatResult::Unsat);
    assert!(!manager.is_running());
}

#[test]
fn unknown_answers_are_solver_failures() {
    let manager = CancellationManager::new();
    let solver = ScriptedSolver::new(SolverAnswer::Unknown("(incomplete quantifiers)".to_string()));

    let err = manager.check(&solver, &[]).unwrap_err();
    assert!(err.is_solver_failure());
    assert!(err.to_string().contains("(incomplete quantifiers)"));
    assert!(!manager.is_running());
}

#[test]
fn cancel_before_check_skips_the_solver() {
    let manager = CancellationManager::new();
    let solver = ScriptedSolver::new(SolverAnswer::Sat);

    manager.cancel();
    manager.cancel();
    assert!(manager.check(&solver, &[]).unwrap_err().is_cancelled());
    assert_eq!(solver.checks.load(Ordering::SeqCst), 0);

    // The request stays pending until it is reset.
    assert!(manager.check(&solver, &[]).unwrap_err().is_cancelled());
    manager.reset_cancel();
    assert_eq!(manager.check(&solver, &[]).unwrap(), SatResult::Sat);
    assert_eq!(solver.checks.load(Ordering::SeqCst), 1);
}

impl BlockingSolver {
    fn new() -> (Arc<Self>, Receiver<()>) {
        let (started_tx, started_rx) = bounded(1);
        let (interrupt_tx, interrupt_rx) = bounded(1);
        let solver = Arc::new(Self {
            started: started_tx,
            interrupt_tx,
            interrupt_rx,
            blocked_once: AtomicBool::new(false),
            resets: AtomicUsize::new(0),
        });
        (solver, started_rx)
    }
}

#[test]
fn cancel_during_check_aborts_the_query() {
    let manager = CancellationManager::new();
    let (solver, started_rx) = BlockingSolver::new();

    std::thread::scope(|scope| {
        let query = scope.spawn(|| manager.check(&solver, &[]));

        started_rx.recv().unwrap();
        assert!(manager.is_running());
        manager.cancel();

        let result = query.join().unwrap();
        assert!(result.unwrap_err().is_cancelled());
    });

    assert!(!manager.is_running());
    assert!(manager.is_cancel_requested());
    assert_eq!(solver.resets.load(Ordering::SeqCst), 1);

    manager.reset_cancel();
    assert_eq!(manager.check(&solver, &[]).unwrap(), SatResult::Sat);
}

#[test]
fn concurrent_cancellers_abort_the_query_once() {
    let manager = CancellationManager::new();
    let (solver, started_rx) = BlockingSolver::new();
    let barrier = Barrier::new(4);

    std::thread::scope(|scope| {
        let query = scope.spawn(|| manager.check(&solver, &[]));
        started_rx.recv().unwrap();

        let (manager, barrier) = (&manager, &barrier);
        let cancellers: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(move || {
                    barrier.wait();
                    manager.cancel();
                })
            })
            .collect();
        for canceller in cancellers {
            canceller.join().unwrap();
        }

        assert!(query.join().unwrap().unwrap_err().is_cancelled());
    });

    assert!(!manager.is_running());
    assert!(manager.is_cancel_requested());
    assert_eq!(solver.resets.load(Ordering::SeqCst), 1);

    manager.reset_cancel();
    assert_eq!(manager.check(&solver, &[]).unwrap(), SatResult::Sat);
}

#[test]
fn trait_object_procedures_can_be_checked() {
    let manager = CancellationManager::new();
    let scripted = ScriptedSolver::new(SolverAnswer::Unsat);
    let solver: Arc<dyn DecisionProcedure> = scripted.clone();

    assert_eq!(manager.check_dyn(&solver, &[]).unwrap(), SatResult::Unsat);
    assert_eq!(scripted.checks.load(Ordering::SeqCst), 1);

    manager.cancel();
    assert!(manager.check_dyn(&solver, &[]).unwrap_err().is_cancelled());
    assert_eq!(scripted.checks.load(Ordering::SeqCst), 1);
}

#[test]
#[should_panic]
fn reset_while_running_panics() {
    struct ResettingSolver {
        manager: Arc<CancellationManager>,
    }

    impl DecisionProcedure for ResettingSolver {
        fn assert_formula(&self, _formula: Term) {}

        fn check(&self, _assumptions: &[Term]) -> SolverAnswer {
            self.manager.reset_cancel();
            SolverAnswer::Sat
        }

        fn cancel(&self) {}

        fn reset_cancel(&self) {}
    }

    let manager = Arc::new(CancellationManager::new());
    let solver = Arc::new(ResettingSolver {
        manager: manager.clone(),
    });
    let _ = manager.check(&solver, &[]);
}

#[test]
fn running_state_is_cleared_when_the_solver_panics() {
    struct PanickingSolver;

    impl DecisionProcedure for PanickingSolver {
        fn assert_formula(&self, _formula: Term) {}

        fn check(&self, _assumptions: &[Term]) -> SolverAnswer {
            panic!("solver crashed");
        }

        fn cancel(&self) {}

        fn reset_cancel(&self) {}
    }

    let manager = CancellationManager::new();
    let solver = Arc::new(PanickingSolver);
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        manager.check(&solver, &[])
    }));
    assert!(outcome.is_err());
    assert!(!manager.is_running());
    manager.reset_cancel();
}

#[test]
fn assert_all_forwards_every_formula() {
    let tm = TermManager::new();
    let x = tm.constant("x", Sort::Int);
    let formulas = [tm.ge(x, tm.int(0)), tm.lt(x, tm.int(10))];
    let solver = ScriptedSolver::new(SolverAnswer::Sat);

    assert_all(&*solver, &formulas);
    assert_eq!(*solver.asserted.lock(), formulas.to_vec());
}
