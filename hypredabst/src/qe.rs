//! Quantifier elimination adapter.
//!
//! The elimination procedure itself is a collaborator behind
//! [`QuantifierEliminator`]. This module fixes how it is called: which variables
//! must be removed, and what the caller may assume about the answer.
//!
//! Elimination is best-effort. An eliminator that cannot remove a variable leaves
//! it in the result and reports it in [`Elimination::residual`]; callers must treat
//! such variables as implicitly existentially quantified.
use log::debug;

use crate::{
    normal_form::{extract_conjuncts, mk_conj},
    subst::{all_vars, replace_leaves},
    term::{Term, TermKind, TermManager},
};

/// Outcome of a quantifier elimination request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elimination {
    pub formula: Term,
    /// Requested variables still occurring in `formula`.
    pub residual: Vec<Term>,
}

/// A procedure existentially projecting variables out of a formula.
///
/// Implementations must never introduce a variable (or constant) that does not
/// occur in the input formula.
pub trait QuantifierEliminator {
    /// Eliminate `vars` (bound variables or uninterpreted constants) from `formula`.
    fn eliminate(&self, tm: &TermManager, vars: &[Term], formula: Term) -> Elimination;
}

/// Eliminate every variable and constant of `formula` that is not in `keep`.
pub fn eliminate_except<Q: QuantifierEliminator + ?Sized>(
    tm: &TermManager,
    qe: &Q,
    keep: &[Term],
    formula: Term,
) -> Elimination {
    let before = all_vars(tm, formula);
    let targets: Vec<Term> = before
        .iter()
        .copied()
        .filter(|v| !keep.contains(v))
        .collect();
    if targets.is_empty() {
        return Elimination {
            formula,
            residual: Vec::new(),
        };
    }

    debug!(
        "Eliminating [{}] from {}",
        tm.fmt_list(&targets),
        tm.fmt(formula)
    );
    let result = qe.eliminate(tm, &targets, formula);

    debug_assert!(
        all_vars(tm, result.formula)
            .iter()
            .all(|v| before.contains(v)),
        "Quantifier elimination introduced new variables"
    );
    if !result.residual.is_empty() {
        debug!(
            "Quantifier elimination left [{}] in place",
            tm.fmt_list(&result.residual)
        );
    }
    result
}

/// Removes variables defined by a top-level equation `v = t` (or `t = v`) where
/// `v` does not occur in `t`, by substituting `t` for `v` in the other conjuncts.
///
/// Variables without such a definition are reported as residual.
#[derive(Debug, Default, Clone, Copy)]
pub struct EqualityEliminator;

impl EqualityEliminator {
    fn definition(tm: &TermManager, var: Term, conjunct: Term) -> Option<Term> {
        let node = tm.node(conjunct);
        let TermKind::Eq(a, b) = &*node else {
            return None;
        };
        let (a, b) = (*a, *b);
        if a == var && !all_vars(tm, b).contains(&var) {
            Some(b)
        } else if b == var && !all_vars(tm, a).contains(&var) {
            Some(a)
        } else {
            None
        }
    }
}

impl QuantifierEliminator for EqualityEliminator {
    fn eliminate(&self, tm: &TermManager, vars: &[Term], formula: Term) -> Elimination {
        let mut conjuncts = extract_conjuncts(tm, formula);

        for var in vars {
            let found = conjuncts
                .iter()
                .enumerate()
                .find_map(|(i, c)| Self::definition(tm, *var, *c).map(|def| (i, def)));
            if let Some((pos, def)) = found {
                conjuncts.remove(pos);
                for c in conjuncts.iter_mut() {
                    *c = replace_leaves(tm, *c, &[*var], &[def]);
                }
            }
        }

        let formula = mk_conj(tm, conjuncts);
        let remaining = all_vars(tm, formula);
        let residual = vars
            .iter()
            .copied()
            .filter(|v| remaining.contains(v))
            .collect();
        Elimination { formula, residual }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Sort;

    #[test]
    fn defined_variables_are_substituted_away() {
        let tm = TermManager::new();
        let x = tm.var(0, Sort::Int);
        let y = tm.var(1, Sort::Int);
        let z = tm.var(2, Sort::Int);
        // z = y + 1 /\ x < z
        let zdef = tm.add([y, tm.int(1)]);
        let f = tm.and([tm.eq(z, zdef), tm.lt(x, z)]);

        let out = eliminate_except(&tm, &EqualityEliminator, &[x, y], f);
        assert_eq!(out.formula, tm.lt(x, zdef));
        assert!(out.residual.is_empty());
    }

    #[test]
    fn undefined_variables_are_residual() {
        let tm = TermManager::new();
        let x = tm.var(0, Sort::Int);
        let z = tm.var(1, Sort::Int);
        let f = tm.lt(x, z);

        let out = eliminate_except(&tm, &EqualityEliminator, &[x], f);
        assert_eq!(out.formula, f);
        assert_eq!(out.residual, vec![z]);
    }

    #[test]
    fn nothing_to_eliminate_returns_the_input() {
        let tm = TermManager::new();
        let x = tm.constant("x", Sort::Int);
        let f = tm.ge(x, tm.int(0));
        let out = eliminate_except(&tm, &EqualityEliminator, &[x], f);
        assert_eq!(out.formula, f);
    }
}
