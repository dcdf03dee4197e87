//! Substitution of bound variables and de-Bruijn index shifting.
//!
//! Role
//! - [`SubstitutionTable`] maps variable indices to replacement terms. It is built
//!   once (see [`SubstitutionBuilder`]) and applied to as many formulas as needed.
//! - [`shift`] and [`inv_shift`] renumber the free variables of a term when it is
//!   moved under (or out of) `n` enclosing binders.
//! - [`all_vars`] and [`replace_consts`] collect the variables of a formula and turn
//!   constants back into variables.
//!
//! All traversals track the binder depth: below a quantifier binding `k` variables,
//! index `i >= k` denotes the free variable `i - k`. Substitution is therefore
//! capture-avoiding without any renaming; a replacement moved under binders is
//! shifted by the binder depth.
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::term::{Sort, Term, TermKind, TermManager};

/// Sparse assignment of replacement terms to variable indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionTable {
    bindings: BTreeMap<u32, Term>,
}

/// Incremental builder for a [`SubstitutionTable`].
///
/// Each index may be bound at most once; binding an index twice panics, since it
/// means a parameter was supplied twice.
#[derive(Debug, Default)]
pub struct SubstitutionBuilder {
    bindings: BTreeMap<u32, Term>,
}

impl SubstitutionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind variable `index` to `term`.
    pub fn bind(&mut self, index: u32, term: Term) -> &mut Self {
        let previous = self.bindings.insert(index, term);
        assert!(
            previous.is_none(),
            "Variable #{index} is bound more than once in the same substitution"
        );
        self
    }

    /// Bind the variable `var` (which must be a [`TermKind::Var`]) to `term`.
    pub fn bind_var(&mut self, tm: &TermManager, var: Term, term: Term) -> &mut Self {
        let (index, sort) = match &*tm.node(var) {
            TermKind::Var { index, sort } => (*index, *sort),
            _ => panic!("Substitution key {} is not a bound variable", tm.fmt(var)),
        };
        assert_eq!(
            sort,
            tm.sort_of(term),
            "Variable #{index} cannot be replaced by {} of a different sort",
            tm.fmt(term)
        );
        self.bind(index, term)
    }

    pub fn finish(&mut self) -> SubstitutionTable {
        SubstitutionTable {
            bindings: std::mem::take(&mut self.bindings),
        }
    }
}

impl SubstitutionTable {
    /// Map each variable of `vars` to the term at the same position in `terms`.
    pub fn build(tm: &TermManager, vars: &[Term], terms: &[Term]) -> Self {
        assert_eq!(
            vars.len(),
            terms.len(),
            "Substitution built from {} variables and {} terms",
            vars.len(),
            terms.len()
        );
        let mut builder = SubstitutionBuilder::new();
        for (var, term) in vars.iter().zip(terms) {
            builder.bind_var(tm, *var, *term);
        }
        builder.finish()
    }

    /// Map index `i` to `terms[i]` for every position of `terms`.
    pub fn from_dense(terms: &[Term]) -> Self {
        Self {
            bindings: terms
                .iter()
                .enumerate()
                .map(|(i, t)| (i as u32, *t))
                .collect(),
        }
    }

    pub fn get(&self, index: u32) -> Option<Term> {
        self.bindings.get(&index).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Largest bound index, if any.
    pub fn max_index(&self) -> Option<u32> {
        self.bindings.keys().next_back().copied()
    }

    fn densify(&self) -> Vec<Option<Term>> {
        let mut dense = vec![None; self.max_index().map_or(0, |m| m as usize + 1)];
        for (index, term) in &self.bindings {
            dense[*index as usize] = Some(*term);
        }
        dense
    }

    /// Replace every free occurrence of a bound index by its assigned term.
    /// Indices without an assignment are left untouched.
    pub fn apply(&self, tm: &TermManager, term: Term) -> Term {
        if self.is_empty() {
            return term;
        }
        let dense = self.densify();
        let mut cache = HashMap::new();
        apply_at(tm, &dense, term, 0, &mut cache)
    }

    pub fn apply_all(&self, tm: &TermManager, terms: &[Term]) -> Vec<Term> {
        terms.iter().map(|t| self.apply(tm, *t)).collect()
    }
}

/// Rewrite children of `term`, entering quantifiers with an increased depth.
fn map_children(
    tm: &TermManager,
    term: Term,
    node: &TermKind,
    depth: u32,
    mut f: impl FnMut(Term, u32) -> Term,
) -> Term {
    let inner_depth = match node {
        TermKind::Quantifier { sorts, .. } => depth + sorts.len() as u32,
        _ => depth,
    };
    let children: Vec<Term> = node
        .children()
        .iter()
        .map(|c| f(*c, inner_depth))
        .collect();
    tm.rebuild(term, &children)
}

fn apply_at(
    tm: &TermManager,
    dense: &[Option<Term>],
    term: Term,
    depth: u32,
    cache: &mut HashMap<(Term, u32), Term>,
) -> Term {
    if let Some(done) = cache.get(&(term, depth)) {
        return *done;
    }

    let node = tm.node(term);
    let result = match &*node {
        TermKind::Var { index, .. } if *index >= depth => {
            match dense.get((*index - depth) as usize).copied().flatten() {
                Some(replacement) => shift(tm, replacement, depth),
                None => term,
            }
        }
        _ => map_children(tm, term, &node, depth, |child, d| {
            apply_at(tm, dense, child, d, cache)
        }),
    };

    cache.insert((term, depth), result);
    result
}

fn shift_at(
    tm: &TermManager,
    term: Term,
    depth: u32,
    delta: i64,
    cache: &mut HashMap<(Term, u32), Term>,
) -> Term {
    if let Some(done) = cache.get(&(term, depth)) {
        return *done;
    }

    let node = tm.node(term);
    let result = match &*node {
        TermKind::Var { index, sort } if *index >= depth => {
            let shifted = *index as i64 + delta;
            assert!(
                shifted >= depth as i64,
                "Shifting variable #{index} by {delta} under {depth} binders leaves its scope"
            );
            tm.var(shifted as u32, *sort)
        }
        _ => map_children(tm, term, &node, depth, |child, d| {
            shift_at(tm, child, d, delta, cache)
        }),
    };

    cache.insert((term, depth), result);
    result
}

/// Returns `term` with the index of every free variable increased by `n`.
pub fn shift(tm: &TermManager, term: Term, n: u32) -> Term {
    if n == 0 {
        return term;
    }
    shift_at(tm, term, 0, n as i64, &mut HashMap::new())
}

pub fn shift_all(tm: &TermManager, terms: &[Term], n: u32) -> Vec<Term> {
    terms.iter().map(|t| shift(tm, *t, n)).collect()
}

/// Returns `term` with the index of every free variable decreased by `n`.
///
/// Every free index of `term` must be at least `n`.
pub fn inv_shift(tm: &TermManager, term: Term, n: u32) -> Term {
    if n == 0 {
        return term;
    }
    shift_at(tm, term, 0, -(n as i64), &mut HashMap::new())
}

pub fn inv_shift_all(tm: &TermManager, terms: &[Term], n: u32) -> Vec<Term> {
    terms.iter().map(|t| inv_shift(tm, *t, n)).collect()
}

/// Returns the free variables and uninterpreted constants occurring in `term`,
/// each once, in order of first discovery.
pub fn all_vars(tm: &TermManager, term: Term) -> Vec<Term> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut todo = vec![(term, 0u32)];
    while let Some((t, depth)) = todo.pop() {
        if !seen.insert((t, depth)) {
            continue;
        }
        let node = tm.node(t);
        let leaf = match &*node {
            TermKind::Const { .. } => Some(t),
            TermKind::Var { index, sort } if *index >= depth => Some(tm.var(index - depth, *sort)),
            TermKind::Var { .. } => None,
            TermKind::Quantifier { sorts, body, .. } => {
                todo.push((*body, depth + sorts.len() as u32));
                None
            }
            _ => {
                todo.extend(node.children().iter().rev().map(|c| (*c, depth)));
                None
            }
        };
        if let Some(leaf) = leaf {
            if !found.contains(&leaf) {
                found.push(leaf);
            }
        }
    }
    found
}

/// Free variable indices of `term` with their sorts.
pub fn free_vars(tm: &TermManager, term: Term) -> BTreeMap<u32, Sort> {
    all_vars(tm, term)
        .into_iter()
        .filter_map(|v| match &*tm.node(v) {
            TermKind::Var { index, sort } => Some((*index, *sort)),
            _ => None,
        })
        .collect()
}

/// Replace occurrences of the leaves `from[i]` (constants or free variables) by `to[i]`.
pub(crate) fn replace_leaves(tm: &TermManager, term: Term, from: &[Term], to: &[Term]) -> Term {
    assert_eq!(from.len(), to.len());
    let mut cache = HashMap::new();
    replace_at(tm, term, from, to, 0, &mut cache)
}

fn replace_at(
    tm: &TermManager,
    term: Term,
    from: &[Term],
    to: &[Term],
    depth: u32,
    cache: &mut HashMap<(Term, u32), Term>,
) -> Term {
    if let Some(done) = cache.get(&(term, depth)) {
        return *done;
    }

    let node = tm.node(term);
    let key = match &*node {
        TermKind::Const { .. } => Some(term),
        TermKind::Var { index, sort } if *index >= depth => Some(tm.var(index - depth, *sort)),
        _ => None,
    };
    let result = match key.and_then(|k| from.iter().position(|f| *f == k)) {
        Some(pos) => shift(tm, to[pos], depth),
        None => map_children(tm, term, &node, depth, |child, d| {
            replace_at(tm, child, from, to, d, cache)
        }),
    };

    cache.insert((term, depth), result);
    result
}

/// Returns `term` with every occurrence of `consts[i]` replaced by `vars[i]`.
///
/// This turns a formula over fresh constants (e.g. built from
/// [`TermManager::fresh_args`]) back into a formula over argument variables.
pub fn replace_consts(tm: &TermManager, term: Term, vars: &[Term], consts: &[Term]) -> Term {
    assert_eq!(
        vars.len(),
        consts.len(),
        "replace_consts called with {} variables and {} constants",
        vars.len(),
        consts.len()
    );
    replace_leaves(tm, term, consts, vars)
}
