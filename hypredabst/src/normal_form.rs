//! Formula normalization: flattening, simplifying connective builders, NNF and DNF.
//!
//! Role
//! - Flatten nested n-ary connectives into ordered operand lists ([`extract_conjuncts`],
//!   [`extract_disjuncts`], [`extract_summands`], [`extract_factors`]).
//! - Build connectives without degenerate arities ([`mk_not`], [`mk_conj`], [`mk_disj`],
//!   [`mk_sum`], [`mk_prod`]), so that downstream pattern matching never sees a
//!   zero- or one-operand `and`.
//! - Convert to negation normal form ([`to_nnf`]) while replacing negated integer
//!   (in)equalities by their relational negation, and to disjunctive normal form
//!   ([`to_dnf`], [`dnf_rows`]).
//!
//! Performance
//! - NNF is linear in the size of the formula tree.
//! - DNF is exponential in the width of the formula by construction. Callers
//!   building DNF from untrusted input should go through [`to_dnf_bounded`] or pass a
//!   row limit to [`dnf_rows`].
use crate::{
    term::{Sort, Term, TermKind, TermManager},
    utils::error::{PredAbsError, PredAbsResult},
};

/// A disjunction of conjunction rows. The empty set is `false`, a set holding one
/// empty row is `true`.
pub type DnfRows = Vec<Vec<Term>>;

fn flatten(
    tm: &TermManager,
    term: Term,
    split: fn(&TermKind) -> Option<&[Term]>,
    neutral: &dyn Fn(Term) -> bool,
    out: &mut Vec<Term>,
) {
    let node = tm.node(term);
    if let Some(args) = split(&*node) {
        for arg in args {
            flatten(tm, *arg, split, neutral, out);
        }
    } else if !neutral(term) {
        out.push(term);
    }
}

fn and_args(node: &TermKind) -> Option<&[Term]> {
    match node {
        TermKind::And(args) => Some(&args[..]),
        _ => None,
    }
}

fn or_args(node: &TermKind) -> Option<&[Term]> {
    match node {
        TermKind::Or(args) => Some(&args[..]),
        _ => None,
    }
}

fn add_args(node: &TermKind) -> Option<&[Term]> {
    match node {
        TermKind::Add(args) => Some(&args[..]),
        _ => None,
    }
}

fn mul_args(node: &TermKind) -> Option<&[Term]> {
    match node {
        TermKind::Mul(args) => Some(&args[..]),
        _ => None,
    }
}

/// Returns the disjuncts of a (possibly nested) `or`, dropping literal `false`.
///
/// Order and multiplicity are preserved. Anything that is not an `or` yields a
/// singleton list (or the empty list for `false`).
pub fn extract_disjuncts(tm: &TermManager, term: Term) -> Vec<Term> {
    let mut out = Vec::new();
    flatten(
        tm,
        term,
        or_args,
        &|t| tm.is_false(t),
        &mut out,
    );
    out
}

/// Returns the conjuncts of a (possibly nested) `and`, dropping literal `true`.
pub fn extract_conjuncts(tm: &TermManager, term: Term) -> Vec<Term> {
    let mut out = Vec::new();
    flatten(
        tm,
        term,
        and_args,
        &|t| tm.is_true(t),
        &mut out,
    );
    out
}

/// Returns the addends of a (possibly nested) `+`, dropping literal `0`.
pub fn extract_summands(tm: &TermManager, term: Term) -> Vec<Term> {
    let mut out = Vec::new();
    flatten(
        tm,
        term,
        add_args,
        &|t| tm.is_zero(t),
        &mut out,
    );
    out
}

/// Returns the factors of a (possibly nested) `*`, dropping literal `1`.
pub fn extract_factors(tm: &TermManager, term: Term) -> Vec<Term> {
    let mut out = Vec::new();
    flatten(
        tm,
        term,
        mul_args,
        &|t| tm.is_one(t),
        &mut out,
    );
    out
}

fn assert_sort(tm: &TermManager, terms: &[Term], sort: Sort, builder: &str) {
    for t in terms {
        assert_eq!(
            tm.sort_of(*t),
            sort,
            "`{builder}` received {} which is not of sort {sort}",
            tm.fmt(*t)
        );
    }
}

/// Returns `not(term)`, folding `true`, `false` and double negation.
pub fn mk_not(tm: &TermManager, term: Term) -> Term {
    assert_sort(tm, &[term], Sort::Bool, "mk_not");
    match &*tm.node(term) {
        TermKind::True => tm.mk_false(),
        TermKind::False => tm.mk_true(),
        TermKind::Not(inner) => *inner,
        _ => tm.not(term),
    }
}

/// Builds an n-ary connective or operator, dropping identity operands and
/// collapsing to the first absorbing operand.
fn mk_folded(
    terms: Vec<Term>,
    is_identity: impl Fn(Term) -> bool,
    is_absorbing: impl Fn(Term) -> bool,
    identity: impl FnOnce() -> Term,
    build: impl FnOnce(Vec<Term>) -> Term,
) -> Term {
    let mut kept = Vec::with_capacity(terms.len());
    for t in terms {
        if is_absorbing(t) {
            return t;
        }
        if !is_identity(t) {
            kept.push(t);
        }
    }

    match kept.len() {
        0 => identity(),
        1 => kept[0],
        _ => build(kept),
    }
}

/// Returns `and(terms)`, optimizing the cases of 0 or 1 operands, `true` operands
/// (dropped) and `false` operands (absorbing).
pub fn mk_conj(tm: &TermManager, terms: impl IntoIterator<Item = Term>) -> Term {
    let terms: Vec<Term> = terms.into_iter().collect();
    assert_sort(tm, &terms, Sort::Bool, "mk_conj");
    mk_folded(
        terms,
        |t| tm.is_true(t),
        |t| tm.is_false(t),
        || tm.mk_true(),
        |kept| tm.and(kept),
    )
}

/// Returns `or(terms)`, optimizing the cases of 0 or 1 operands, `false` operands
/// (dropped) and `true` operands (absorbing).
pub fn mk_disj(tm: &TermManager, terms: impl IntoIterator<Item = Term>) -> Term {
    let terms: Vec<Term> = terms.into_iter().collect();
    assert_sort(tm, &terms, Sort::Bool, "mk_disj");
    mk_folded(
        terms,
        |t| tm.is_false(t),
        |t| tm.is_true(t),
        || tm.mk_false(),
        |kept| tm.or(kept),
    )
}

/// Returns `+(terms)`, optimizing the cases of 0 or 1 operands and `0` operands.
pub fn mk_sum(tm: &TermManager, terms: impl IntoIterator<Item = Term>) -> Term {
    let terms: Vec<Term> = terms.into_iter().collect();
    assert_sort(tm, &terms, Sort::Int, "mk_sum");
    mk_folded(terms, |t| tm.is_zero(t), |_| false, || tm.int(0), |kept| tm.add(kept))
}

/// Returns `*(terms)`, optimizing the cases of 0 or 1 operands, `1` operands
/// (dropped) and `0` operands (absorbing).
pub fn mk_prod(tm: &TermManager, terms: impl IntoIterator<Item = Term>) -> Term {
    let terms: Vec<Term> = terms.into_iter().collect();
    assert_sort(tm, &terms, Sort::Int, "mk_prod");
    mk_folded(terms, |t| tm.is_one(t), |t| tm.is_zero(t), || tm.int(1), |kept| tm.mul(kept))
}

/// Only the binary form of `distinct` over integers is rewritten.
fn as_int_distinct_pair(tm: &TermManager, node: &TermKind) -> Option<(Term, Term)> {
    match node {
        TermKind::Distinct(args) if args.len() == 2 && tm.sort_of(args[0]).is_int() => {
            Some((args[0], args[1]))
        }
        _ => None,
    }
}

/// Relational negation of an atom, or a wrapping `not` for opaque atoms.
fn negate_atom(tm: &TermManager, term: Term) -> Term {
    let node = tm.node(term);
    if let Some((a, b)) = as_int_distinct_pair(tm, &node) {
        return tm.eq(a, b);
    }
    match &*node {
        TermKind::Eq(a, b) if tm.sort_of(*a).is_int() => tm.or([tm.lt(*a, *b), tm.gt(*a, *b)]),
        TermKind::Lt(a, b) => tm.ge(*a, *b),
        TermKind::Le(a, b) => tm.gt(*a, *b),
        TermKind::Gt(a, b) => tm.le(*a, *b),
        TermKind::Ge(a, b) => tm.lt(*a, *b),
        _ => mk_not(tm, term),
    }
}

fn rewrite_atom(tm: &TermManager, term: Term) -> Term {
    match as_int_distinct_pair(tm, &tm.node(term)) {
        Some((a, b)) => tm.or([tm.lt(a, b), tm.gt(a, b)]),
        None => term,
    }
}

fn negate_to_nnf(tm: &TermManager, term: Term) -> Term {
    match &*tm.node(term) {
        TermKind::And(args) => mk_disj(tm, args.iter().map(|a| negate_to_nnf(tm, *a))),
        TermKind::Or(args) => mk_conj(tm, args.iter().map(|a| negate_to_nnf(tm, *a))),
        TermKind::Not(inner) => to_nnf(tm, *inner),
        _ => negate_atom(tm, term),
    }
}

/// Returns `term` in negation normal form.
///
/// Negations are pushed through `and`/`or` with De Morgan's laws. A negation that
/// reaches an integer (in)equality is replaced by the complementary relation
/// (`¬(a = b)` becomes `a < b ∨ a > b`, `¬(a < b)` becomes `a >= b`, ...). A negation
/// over any other atom stays wrapped around it.
pub fn to_nnf(tm: &TermManager, term: Term) -> Term {
    match &*tm.node(term) {
        TermKind::And(args) => mk_conj(tm, args.iter().map(|a| to_nnf(tm, *a))),
        TermKind::Or(args) => mk_disj(tm, args.iter().map(|a| to_nnf(tm, *a))),
        TermKind::Not(inner) => negate_to_nnf(tm, *inner),
        _ => rewrite_atom(tm, term),
    }
}

fn check_rows(rows: usize, limit: Option<usize>) -> PredAbsResult<()> {
    match limit {
        Some(limit) if rows > limit => Err(PredAbsError::DnfRowLimitExceeded { limit }),
        _ => Ok(()),
    }
}

fn nnf_dnf_rows(tm: &TermManager, term: Term, limit: Option<usize>) -> PredAbsResult<DnfRows> {
    match &*tm.node(term) {
        TermKind::And(args) => {
            // Cartesian product of the children's row sets.
            let mut rows: DnfRows = vec![Vec::new()];
            for arg in args {
                let next = nnf_dnf_rows(tm, *arg, limit)?;
                if next.is_empty() {
                    return Ok(Vec::new());
                }
                check_rows(rows.len() * next.len(), limit)?;

                let mut product = Vec::with_capacity(rows.len() * next.len());
                for tail in &next {
                    for head in &rows {
                        let mut row = head.clone();
                        row.extend_from_slice(tail);
                        product.push(row);
                    }
                }
                rows = product;
            }
            Ok(rows)
        }
        TermKind::Or(args) => {
            let mut rows = Vec::new();
            for arg in args {
                rows.extend(nnf_dnf_rows(tm, *arg, limit)?);
                check_rows(rows.len(), limit)?;
            }
            Ok(rows)
        }
        TermKind::True => Ok(vec![Vec::new()]),
        TermKind::False => Ok(Vec::new()),
        _ => {
            assert_sort(tm, &[term], Sort::Bool, "to_dnf");
            Ok(vec![vec![term]])
        }
    }
}

/// Returns the rows of the DNF of `term`: each row is one conjunction of NNF literals.
///
/// With `limit` set, the conversion stops with
/// [`PredAbsError::DnfRowLimitExceeded`] as soon as an intermediate row set would
/// grow beyond `limit` rows.
pub fn dnf_rows(tm: &TermManager, term: Term, limit: Option<usize>) -> PredAbsResult<DnfRows> {
    nnf_dnf_rows(tm, to_nnf(tm, term), limit)
}

fn assemble(tm: &TermManager, rows: DnfRows) -> Term {
    mk_disj(tm, rows.into_iter().map(|row| mk_conj(tm, row)))
}

/// Returns `term` in disjunctive normal form (with NNF literals).
pub fn to_dnf(tm: &TermManager, term: Term) -> Term {
    match dnf_rows(tm, term, None) {
        Ok(rows) => assemble(tm, rows),
        Err(_) => unreachable!("unbounded DNF conversion cannot exceed a limit"),
    }
}

/// Same as [`to_dnf`] but fails once more than `max_rows` rows would be built.
pub fn to_dnf_bounded(tm: &TermManager, term: Term, max_rows: usize) -> PredAbsResult<Term> {
    Ok(assemble(tm, dnf_rows(tm, term, Some(max_rows))?))
}
