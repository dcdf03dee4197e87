use std::collections::HashMap;

use hypredabst::normal_form::*;
use hypredabst::term::{Sort, Term, TermKind, TermManager};
use num_bigint::BigInt;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

struct Vocabulary {
    bools: Vec<Term>,
    ints: Vec<Term>,
}

impl Vocabulary {
    fn new(tm: &TermManager) -> Self {
        Self {
            bools: ["p", "q", "r"]
                .iter()
                .map(|n| tm.constant(n, Sort::Bool))
                .collect(),
            ints: ["x", "y"]
                .iter()
                .map(|n| tm.constant(n, Sort::Int))
                .collect(),
        }
    }
}

fn random_int_term(tm: &TermManager, voc: &Vocabulary, rng: &mut impl Rng) -> Term {
    match rng.random_range(0..=3) {
        0 => tm.int(rng.random_range(-2i64..=2)),
        1 => tm.add([voc.ints[0], tm.int(rng.random_range(-1i64..=1))]),
        _ => voc.ints[rng.random_range(0..voc.ints.len())],
    }
}

fn random_formula(tm: &TermManager, voc: &Vocabulary, budget: usize, rng: &mut impl Rng) -> Term {
    if budget == 0 || rng.random_bool(0.25) {
        let a = random_int_term(tm, voc, rng);
        let b = random_int_term(tm, voc, rng);
        return match rng.random_range(0..=8) {
            0 => tm.eq(a, b),
            1 => tm.lt(a, b),
            2 => tm.le(a, b),
            3 => tm.gt(a, b),
            4 => tm.ge(a, b),
            5 => tm.distinct([a, b]),
            6 => tm.bool(rng.random_bool(0.5)),
            _ => voc.bools[rng.random_range(0..voc.bools.len())],
        };
    }

    match rng.random_range(0..=2) {
        0 => tm.not(random_formula(tm, voc, budget - 1, rng)),
        1 => {
            let n = rng.random_range(2..=3);
            tm.and((0..n).map(|_| random_formula(tm, voc, budget - 1, rng)).collect::<Vec<_>>())
        }
        _ => {
            let n = rng.random_range(2..=3);
            tm.or((0..n).map(|_| random_formula(tm, voc, budget - 1, rng)).collect::<Vec<_>>())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Bool(bool),
    Int(i64),
}

impl Value {
    fn as_bool(self) -> bool {
        match self {
            Value::Bool(b) => b,
            Value::Int(_) => panic!("expected a boolean"),
        }
    }

    fn as_int(self) -> i64 {
        match self {
            Value::Int(i) => i,
            Value::Bool(_) => panic!("expected an integer"),
        }
    }
}

fn eval(tm: &TermManager, env: &HashMap<Term, Value>, t: Term) -> Value {
    let int = |a: Term| eval(tm, env, a).as_int();
    let boolean = |a: Term| eval(tm, env, a).as_bool();
    match &*tm.node(t) {
        TermKind::True => Value::Bool(true),
        TermKind::False => Value::Bool(false),
        TermKind::Numeral(n) => Value::Int(i64::try_from(n).unwrap()),
        TermKind::Const { .. } => env[&t],
        TermKind::Not(a) => Value::Bool(!boolean(*a)),
        TermKind::And(args) => Value::Bool(args.iter().all(|a| boolean(*a))),
        TermKind::Or(args) => Value::Bool(args.iter().any(|a| boolean(*a))),
        TermKind::Eq(a, b) => Value::Bool(eval(tm, env, *a) == eval(tm, env, *b)),
        TermKind::Distinct(args) => {
            let values: Vec<Value> = args.iter().map(|a| eval(tm, env, *a)).collect();
            let all_different = values
                .iter()
                .enumerate()
                .all(|(i, v)| values[i + 1..].iter().all(|w| v != w));
            Value::Bool(all_different)
        }
        TermKind::Lt(a, b) => Value::Bool(int(*a) < int(*b)),
        TermKind::Le(a, b) => Value::Bool(int(*a) <= int(*b)),
        TermKind::Gt(a, b) => Value::Bool(int(*a) > int(*b)),
        TermKind::Ge(a, b) => Value::Bool(int(*a) >= int(*b)),
        TermKind::Add(args) => Value::Int(args.iter().map(|a| int(*a)).sum()),
        TermKind::Mul(args) => Value::Int(args.iter().map(|a| int(*a)).product()),
        other => panic!("cannot evaluate {other:?}"),
    }
}

/// Every assignment of the vocabulary with integers in `-2..=2`.
fn environments(voc: &Vocabulary) -> Vec<HashMap<Term, Value>> {
    let mut envs = Vec::new();
    for bits in 0..(1u32 << voc.bools.len()) {
        for x in -2..=2 {
            for y in -2..=2 {
                let mut env = HashMap::new();
                for (i, b) in voc.bools.iter().enumerate() {
                    env.insert(*b, Value::Bool(bits & (1 << i) != 0));
                }
                env.insert(voc.ints[0], Value::Int(x));
                env.insert(voc.ints[1], Value::Int(y));
                envs.push(env);
            }
        }
    }
    envs
}

fn assert_equivalent(tm: &TermManager, envs: &[HashMap<Term, Value>], a: Term, b: Term) {
    for env in envs {
        assert_eq!(
            eval(tm, env, a),
            eval(tm, env, b),
            "{} and {} disagree",
            tm.fmt(a),
            tm.fmt(b)
        );
    }
}

fn is_int_relation(tm: &TermManager, t: Term) -> bool {
    match &*tm.node(t) {
        TermKind::Eq(a, _) => tm.sort_of(*a).is_int(),
        TermKind::Distinct(args) => args.len() == 2 && tm.sort_of(args[0]).is_int(),
        TermKind::Lt(..) | TermKind::Le(..) | TermKind::Gt(..) | TermKind::Ge(..) => true,
        _ => false,
    }
}

fn assert_nnf(tm: &TermManager, t: Term) {
    let node = tm.node(t);
    match &*node {
        TermKind::Not(inner) => {
            let inner_node = tm.node(*inner);
            assert!(
                !matches!(
                    &*inner_node,
                    TermKind::And(_) | TermKind::Or(_) | TermKind::Not(_) | TermKind::True | TermKind::False
                ),
                "negated connective in {}",
                tm.fmt(t)
            );
            assert!(!is_int_relation(tm, *inner), "negated relation in {}", tm.fmt(t));
        }
        TermKind::And(args) | TermKind::Or(args) => {
            for a in args {
                assert_nnf(tm, *a);
            }
        }
        _ => {}
    }
}

fn is_literal(tm: &TermManager, t: Term) -> bool {
    !matches!(&*tm.node(t), TermKind::And(_) | TermKind::Or(_))
}

#[test]
fn builders_fold_degenerate_arities() {
    let tm = TermManager::new();
    let a = tm.constant("a", Sort::Bool);
    let b = tm.constant("b", Sort::Bool);
    let c = tm.constant("c", Sort::Bool);

    assert_eq!(mk_disj(&tm, []), tm.mk_false());
    assert_eq!(mk_disj(&tm, [a]), a);
    assert_eq!(mk_conj(&tm, []), tm.mk_true());
    assert_eq!(mk_conj(&tm, [a]), a);
    assert_eq!(mk_conj(&tm, [a, tm.mk_true(), b]), tm.and([a, b]));
    assert_eq!(mk_conj(&tm, [a, tm.mk_false(), b]), tm.mk_false());
    assert_eq!(mk_disj(&tm, [a, tm.mk_true()]), tm.mk_true());
    assert_eq!(mk_not(&tm, mk_not(&tm, c)), c);
    assert_eq!(mk_not(&tm, tm.mk_true()), tm.mk_false());
}

#[test]
fn conjunct_extraction_inverts_mk_conj() {
    let tm = TermManager::new();
    let a = tm.constant("a", Sort::Bool);
    let b = tm.constant("b", Sort::Bool);
    let c = tm.constant("c", Sort::Bool);

    assert_eq!(extract_conjuncts(&tm, mk_conj(&tm, [a, b, c])), vec![a, b, c]);
    assert_eq!(extract_conjuncts(&tm, tm.mk_true()), Vec::<Term>::new());
    assert_eq!(extract_disjuncts(&tm, tm.or([a, tm.mk_false(), tm.or([b, a])])), vec![a, b, a]);
    assert_eq!(extract_disjuncts(&tm, tm.mk_false()), Vec::<Term>::new());
}

#[test]
#[should_panic]
fn builders_reject_ill_sorted_operands() {
    let tm = TermManager::new();
    let x = tm.constant("x", Sort::Int);
    mk_conj(&tm, [x]);
}

#[test]
fn negated_relations_are_complemented() {
    let tm = TermManager::new();
    let x = tm.constant("x", Sort::Int);
    let y = tm.constant("y", Sort::Int);

    assert_eq!(to_nnf(&tm, tm.not(tm.eq(x, y))), tm.or([tm.lt(x, y), tm.gt(x, y)]));
    assert_eq!(to_nnf(&tm, tm.not(tm.lt(x, y))), tm.ge(x, y));
    assert_eq!(to_nnf(&tm, tm.not(tm.le(x, y))), tm.gt(x, y));
    assert_eq!(to_nnf(&tm, tm.not(tm.gt(x, y))), tm.le(x, y));
    assert_eq!(to_nnf(&tm, tm.not(tm.ge(x, y))), tm.lt(x, y));
    assert_eq!(to_nnf(&tm, tm.distinct([x, y])), tm.or([tm.lt(x, y), tm.gt(x, y)]));
}

#[test]
fn de_morgan_and_opaque_atoms() {
    let tm = TermManager::new();
    let p = tm.constant("p", Sort::Bool);
    let q = tm.constant("q", Sort::Bool);
    let x = tm.constant("x", Sort::Int);

    let f = tm.not(tm.and([p, tm.or([q, tm.lt(x, tm.int(0))])]));
    let expected = tm.or([tm.not(p), tm.and([tm.not(q), tm.ge(x, tm.int(0))])]);
    assert_eq!(to_nnf(&tm, f), expected);
}

#[test]
fn dnf_of_conjunction_over_disjunction() {
    let tm = TermManager::new();
    let a = tm.constant("a", Sort::Bool);
    let b = tm.constant("b", Sort::Bool);
    let c = tm.constant("c", Sort::Bool);
    let d = tm.constant("d", Sort::Bool);

    let f = tm.and([tm.or([a, b]), tm.or([c, d])]);
    let rows = dnf_rows(&tm, f, None).unwrap();
    assert_eq!(rows, vec![vec![a, c], vec![b, c], vec![a, d], vec![b, d]]);

    assert_eq!(dnf_rows(&tm, tm.and([a, tm.mk_false()]), None).unwrap().len(), 0);
    assert_eq!(dnf_rows(&tm, tm.mk_true(), None).unwrap(), vec![Vec::<Term>::new()]);
    assert_eq!(to_dnf(&tm, tm.and([a, tm.or([b, tm.mk_false()])])), tm.and([a, b]));
}

#[test]
fn random_formulas_normalize_soundly() {
    let tm = TermManager::new();
    let voc = Vocabulary::new(&tm);
    let envs = environments(&voc);
    let mut rng = ChaCha20Rng::seed_from_u64(0x5eed);

    for _ in 0..200 {
        let f = random_formula(&tm, &voc, 3, &mut rng);

        let nnf = to_nnf(&tm, f);
        assert_nnf(&tm, nnf);
        assert_equivalent(&tm, &envs, f, nnf);

        // Keep the exhaustive evaluation affordable.
        if dnf_rows(&tm, f, Some(256)).is_err() {
            continue;
        }
        let dnf = to_dnf(&tm, f);
        for disjunct in extract_disjuncts(&tm, dnf) {
            for literal in extract_conjuncts(&tm, disjunct) {
                assert!(is_literal(&tm, literal), "{} is not in DNF", tm.fmt(dnf));
            }
        }
        assert_equivalent(&tm, &envs, f, dnf);

        let again = to_dnf(&tm, dnf);
        assert_eq!(again, dnf, "DNF of {} is not a fixpoint", tm.fmt(f));
    }
}

#[test]
fn numerals_render_with_explicit_sign() {
    let tm = TermManager::new();
    let x = tm.constant("x", Sort::Int);
    let f = to_nnf(&tm, tm.not(tm.ge(x, tm.int(BigInt::from(-5)))));
    assert_eq!(format!("{}", tm.fmt(f)), "(< x (- 5))");
}
