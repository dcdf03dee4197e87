//! Terms module
//!
//! This module contains the shared formula DAG every other module of the crate
//! works on. Formulas are hash-consed into a [`TermManager`]:
//!
//! - [`TermKind`] describes one node (connective, relation, arithmetic operator,
//!   application, quantifier or leaf).
//! - [`Term`] is a small `Copy` identifier for an interned node. Two structurally
//!   identical nodes always intern to the same identifier, hence `==` on [`Term`]
//!   is structural equality.
//! - Bound variables are de-Bruijn indexed ([`TermKind::Var`]); a quantifier binds
//!   `sorts.len()` indices, the innermost binder owning index `0`.
//!
//! The manager is shared by reference. Insertion goes through an upgradable read
//! lock so that concurrent readers never block on lookups of existing nodes.
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use log::debug;
use num_bigint::BigInt;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use smallvec::SmallVec;
use strum::EnumIs;

/// Inline storage used for the children of a node.
pub type Terms = SmallVec<Term, 4>;

/// Value sort of a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIs)]
pub enum Sort {
    Bool,
    Int,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::Int => write!(f, "Int"),
        }
    }
}

/// A stable reference to a node stored inside a [`TermManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Term(u32);

impl Term {
    /// Raw index of the node inside its manager.
    pub fn id(self) -> u32 {
        self.0
    }
}

/// A stable reference to a function (or predicate) declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncId(u32);

/// Signature of an uninterpreted function or predicate symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncDecl {
    pub name: String,
    pub domain: Vec<Sort>,
    pub range: Sort,
}

impl FuncDecl {
    pub fn arity(&self) -> usize {
        self.domain.len()
    }
}

impl fmt::Display for FuncDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIs)]
pub enum QuantifierKind {
    Forall,
    Exists,
}

/// One node of the formula DAG.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIs)]
pub enum TermKind {
    True,
    False,
    /// Integer literal.
    Numeral(BigInt),
    /// Uninterpreted nullary constant.
    Const { name: Arc<str>, sort: Sort },
    /// De-Bruijn indexed bound variable.
    Var { index: u32, sort: Sort },
    Not(Term),
    And(Terms),
    Or(Terms),
    Eq(Term, Term),
    Distinct(Terms),
    Lt(Term, Term),
    Le(Term, Term),
    Gt(Term, Term),
    Ge(Term, Term),
    Add(Terms),
    Mul(Terms),
    /// Application of a declared function or predicate symbol.
    App { func: FuncId, args: Terms },
    /// Binds `sorts.len()` variables over `body`; the last sort is index `0`.
    Quantifier {
        kind: QuantifierKind,
        sorts: SmallVec<Sort, 2>,
        body: Term,
    },
}

impl TermKind {
    /// Children of this node in left-to-right order. A quantifier exposes its body.
    pub fn children(&self) -> Terms {
        match self {
            TermKind::True
            | TermKind::False
            | TermKind::Numeral(_)
            | TermKind::Const { .. }
            | TermKind::Var { .. } => Terms::new(),
            TermKind::Not(inner) => smallvec::smallvec![*inner],
            TermKind::Eq(a, b)
            | TermKind::Lt(a, b)
            | TermKind::Le(a, b)
            | TermKind::Gt(a, b)
            | TermKind::Ge(a, b) => smallvec::smallvec![*a, *b],
            TermKind::And(args)
            | TermKind::Or(args)
            | TermKind::Distinct(args)
            | TermKind::Add(args)
            | TermKind::Mul(args)
            | TermKind::App { args, .. } => args.clone(),
            TermKind::Quantifier { body, .. } => smallvec::smallvec![*body],
        }
    }

    /// Rebuild this node with `children` in place of the current ones.
    ///
    /// `children` must have the length returned by [`TermKind::children`].
    pub fn with_children(&self, children: &[Term]) -> TermKind {
        assert_eq!(
            children.len(),
            self.children().len(),
            "Rebuilding {self:?} with a mismatched number of children"
        );
        let list = || children.iter().copied().collect::<Terms>();
        match self {
            TermKind::True
            | TermKind::False
            | TermKind::Numeral(_)
            | TermKind::Const { .. }
            | TermKind::Var { .. } => self.clone(),
            TermKind::Not(_) => TermKind::Not(children[0]),
            TermKind::Eq(..) => TermKind::Eq(children[0], children[1]),
            TermKind::Lt(..) => TermKind::Lt(children[0], children[1]),
            TermKind::Le(..) => TermKind::Le(children[0], children[1]),
            TermKind::Gt(..) => TermKind::Gt(children[0], children[1]),
            TermKind::Ge(..) => TermKind::Ge(children[0], children[1]),
            TermKind::And(_) => TermKind::And(list()),
            TermKind::Or(_) => TermKind::Or(list()),
            TermKind::Distinct(_) => TermKind::Distinct(list()),
            TermKind::Add(_) => TermKind::Add(list()),
            TermKind::Mul(_) => TermKind::Mul(list()),
            TermKind::App { func, .. } => TermKind::App {
                func: *func,
                args: list(),
            },
            TermKind::Quantifier { kind, sorts, .. } => TermKind::Quantifier {
                kind: *kind,
                sorts: sorts.clone(),
                body: children[0],
            },
        }
    }
}

struct TermEntry {
    kind: Arc<TermKind>,
    sort: Sort,
}

#[derive(Default)]
struct TermStore {
    entries: Vec<TermEntry>,
    lookup: HashMap<Arc<TermKind>, Term>,
}

impl TermStore {
    fn push(&mut self, kind: TermKind, sort: Sort) -> Term {
        assert!(
            self.entries.len() < u32::MAX as usize,
            "Term arena exhausted"
        );
        let term = Term(self.entries.len() as u32);
        let kind = Arc::new(kind);
        self.entries.push(TermEntry {
            kind: kind.clone(),
            sort,
        });
        self.lookup.insert(kind, term);
        term
    }
}

#[derive(Default)]
struct FuncStore {
    decls: Vec<Arc<FuncDecl>>,
    lookup: HashMap<Arc<FuncDecl>, FuncId>,
}

/// Arena of interned terms and function declarations.
///
/// Every constructor checks the sorts of its operands; handing a constructor an
/// ill-sorted operand is a defect of the caller and panics.
///
/// Example:
///
/// ```rust
/// # use hypredabst::term::{Sort, TermManager};
/// let tm = TermManager::new();
/// let x = tm.constant("x", Sort::Int);
/// let one = tm.int(1);
/// let a = tm.lt(x, one);
/// assert_eq!(a, tm.lt(x, tm.int(1)));
/// assert_eq!(format!("{}", tm.fmt(a)), "(< x 1)");
/// ```
///
/// # A note on concurrency
/// Lookups take a read lock, insertions take an upgradable read lock that is only
/// upgraded when the node is new. Guards are never handed out; [`TermManager::node`]
/// returns a shared pointer to the node instead.
#[derive(Default)]
pub struct TermManager {
    terms: RwLock<TermStore>,
    funcs: RwLock<FuncStore>,
    fresh_counter: AtomicU32,
}

impl TermManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct nodes interned so far.
    pub fn len(&self) -> usize {
        self.terms.read_recursive().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve the node for `term`.
    pub fn node(&self, term: Term) -> Arc<TermKind> {
        self.terms.read_recursive().entries[term.0 as usize]
            .kind
            .clone()
    }

    pub fn sort_of(&self, term: Term) -> Sort {
        self.terms.read_recursive().entries[term.0 as usize].sort
    }

    /// Register a function declaration, returning the existing id if an identical
    /// declaration is already known.
    pub fn declare_func(&self, name: impl Into<String>, domain: &[Sort], range: Sort) -> FuncId {
        let decl = FuncDecl {
            name: name.into(),
            domain: domain.to_vec(),
            range,
        };

        let store = self.funcs.upgradable_read();
        if let Some(id) = store.lookup.get(&decl) {
            return *id;
        }

        let mut store = RwLockUpgradableReadGuard::upgrade(store);
        assert!(
            store.decls.len() < u32::MAX as usize,
            "Function declaration table exhausted"
        );
        let id = FuncId(store.decls.len() as u32);
        debug!("New function declaration {decl} registered as {id:?}.");
        let decl = Arc::new(decl);
        store.decls.push(decl.clone());
        store.lookup.insert(decl, id);
        id
    }

    pub fn func(&self, id: FuncId) -> Arc<FuncDecl> {
        self.funcs.read_recursive().decls[id.0 as usize].clone()
    }

    /// Insert `kind` if no identical node exists and return its [`Term`].
    pub fn intern(&self, kind: TermKind) -> Term {
        let sort = self.infer_sort(&kind);

        let store = self.terms.upgradable_read();
        if let Some(term) = store.lookup.get(&kind) {
            return *term;
        }

        let mut store = RwLockUpgradableReadGuard::upgrade(store);
        store.push(kind, sort)
    }

    /// Rebuild `term` with new children, reusing `term` when nothing changed.
    pub fn rebuild(&self, term: Term, children: &[Term]) -> Term {
        let node = self.node(term);
        if node.children()[..] == *children {
            return term;
        }
        self.intern(node.with_children(children))
    }

    fn infer_sort(&self, kind: &TermKind) -> Sort {
        let expect = |terms: &[Term], sort: Sort, what: &str| {
            for t in terms {
                assert_eq!(
                    self.sort_of(*t),
                    sort,
                    "Operand {} of `{what}` must have sort {sort}",
                    self.fmt(*t)
                );
            }
        };

        match kind {
            TermKind::True | TermKind::False => Sort::Bool,
            TermKind::Numeral(_) => Sort::Int,
            TermKind::Const { sort, .. } | TermKind::Var { sort, .. } => *sort,
            TermKind::Not(inner) => {
                expect(&[*inner], Sort::Bool, "not");
                Sort::Bool
            }
            TermKind::And(args) => {
                expect(args, Sort::Bool, "and");
                Sort::Bool
            }
            TermKind::Or(args) => {
                expect(args, Sort::Bool, "or");
                Sort::Bool
            }
            TermKind::Eq(a, b) => {
                expect(&[*b], self.sort_of(*a), "=");
                Sort::Bool
            }
            TermKind::Distinct(args) => {
                if let Some(first) = args.first() {
                    expect(args, self.sort_of(*first), "distinct");
                }
                Sort::Bool
            }
            TermKind::Lt(a, b) | TermKind::Le(a, b) | TermKind::Gt(a, b) | TermKind::Ge(a, b) => {
                expect(&[*a, *b], Sort::Int, "comparison");
                Sort::Bool
            }
            TermKind::Add(args) => {
                expect(args, Sort::Int, "+");
                Sort::Int
            }
            TermKind::Mul(args) => {
                expect(args, Sort::Int, "*");
                Sort::Int
            }
            TermKind::App { func, args } => {
                let decl = self.func(*func);
                assert_eq!(
                    args.len(),
                    decl.arity(),
                    "Application of {decl} with {} arguments",
                    args.len()
                );
                for (arg, sort) in args.iter().zip(decl.domain.iter()) {
                    expect(&[*arg], *sort, &decl.name);
                }
                decl.range
            }
            TermKind::Quantifier { body, .. } => {
                expect(&[*body], Sort::Bool, "quantifier");
                Sort::Bool
            }
        }
    }

    // ======================== Constructors ========================

    pub fn mk_true(&self) -> Term {
        self.intern(TermKind::True)
    }

    pub fn mk_false(&self) -> Term {
        self.intern(TermKind::False)
    }

    pub fn bool(&self, value: bool) -> Term {
        if value { self.mk_true() } else { self.mk_false() }
    }

    pub fn int(&self, value: impl Into<BigInt>) -> Term {
        self.intern(TermKind::Numeral(value.into()))
    }

    pub fn constant(&self, name: &str, sort: Sort) -> Term {
        self.intern(TermKind::Const {
            name: Arc::from(name),
            sort,
        })
    }

    pub fn var(&self, index: u32, sort: Sort) -> Term {
        self.intern(TermKind::Var { index, sort })
    }

    /// Allocate a nullary constant distinct from every constant interned so far.
    ///
    /// Candidate names `prefix!N` already taken are skipped. The check and the
    /// insertion happen under the same lock.
    pub fn fresh_const(&self, prefix: &str, sort: Sort) -> Term {
        let store = self.terms.upgradable_read();
        let kind = loop {
            let n = self.fresh_counter.fetch_add(1, Ordering::Relaxed);
            let candidate = TermKind::Const {
                name: Arc::from(format!("{prefix}!{n}")),
                sort,
            };
            if !store.lookup.contains_key(&candidate) {
                break candidate;
            }
            debug!("Skipping fresh name {prefix}!{n}, already in use");
        };

        let mut store = RwLockUpgradableReadGuard::upgrade(store);
        store.push(kind, sort)
    }

    pub fn not(&self, inner: Term) -> Term {
        self.intern(TermKind::Not(inner))
    }

    pub fn and(&self, args: impl IntoIterator<Item = Term>) -> Term {
        self.intern(TermKind::And(args.into_iter().collect()))
    }

    pub fn or(&self, args: impl IntoIterator<Item = Term>) -> Term {
        self.intern(TermKind::Or(args.into_iter().collect()))
    }

    pub fn eq(&self, lhs: Term, rhs: Term) -> Term {
        self.intern(TermKind::Eq(lhs, rhs))
    }

    pub fn distinct(&self, args: impl IntoIterator<Item = Term>) -> Term {
        self.intern(TermKind::Distinct(args.into_iter().collect()))
    }

    pub fn lt(&self, lhs: Term, rhs: Term) -> Term {
        self.intern(TermKind::Lt(lhs, rhs))
    }

    pub fn le(&self, lhs: Term, rhs: Term) -> Term {
        self.intern(TermKind::Le(lhs, rhs))
    }

    pub fn gt(&self, lhs: Term, rhs: Term) -> Term {
        self.intern(TermKind::Gt(lhs, rhs))
    }

    pub fn ge(&self, lhs: Term, rhs: Term) -> Term {
        self.intern(TermKind::Ge(lhs, rhs))
    }

    pub fn add(&self, args: impl IntoIterator<Item = Term>) -> Term {
        self.intern(TermKind::Add(args.into_iter().collect()))
    }

    pub fn mul(&self, args: impl IntoIterator<Item = Term>) -> Term {
        self.intern(TermKind::Mul(args.into_iter().collect()))
    }

    pub fn app(&self, func: FuncId, args: impl IntoIterator<Item = Term>) -> Term {
        self.intern(TermKind::App {
            func,
            args: args.into_iter().collect(),
        })
    }

    pub fn quantifier(&self, kind: QuantifierKind, sorts: &[Sort], body: Term) -> Term {
        self.intern(TermKind::Quantifier {
            kind,
            sorts: sorts.iter().copied().collect(),
            body,
        })
    }

    pub fn exists(&self, sorts: &[Sort], body: Term) -> Term {
        self.quantifier(QuantifierKind::Exists, sorts, body)
    }

    pub fn forall(&self, sorts: &[Sort], body: Term) -> Term {
        self.quantifier(QuantifierKind::Forall, sorts, body)
    }

    /// One bound variable per argument position of `func`, indexed by position.
    pub fn arg_vars(&self, func: FuncId) -> Vec<Term> {
        self.func(func)
            .domain
            .iter()
            .enumerate()
            .map(|(i, sort)| self.var(i as u32, *sort))
            .collect()
    }

    /// One fresh constant per argument position of `func`, with the position's sort.
    pub fn fresh_args(&self, func: FuncId, prefix: &str) -> Vec<Term> {
        self.func(func)
            .domain
            .iter()
            .map(|sort| self.fresh_const(prefix, *sort))
            .collect()
    }

    // ======================== Literal tests ========================

    pub fn is_true(&self, term: Term) -> bool {
        self.node(term).is_true()
    }

    pub fn is_false(&self, term: Term) -> bool {
        self.node(term).is_false()
    }

    pub fn is_zero(&self, term: Term) -> bool {
        matches!(&*self.node(term), TermKind::Numeral(n) if *n == BigInt::from(0))
    }

    pub fn is_one(&self, term: Term) -> bool {
        matches!(&*self.node(term), TermKind::Numeral(n) if *n == BigInt::from(1))
    }

    pub fn is_var(&self, term: Term) -> bool {
        self.node(term).is_var()
    }

    /// Index of a bound variable, `None` for any other node.
    pub fn var_index(&self, term: Term) -> Option<u32> {
        match &*self.node(term) {
            TermKind::Var { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Function and arguments of an application, `None` for any other node.
    pub fn as_app(&self, term: Term) -> Option<(FuncId, Terms)> {
        match &*self.node(term) {
            TermKind::App { func, args } => Some((*func, args.clone())),
            _ => None,
        }
    }

    /// Build a formatting helper rendering `term` as an s-expression.
    pub fn fmt(&self, term: Term) -> impl fmt::Display + '_ {
        struct Fmt<'a> {
            tm: &'a TermManager,
            term: Term,
        }

        impl fmt::Display for Fmt<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.tm.write_term(f, self.term)
            }
        }

        Fmt { tm: self, term }
    }

    /// Render a list of terms separated by `", "`.
    pub fn fmt_list<'a>(&'a self, terms: &'a [Term]) -> impl fmt::Display + 'a {
        struct FmtList<'a> {
            tm: &'a TermManager,
            terms: &'a [Term],
        }

        impl fmt::Display for FmtList<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for (i, t) in self.terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    self.tm.write_term(f, *t)?;
                }
                Ok(())
            }
        }

        FmtList { tm: self, terms }
    }

    fn write_term(&self, f: &mut fmt::Formatter<'_>, term: Term) -> fmt::Result {
        let node = self.node(term);
        let (op, args): (&str, Terms) = match &*node {
            TermKind::True => return write!(f, "true"),
            TermKind::False => return write!(f, "false"),
            TermKind::Numeral(n) if n.sign() == num_bigint::Sign::Minus => {
                return write!(f, "(- {})", -n);
            }
            TermKind::Numeral(n) => return write!(f, "{n}"),
            TermKind::Const { name, .. } => return write!(f, "{name}"),
            TermKind::Var { index, .. } => return write!(f, "#{index}"),
            TermKind::Quantifier { kind, sorts, body } => {
                let kw = if kind.is_forall() { "forall" } else { "exists" };
                write!(f, "({kw} (")?;
                for (i, sort) in sorts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "({sort})")?;
                }
                write!(f, ") ")?;
                self.write_term(f, *body)?;
                return write!(f, ")");
            }
            TermKind::App { func, args } if args.is_empty() => {
                return write!(f, "{}", self.func(*func).name);
            }
            TermKind::App { func, args } => {
                let name = self.func(*func).name.clone();
                write!(f, "({name}")?;
                for a in args {
                    write!(f, " ")?;
                    self.write_term(f, *a)?;
                }
                return write!(f, ")");
            }
            TermKind::Not(_) => ("not", node.children()),
            TermKind::And(_) => ("and", node.children()),
            TermKind::Or(_) => ("or", node.children()),
            TermKind::Eq(..) => ("=", node.children()),
            TermKind::Distinct(_) => ("distinct", node.children()),
            TermKind::Lt(..) => ("<", node.children()),
            TermKind::Le(..) => ("<=", node.children()),
            TermKind::Gt(..) => (">", node.children()),
            TermKind::Ge(..) => (">=", node.children()),
            TermKind::Add(_) => ("+", node.children()),
            TermKind::Mul(_) => ("*", node.children()),
        };

        write!(f, "({op}")?;
        for a in args {
            write!(f, " ")?;
            self.write_term(f, a)?;
        }
        write!(f, ")")
    }
}
