//! Predicate symbols, templates and rules.
//!
//! A [`HornRule`] is the rule as supplied by the caller: a head literal (an
//! application of a predicate symbol, or `false`) and a list of tail literals.
//! The abstraction works on [`RuleInfo`] instead, which separates the tail into
//! uninterpreted predicate applications and an interpreted body. Template
//! applications never survive into a [`RuleInfo`]: their bodies are inlined into
//! the interpreted body when the model is built (see [`crate::model`]).
//!
//! Per-position [`ArgKind`]s are stored once, on the [`PredicateSymbol`]. Abstracted
//! and explicit argument lists are always obtained by filtering an argument list
//! through that vector.
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    ops::{Index, IndexMut},
    sync::Arc,
};

use strum::EnumIs;

use crate::{
    subst::{SubstitutionTable, free_vars, inv_shift, shift_all},
    term::{FuncDecl, FuncId, Sort, Term, TermKind, TermManager},
};

/// How the refinement loop treats one argument position of a predicate symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIs)]
pub enum ArgKind {
    /// Known only through the learned predicates over it.
    Abstracted,
    /// Carried and reasoned about verbatim.
    Explicit,
}

/// Index of a [`PredicateSymbol`] inside a [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(pub u32);

/// Index of a [`RuleInfo`] inside a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId(pub u32);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Keep the elements of `items` whose position is tagged `kind`.
fn project_kind<T: Copy>(kinds: &[ArgKind], items: &[T], kind: ArgKind) -> Vec<T> {
    assert_eq!(
        kinds.len(),
        items.len(),
        "Projecting {} arguments through {} argument kinds",
        items.len(),
        kinds.len()
    );
    kinds
        .iter()
        .zip(items)
        .filter(|(k, _)| **k == kind)
        .map(|(_, item)| *item)
        .collect()
}

/// A predicate symbol whose interpretation is learned by abstraction.
#[derive(Debug, Clone)]
pub struct PredicateSymbol {
    func: FuncId,
    decl: Arc<FuncDecl>,
    arg_kinds: Vec<ArgKind>,
    least_fixpoint: bool,
    initial_preds: Vec<Term>,
    preds: Vec<Term>,
    var_names: Vec<Option<String>>,
    users: Vec<RuleId>,
}

impl PredicateSymbol {
    /// Create the symbol for `func`; `arg_kinds` must have one entry per argument.
    pub fn new(tm: &TermManager, func: FuncId, arg_kinds: Vec<ArgKind>, least_fixpoint: bool) -> Self {
        let decl = tm.func(func);
        assert_eq!(
            arg_kinds.len(),
            decl.arity(),
            "Symbol {decl} declared with {} argument kinds",
            arg_kinds.len()
        );
        let var_names = vec![None; decl.arity()];
        Self {
            func,
            decl,
            arg_kinds,
            least_fixpoint,
            initial_preds: Vec::new(),
            preds: Vec::new(),
            var_names,
            users: Vec::new(),
        }
    }

    pub fn func(&self) -> FuncId {
        self.func
    }

    pub fn decl(&self) -> &FuncDecl {
        &self.decl
    }

    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn arity(&self) -> usize {
        self.decl.arity()
    }

    pub fn arg_kinds(&self) -> &[ArgKind] {
        &self.arg_kinds
    }

    pub fn is_least_fixpoint(&self) -> bool {
        self.least_fixpoint
    }

    /// Keep the entries of `args` at positions of the given kind.
    pub fn project(&self, args: &[Term], kind: ArgKind) -> Vec<Term> {
        project_kind(&self.arg_kinds, args, kind)
    }

    /// The argument variables (see [`TermManager::arg_vars`]) at abstracted positions.
    pub fn abstracted_vars(&self, tm: &TermManager) -> Vec<Term> {
        self.project(&tm.arg_vars(self.func), ArgKind::Abstracted)
    }

    pub fn explicit_vars(&self, tm: &TermManager) -> Vec<Term> {
        self.project(&tm.arg_vars(self.func), ArgKind::Explicit)
    }

    /// Fresh constants for the abstracted positions of this symbol, used as the
    /// arguments of a skeleton call in verification queries.
    pub fn fresh_abstracted_args(&self, tm: &TermManager, prefix: &str) -> Vec<Term> {
        self.project(&tm.fresh_args(self.func, prefix), ArgKind::Abstracted)
    }

    pub fn initial_preds(&self) -> &[Term] {
        &self.initial_preds
    }

    /// Predicates learned so far.
    pub fn preds(&self) -> &[Term] {
        &self.preds
    }

    /// Register a predicate supplied before the refinement starts; it is also
    /// added to the current predicate list.
    pub fn add_initial_pred(&mut self, pred: Term) {
        self.initial_preds.push(pred);
        self.preds.push(pred);
    }

    /// Add a learned predicate unless it is already known.
    ///
    /// Returns `true` if the predicate is new.
    pub fn add_pred(&mut self, pred: Term) -> bool {
        if self.preds.contains(&pred) {
            return false;
        }
        self.preds.push(pred);
        true
    }

    /// Forget learned predicates, keeping the initial ones.
    pub fn reset_preds(&mut self) {
        self.preds.clone_from(&self.initial_preds);
    }

    pub fn set_var_name(&mut self, position: usize, name: impl Into<String>) {
        assert!(
            position < self.arity(),
            "Position {position} is out of range for {}",
            self.decl
        );
        self.var_names[position] = Some(name.into());
    }

    pub fn var_name(&self, position: usize) -> Option<&str> {
        self.var_names.get(position).and_then(|n| n.as_deref())
    }

    /// Rules whose head or tail mention this symbol.
    pub fn users(&self) -> &[RuleId] {
        &self.users
    }

    pub(crate) fn add_user(&mut self, rule: RuleId) {
        if !self.users.contains(&rule) {
            self.users.push(rule);
        }
    }
}

impl fmt::Display for PredicateSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.decl)
    }
}

/// Owning storage of the predicate symbols of a model, indexed by [`SymbolId`].
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    symbols: Vec<PredicateSymbol>,
    by_func: HashMap<FuncId, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a symbol. Each function may be registered only once.
    pub fn insert(&mut self, symbol: PredicateSymbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        let previous = self.by_func.insert(symbol.func(), id);
        assert!(previous.is_none(), "Symbol {symbol} registered twice");
        self.symbols.push(symbol);
        id
    }

    pub fn lookup(&self, func: FuncId) -> Option<SymbolId> {
        self.by_func.get(&func).copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &PredicateSymbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }
}

impl Index<SymbolId> for SymbolTable {
    type Output = PredicateSymbol;

    fn index(&self, id: SymbolId) -> &PredicateSymbol {
        &self.symbols[id.0 as usize]
    }
}

impl IndexMut<SymbolId> for SymbolTable {
    fn index_mut(&mut self, id: SymbolId) -> &mut PredicateSymbol {
        &mut self.symbols[id.0 as usize]
    }
}

/// A predicate symbol with a fixed defining formula.
///
/// The body refers to the template parameters through bound variables. Extra
/// parameters, if any, are numbered below the regular ones: `#0..#k` are the `k`
/// extras and the regular parameters follow.
#[derive(Debug, Clone)]
pub struct TemplateSymbol {
    func: FuncId,
    params: Vec<Term>,
    body: Term,
}

impl TemplateSymbol {
    pub fn new(tm: &TermManager, func: FuncId, params: Vec<Term>, body: Term) -> Self {
        let decl = tm.func(func);
        assert_eq!(
            params.len(),
            decl.arity(),
            "Template {decl} declared with {} parameters",
            params.len()
        );
        assert!(
            params.iter().all(|p| tm.is_var(*p)),
            "Template {decl} parameters must be bound variables"
        );
        assert!(tm.sort_of(body).is_bool(), "Template {decl} body is not a formula");
        Self { func, params, body }
    }

    pub fn func(&self) -> FuncId {
        self.func
    }

    pub fn params(&self) -> &[Term] {
        &self.params
    }

    pub fn body(&self) -> Term {
        self.body
    }

    /// Body with `args` substituted for the parameters.
    pub fn body_from_args(&self, tm: &TermManager, args: &[Term]) -> Term {
        SubstitutionTable::build(tm, &self.params, args).apply(tm, self.body)
    }

    /// Body with `extras` substituted for the extra parameters, the remaining
    /// variables renumbered from `#0`.
    pub fn body_from_extras(&self, tm: &TermManager, extras: &[Term]) -> Term {
        let n = extras.len() as u32;
        let table = SubstitutionTable::from_dense(&shift_all(tm, extras, n));
        inv_shift(tm, table.apply(tm, self.body), n)
    }
}

/// A rule as supplied by the caller.
#[derive(Debug, Clone)]
pub struct HornRule {
    pub name: Option<String>,
    /// A predicate application, or `false`.
    pub head: Term,
    pub tail: Vec<Term>,
}

impl HornRule {
    pub fn new(tm: &TermManager, head: Term, tail: Vec<Term>) -> Self {
        assert!(
            tm.is_false(head) || tm.as_app(head).is_some(),
            "Rule head {} is neither a predicate application nor false",
            tm.fmt(head)
        );
        Self {
            name: None,
            head,
            tail,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Free variables occurring in the head and tail literals.
    pub fn used_vars(&self, tm: &TermManager) -> UsedVars {
        let mut vars = BTreeMap::new();
        for literal in std::iter::once(&self.head).chain(&self.tail) {
            vars.extend(free_vars(tm, *literal));
        }
        UsedVars(vars)
    }
}

/// Variable indices of a rule with their sorts, in increasing index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedVars(BTreeMap<u32, Sort>);

impl UsedVars {
    pub fn contains(&self, index: u32) -> bool {
        self.0.contains_key(&index)
    }

    pub fn sort(&self, index: u32) -> Option<Sort> {
        self.0.get(&index).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, Sort)> + '_ {
        self.0.iter().map(|(i, s)| (*i, *s))
    }

    /// The used variables as terms.
    pub fn vars(&self, tm: &TermManager) -> Vec<Term> {
        self.iter().map(|(i, s)| tm.var(i, s)).collect()
    }
}

/// One disjunction-free view of a [`HornRule`].
#[derive(Debug, Clone)]
pub struct RuleInfo {
    id: RuleId,
    rule: Arc<HornRule>,
    body: Vec<Term>,
    head: Option<SymbolId>,
    tail: Vec<SymbolId>,
    positions: Vec<usize>,
}

impl RuleInfo {
    /// `tail[i]` is the symbol applied by `rule.tail[positions[i]]`.
    pub fn new(
        id: RuleId,
        rule: Arc<HornRule>,
        body: Vec<Term>,
        head: Option<SymbolId>,
        tail: Vec<SymbolId>,
        positions: Vec<usize>,
    ) -> Self {
        assert_eq!(
            tail.len(),
            positions.len(),
            "Rule {id} has {} tail symbols but {} positions",
            tail.len(),
            positions.len()
        );
        assert!(
            positions.iter().all(|p| *p < rule.tail.len()),
            "Rule {id} maps a tail symbol outside its {} tail literals",
            rule.tail.len()
        );
        Self {
            id,
            rule,
            body,
            head,
            tail,
            positions,
        }
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn rule(&self) -> &HornRule {
        &self.rule
    }

    /// The symbol at the head, `None` when the head is `false`.
    pub fn head_symbol(&self) -> Option<SymbolId> {
        self.head
    }

    pub fn tail_len(&self) -> usize {
        self.tail.len()
    }

    pub fn tail_symbols(&self) -> &[SymbolId] {
        &self.tail
    }

    pub fn tail_symbol(&self, i: usize) -> SymbolId {
        self.tail[i]
    }

    /// Index in the underlying rule's tail of the `i`-th tail symbol.
    pub fn tail_position(&self, i: usize) -> usize {
        self.positions[i]
    }

    /// Interpreted body as a list of NNF conjuncts, free of disjunctions.
    pub fn body(&self) -> &[Term] {
        &self.body
    }

    /// Interpreted body with template parameters substituted.
    pub fn instantiated_body(&self, tm: &TermManager, params: &SubstitutionTable) -> Vec<Term> {
        params.apply_all(tm, &self.body)
    }

    pub fn used_vars(&self, tm: &TermManager) -> UsedVars {
        self.rule.used_vars(tm)
    }

    fn literal_args(tm: &TermManager, literal: Term) -> Vec<Term> {
        match &*tm.node(literal) {
            TermKind::App { args, .. } => args.to_vec(),
            _ => panic!("Literal {} is not a predicate application", tm.fmt(literal)),
        }
    }

    fn head_args(&self, tm: &TermManager, symbols: &SymbolTable, kind: ArgKind) -> Vec<Term> {
        match self.head {
            Some(symbol) => symbols[symbol].project(&Self::literal_args(tm, self.rule.head), kind),
            None => Vec::new(),
        }
    }

    fn tail_args(&self, tm: &TermManager, symbols: &SymbolTable, i: usize, kind: ArgKind) -> Vec<Term> {
        let literal = self.rule.tail[self.positions[i]];
        symbols[self.tail[i]].project(&Self::literal_args(tm, literal), kind)
    }

    /// Head arguments at abstracted positions; empty when the head is `false`.
    pub fn abstracted_args(&self, tm: &TermManager, symbols: &SymbolTable) -> Vec<Term> {
        self.head_args(tm, symbols, ArgKind::Abstracted)
    }

    /// Head arguments at explicit positions; empty when the head is `false`.
    pub fn explicit_args(&self, tm: &TermManager, symbols: &SymbolTable) -> Vec<Term> {
        self.head_args(tm, symbols, ArgKind::Explicit)
    }

    pub fn tail_abstracted_args(&self, tm: &TermManager, symbols: &SymbolTable, i: usize) -> Vec<Term> {
        self.tail_args(tm, symbols, i, ArgKind::Abstracted)
    }

    pub fn tail_explicit_args(&self, tm: &TermManager, symbols: &SymbolTable, i: usize) -> Vec<Term> {
        self.tail_args(tm, symbols, i, ArgKind::Explicit)
    }
}

impl fmt::Display for RuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rule.name {
            Some(name) => write!(f, "{} ({name})", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}
