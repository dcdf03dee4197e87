//! Construction of the abstraction model from a set of rules.
//!
//! [`ModelBuilder`] collects predicate symbols, templates and rules, then
//! decomposes every rule into one or more [`RuleInfo`]s:
//!
//! 1. Tail literals applying a predicate symbol become tail symbols. Template
//!    applications are replaced by the template body. Every other literal is
//!    interpreted.
//! 2. The interpreted literals are conjoined and put in NNF.
//! 3. If a conjunct is still a disjunction, the body is expanded to DNF and one
//!    [`RuleInfo`] is produced per row, all sharing the same head and tail symbols.
use std::{collections::HashMap, sync::Arc};

use log::{debug, info};

use crate::{
    normal_form::{dnf_rows, extract_conjuncts, mk_conj, to_nnf},
    rule::{ArgKind, HornRule, PredicateSymbol, RuleId, RuleInfo, SymbolId, SymbolTable, TemplateSymbol},
    term::{FuncId, Term, TermKind, TermManager},
    utils::{conf::Config, error::PredAbsResult},
};

/// Decomposed rules together with the symbols they refer to.
#[derive(Debug)]
pub struct PredAbsModel {
    config: Config,
    symbols: SymbolTable,
    templates: HashMap<FuncId, TemplateSymbol>,
    rules: Vec<RuleInfo>,
}

impl PredAbsModel {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Mutable access to the symbols, used by the refinement loop to record
    /// learned predicates.
    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    pub fn symbol(&self, id: SymbolId) -> &PredicateSymbol {
        &self.symbols[id]
    }

    pub fn templates(&self) -> impl Iterator<Item = &TemplateSymbol> {
        self.templates.values()
    }

    pub fn template(&self, func: FuncId) -> Option<&TemplateSymbol> {
        self.templates.get(&func)
    }

    pub fn rules(&self) -> &[RuleInfo] {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> &RuleInfo {
        &self.rules[id.0 as usize]
    }

    /// Rules mentioning `symbol` in their head or tail.
    pub fn rules_using(&self, symbol: SymbolId) -> impl Iterator<Item = &RuleInfo> {
        self.symbols[symbol].users().iter().map(|id| self.rule(*id))
    }

    /// Fresh constants for the abstracted positions of `symbol`, named after the
    /// configured prefix.
    pub fn fresh_abstracted_args(&self, tm: &TermManager, symbol: SymbolId) -> Vec<Term> {
        self.symbols[symbol].fresh_abstracted_args(tm, &self.config.fresh_prefix)
    }
}

/// Incremental builder of a [`PredAbsModel`].
pub struct ModelBuilder<'tm> {
    tm: &'tm TermManager,
    config: Config,
    symbols: SymbolTable,
    templates: HashMap<FuncId, TemplateSymbol>,
    rules: Vec<HornRule>,
}

impl<'tm> ModelBuilder<'tm> {
    pub fn new(tm: &'tm TermManager, config: Config) -> Self {
        Self {
            tm,
            config,
            symbols: SymbolTable::new(),
            templates: HashMap::new(),
            rules: Vec::new(),
        }
    }

    /// Declare `func` as a predicate symbol with the given argument kinds.
    pub fn declare_symbol(&mut self, func: FuncId, arg_kinds: Vec<ArgKind>, least_fixpoint: bool) -> SymbolId {
        assert!(
            !self.templates.contains_key(&func),
            "{} is already declared as a template",
            self.tm.func(func)
        );
        self.symbols
            .insert(PredicateSymbol::new(self.tm, func, arg_kinds, least_fixpoint))
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut PredicateSymbol {
        &mut self.symbols[id]
    }

    /// Declare `func` as a template defined by `body` over `params`.
    pub fn declare_template(&mut self, func: FuncId, params: Vec<Term>, body: Term) {
        assert!(
            self.symbols.lookup(func).is_none(),
            "{} is already declared as a predicate symbol",
            self.tm.func(func)
        );
        let template = TemplateSymbol::new(self.tm, func, params, body);
        let previous = self.templates.insert(func, template);
        assert!(previous.is_none(), "Template {} declared twice", self.tm.func(func));
    }

    pub fn add_rule(&mut self, rule: HornRule) {
        self.rules.push(rule);
    }

    pub fn build(self) -> PredAbsResult<PredAbsModel> {
        let Self {
            tm,
            config,
            mut symbols,
            templates,
            rules,
        } = self;

        let mut infos: Vec<RuleInfo> = Vec::new();
        let input_rules = rules.len();
        for rule in rules {
            decompose(tm, &config, &symbols, &templates, Arc::new(rule), &mut infos)?;
        }

        for info in &infos {
            if let Some(head) = info.head_symbol() {
                symbols[head].add_user(info.id());
            }
            for symbol in info.tail_symbols() {
                symbols[*symbol].add_user(info.id());
            }
        }

        info!(
            "Model built with {} symbols, {} templates and {} rules ({} before splitting)",
            symbols.len(),
            templates.len(),
            infos.len(),
            input_rules
        );
        Ok(PredAbsModel {
            config,
            symbols,
            templates,
            rules: infos,
        })
    }
}

fn decompose(
    tm: &TermManager,
    config: &Config,
    symbols: &SymbolTable,
    templates: &HashMap<FuncId, TemplateSymbol>,
    rule: Arc<HornRule>,
    out: &mut Vec<RuleInfo>,
) -> PredAbsResult<()> {
    let head = match tm.as_app(rule.head) {
        Some((func, _)) => Some(symbols.lookup(func).unwrap_or_else(|| {
            panic!("Rule head {} does not apply a predicate symbol", tm.fmt(rule.head))
        })),
        None => None,
    };

    let mut tail = Vec::new();
    let mut positions = Vec::new();
    let mut interpreted = Vec::new();
    for (pos, literal) in rule.tail.iter().enumerate() {
        match &*tm.node(*literal) {
            TermKind::App { func, args } => {
                if let Some(symbol) = symbols.lookup(*func) {
                    tail.push(symbol);
                    positions.push(pos);
                } else if let Some(template) = templates.get(func) {
                    interpreted.push(template.body_from_args(tm, args));
                } else {
                    interpreted.push(*literal);
                }
            }
            _ => interpreted.push(*literal),
        }
    }

    let body = to_nnf(tm, mk_conj(tm, interpreted));
    let conjuncts = extract_conjuncts(tm, body);
    let disjunctive = conjuncts.iter().any(|c| tm.node(*c).is_or());

    // An unsatisfiable body expands to zero rows, and the rule is dropped.
    let bodies = if config.split_disjunctions && (disjunctive || tm.is_false(body)) {
        let rows = dnf_rows(tm, body, config.max_dnf_rows)?;
        debug!(
            "Rule {} split into {} disjunction-free rules",
            rule.name.as_deref().unwrap_or("<unnamed>"),
            rows.len()
        );
        rows
    } else {
        vec![conjuncts]
    };

    for body in bodies {
        let id = RuleId(out.len() as u32);
        out.push(RuleInfo::new(
            id,
            rule.clone(),
            body,
            head,
            tail.clone(),
            positions.clone(),
        ));
    }
    Ok(())
}
