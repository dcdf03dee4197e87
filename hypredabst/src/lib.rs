//! Core of a predicate-abstraction engine for Horn-clause rule systems.
//!
//! The crate prepares rule bodies for abstraction queries and drives a decision
//! procedure inside a refinement loop that lives outside of it. Everything is
//! built on the hash-consed formula arena of [`term::TermManager`]; most entry
//! points take a `&TermManager` and plain [`term::Term`] ids.
//!
//! - [`normal_form`]: connective builders, NNF and DNF.
//! - [`subst`]: substitution and de-Bruijn index shifting.
//! - [`qe`]: quantifier elimination contract.
//! - [`rule`] and [`model`]: symbols, rules and rule splitting.
//! - [`cancel`]: the only sanctioned path to the decision procedure.

pub mod cancel;
pub mod model;
pub mod normal_form;
pub mod qe;
pub mod rule;
pub mod subst;
pub mod term;
pub mod utils;

pub use utils::conf::Config;
pub use utils::error::{PredAbsError, PredAbsResult};
