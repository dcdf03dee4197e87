//! Engine configuration.
use serde::Deserialize;

use crate::utils::error::PredAbsResult;

/// Tunables of the rule model and the normalizer.
///
/// Every field has a default, so an empty TOML document is a valid configuration.
///
/// ```rust
/// # use hypredabst::utils::conf::Config;
/// let config = Config::from_toml_str("max_dnf_rows = 64").unwrap();
/// assert_eq!(config.max_dnf_rows, Some(64));
/// assert!(config.split_disjunctions);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Ceiling on the number of DNF rows built while splitting a rule body.
    /// `None` disables the check.
    pub max_dnf_rows: Option<usize>,

    /// Prefix of the fresh constants allocated for skeleton calls.
    pub fresh_prefix: String,

    /// Split rules whose interpreted body still contains a disjunction after
    /// conjunct flattening.
    pub split_disjunctions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_dnf_rows: None,
            fresh_prefix: "arg".to_string(),
            split_disjunctions: true,
        }
    }
}

impl Config {
    pub fn from_toml_str(source: &str) -> PredAbsResult<Self> {
        Ok(toml::from_str(source)?)
    }
}
