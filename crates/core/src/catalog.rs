use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use super::money::Money;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("cannot read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One user-maintained catalog entry describing a non-discretionary expense.
///
/// A transaction reconciles against the entry when any of `patterns` is a
/// case-insensitive substring of its combined label and the amount falls
/// within the relative tolerance (a zero `expected_amount` disables the
/// amount check).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringExpense {
    pub patterns: Vec<String>,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub family_hint: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub expected_amount: Decimal,
    #[serde(default = "default_tolerance")]
    pub amount_tolerance: Decimal,
    #[serde(default = "all_months")]
    pub occurrence_months: Vec<u32>,
}

fn default_tolerance() -> Decimal {
    Decimal::new(5, 2)
}

fn all_months() -> Vec<u32> {
    (1..=12).collect()
}

impl RecurringExpense {
    /// Minimal entry with a single pattern; used by tests and by the
    /// recurring-tag fallback which synthesises an entry on the fly.
    pub fn with_pattern(pattern: &str) -> Self {
        RecurringExpense {
            patterns: vec![pattern.to_string()],
            identifier: pattern.to_string(),
            family_hint: None,
            category: String::new(),
            expected_amount: Decimal::ZERO,
            amount_tolerance: default_tolerance(),
            occurrence_months: all_months(),
        }
    }

    /// `label_upper` must already be uppercased by the caller.
    pub fn matches_label(&self, label_upper: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| !p.is_empty() && label_upper.contains(&p.to_uppercase()))
    }

    /// Relative tolerance check over the absolute amount. The boundary is
    /// inclusive: exactly `expected × (1 + tolerance)` is accepted.
    pub fn amount_accepts(&self, amount: Money) -> bool {
        if self.expected_amount.is_zero() {
            return true;
        }
        let diff = (amount.abs().as_decimal() - self.expected_amount).abs();
        diff <= self.expected_amount * self.amount_tolerance
    }

    pub fn active_in_month(&self, month: u32) -> bool {
        self.occurrence_months.contains(&month)
    }
}

/// Which level of detail a family gets in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Detail,
    Summary,
}

/// User-defined grouping of fixed expenses with its own monthly budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Family {
    pub name: String,
    /// Reference substrings; a transaction belongs to the family when its
    /// combined label contains any of them (first match wins).
    pub members: Vec<String>,
    #[serde(default)]
    pub monthly_budget: Decimal,
    #[serde(default)]
    pub alert_on_overrun: bool,
    #[serde(default)]
    pub display_mode: DisplayMode,
}

impl Family {
    /// First member substring contained in `label_upper`, if any.
    pub fn matching_member(&self, label_upper: &str) -> Option<&str> {
        self.members
            .iter()
            .find(|m| !m.is_empty() && label_upper.contains(&m.to_uppercase()))
            .map(String::as_str)
    }

    pub fn has_budget(&self) -> bool {
        self.monthly_budget > Decimal::ZERO
    }
}

/// One row of the ordered presentation-family table driving the report
/// drill-down pages (distinct from the budgeted `Family` groups).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentationRule {
    pub name: String,
    #[serde(default)]
    pub category_patterns: Vec<String>,
    #[serde(default)]
    pub label_patterns: Vec<String>,
}

impl PresentationRule {
    pub fn matches(&self, category_upper: &str, label_upper: &str) -> bool {
        self.category_patterns
            .iter()
            .any(|p| !p.is_empty() && category_upper.contains(&p.to_uppercase()))
            || self
                .label_patterns
                .iter()
                .any(|p| !p.is_empty() && label_upper.contains(&p.to_uppercase()))
    }
}

/// Supermarket / gas-station pre-authorisation row: label patterns plus the
/// station's known pre-authorisation amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuelPreauth {
    pub patterns: Vec<String>,
    pub amounts: Vec<Decimal>,
}

/// Exclusion-rule data. Pure data by design: the historical hard-coded
/// regexes are the compiled defaults, and every table can be overridden from
/// the catalog under `regles_exclusion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionRules {
    pub excluded_categories: Vec<String>,
    pub deferred_card_patterns: Vec<String>,
    pub internal_transfer_patterns: Vec<String>,
    pub internal_merchant_patterns: Vec<String>,
    pub fuel_preauth: Vec<FuelPreauth>,
    pub forced_variable_tokens: Vec<String>,
}

impl Default for ExclusionRules {
    fn default() -> Self {
        ExclusionRules {
            excluded_categories: vec![
                "Relevé différé Carte".to_string(),
                "Virements internes".to_string(),
            ],
            deferred_card_patterns: vec![
                r"RELEVE\s+DIFFERE\s+CARTE\s+\d{4}\*+\d{4}".to_string(),
                r"RELEVE\s+CARTE\s+DIFFERE".to_string(),
            ],
            internal_transfer_patterns: vec![
                r"VIREMENT\s+PERMANENT\s+INTERNE".to_string(),
                r"VIR\s+PERMANENT\s+INTERNE".to_string(),
                r"VIREMENT\s+SEPA\s+INTERNE".to_string(),
                r"VIR\s+INSTANTANE\s+INTERNE".to_string(),
            ],
            internal_merchant_patterns: vec![r"LINXO\s+CONNECT".to_string()],
            fuel_preauth: vec![
                FuelPreauth {
                    patterns: vec![
                        "INTERMARCHE".to_string(),
                        "LECLERC".to_string(),
                        "CARREFOUR STATION".to_string(),
                        "TOTALENERGIES".to_string(),
                    ],
                    amounts: vec![Decimal::new(12000, 2), Decimal::new(15000, 2)],
                },
            ],
            forced_variable_tokens: vec![
                "OPENAI".to_string(),
                "CLAUDE.AI".to_string(),
                "COINBASE".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Totals {
    #[serde(default)]
    pub budget_variable_max: Decimal,
}

/// The user-curated catalog file, loaded once per run and read-only after.
///
/// Every key is optional: a missing key degrades to an empty list or a zero
/// budget so that a freshly-initialised install still starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, rename = "depenses_fixes")]
    pub recurring: Vec<RecurringExpense>,
    #[serde(default, rename = "familles_depenses")]
    pub families: Vec<Family>,
    #[serde(default, rename = "familles_presentation")]
    pub presentation: Vec<PresentationRule>,
    #[serde(default, rename = "regles_exclusion")]
    pub exclusion: ExclusionRules,
    #[serde(default, rename = "revenus")]
    pub incomes: Vec<serde_json::Value>,
    #[serde(default, rename = "ajustements_budget")]
    pub adjustments: Vec<serde_json::Value>,
    #[serde(default, rename = "totaux")]
    pub totals: Totals,
}

impl Catalog {
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn budget_max(&self) -> Money {
        Money::from_decimal(self.totals.budget_variable_max)
    }
}
