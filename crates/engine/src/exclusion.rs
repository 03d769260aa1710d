use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;

use fourmi_core::{money::Money, ExclusionRules, Transaction};

/// Amount window for the fuel pre-authorisation heuristic.
const PREAUTH_EPSILON_CENTS: i64 = 1;

/// Station patterns paired with the station's pre-authorisation amounts.
struct CompiledPreauth {
    patterns: Vec<String>,
    amounts: Vec<Decimal>,
}

/// The six exclusion rules of the classification pipeline, compiled once
/// from catalog data. Evaluation order is fixed; the first hit wins.
pub struct ExclusionEngine {
    excluded_categories: Vec<String>,
    deferred_card: Vec<Regex>,
    internal_transfer: Vec<Regex>,
    internal_merchant: Vec<Regex>,
    fuel_preauth: Vec<CompiledPreauth>,
}

fn compile_all(patterns: &[String], table: &str) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| {
            match RegexBuilder::new(p).case_insensitive(true).build() {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!("skipping invalid {table} pattern {p:?}: {e}");
                    None
                }
            }
        })
        .collect()
}

impl ExclusionEngine {
    pub fn new(rules: &ExclusionRules) -> Self {
        ExclusionEngine {
            excluded_categories: rules
                .excluded_categories
                .iter()
                .map(|c| c.to_uppercase())
                .collect(),
            deferred_card: compile_all(&rules.deferred_card_patterns, "deferred-card"),
            internal_transfer: compile_all(&rules.internal_transfer_patterns, "internal-transfer"),
            internal_merchant: compile_all(&rules.internal_merchant_patterns, "internal-merchant"),
            fuel_preauth: rules
                .fuel_preauth
                .iter()
                .map(|f| CompiledPreauth {
                    patterns: f.patterns.iter().map(|p| p.to_uppercase()).collect(),
                    amounts: f.amounts.clone(),
                })
                .collect(),
        }
    }

    /// Reason the transaction is excluded from the analysis, or `None` when
    /// it goes on to the fixed-vs-variable stage.
    pub fn exclusion_reason(&self, tx: &Transaction) -> Option<String> {
        let category = tx.category.to_uppercase();
        let label = tx.combined_label().to_uppercase();
        let notes = tx.notes.to_uppercase();

        // 1. Category-level blocklist.
        if let Some(hit) = self
            .excluded_categories
            .iter()
            .find(|c| !c.is_empty() && category.contains(c.as_str()))
        {
            return Some(format!("excluded category: {hit}"));
        }

        // 2. Deferred card-statement line; the individual card lines are
        // already in the export.
        if self.deferred_card.iter().any(|re| re.is_match(&label)) {
            return Some("deferred card statement".to_string());
        }

        // 3. Internal transfer, by category or by label pattern.
        if (category.contains("VIREMENT") && category.contains("INTERNE"))
            || self.internal_transfer.iter().any(|re| re.is_match(&label))
        {
            return Some("internal transfer".to_string());
        }

        // 4. Internal transfer spelled out in the notes.
        if notes.contains("INTERNE") && notes.contains("VIR") {
            return Some("internal transfer (notes)".to_string());
        }

        // 5. Fuel pre-authorisation: known station and a known hold amount.
        if let Some(amount) = self.fuel_preauth_amount(&label, tx.amount) {
            return Some(format!("fuel pre-authorisation ({})", Money::from_decimal(amount)));
        }

        // 6. Internal merchants (the aggregator's own payment provider and
        // the like).
        if self.internal_merchant.iter().any(|re| re.is_match(&label)) {
            return Some("internal merchant".to_string());
        }

        None
    }

    fn fuel_preauth_amount(&self, label_upper: &str, amount: Money) -> Option<Decimal> {
        let cents = amount.abs().to_cents();
        for station in &self.fuel_preauth {
            if !station.patterns.iter().any(|p| label_upper.contains(p.as_str())) {
                continue;
            }
            for &hold in &station.amounts {
                let hold_cents = Money::from_decimal(hold).to_cents();
                if (cents - hold_cents).abs() <= PREAUTH_EPSILON_CENTS {
                    return Some(hold);
                }
            }
        }
        None
    }
}
