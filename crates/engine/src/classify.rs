use fourmi_core::{Catalog, ClassifiedTransaction, RecurringExpense, Transaction, Verdict};

use crate::bayes::{is_generic_category, CategoryModel};

/// Combined-label tokens that turn a virement into a refund/advance, which
/// is discretionary money movement rather than a recurring expense.
const REFUND_TOKENS: [&str; 4] = ["REMBOURSEMENT", "REMBOURSE", "AVANCE", "PRET"];

/// The aggregator's own recurring tag, used as a last-resort fixed signal.
const RECURRING_TAG: &str = "Récurrent";

/// Fixed-vs-variable reconciliation against the recurring-expense catalog.
///
/// The catalog snapshot is read-only and shared with the aggregation stage;
/// this type never mutates it.
pub struct Classifier<'a> {
    catalog: &'a Catalog,
    forced_variable: Vec<String>,
    model: Option<CategoryModel>,
}

impl<'a> Classifier<'a> {
    pub fn new(catalog: &'a Catalog, model: Option<CategoryModel>) -> Self {
        Classifier {
            catalog,
            forced_variable: catalog
                .exclusion
                .forced_variable_tokens
                .iter()
                .map(|t| t.to_uppercase())
                .collect(),
            model,
        }
    }

    /// Classify the reader's valid rows for the given month. Credits are
    /// silently dropped; they never appear in any bucket.
    pub fn classify(&self, transactions: Vec<Transaction>, month: u32) -> Vec<ClassifiedTransaction> {
        transactions
            .into_iter()
            .filter(|tx| !tx.is_credit())
            .map(|tx| self.classify_debit(tx, month))
            .collect()
    }

    fn classify_debit(&self, mut tx: Transaction, month: u32) -> ClassifiedTransaction {
        let verdict = self.verdict_for(&tx, month);

        // Category enrichment only; the verdict is already settled.
        if is_generic_category(&tx.category) {
            if let Some(model) = &self.model {
                if let Some(category) = model.confident_prediction(&tx.combined_label()) {
                    tracing::debug!("category fallback: {:?} -> {category}", tx.label);
                    tx.category = category;
                }
            }
        }

        ClassifiedTransaction { transaction: tx, verdict }
    }

    fn verdict_for(&self, tx: &Transaction, month: u32) -> Verdict {
        let label = tx.combined_label().to_uppercase();

        // Rationale-first: some merchants are discretionary even when a
        // catalog entry would take them.
        if let Some(token) = self.forced_variable.iter().find(|t| label.contains(t.as_str())) {
            tracing::debug!("forced variable ({token}): {:?}", tx.label);
            return Verdict::Variable;
        }

        // Virements labelled as refunds or advances are one-off movements.
        if label.contains("VIR") && REFUND_TOKENS.iter().any(|t| label.contains(t)) {
            return Verdict::Variable;
        }

        // Catalog order defines priority: the first entry whose pattern
        // matches and whose amount is accepted wins. A pattern match with a
        // rejected amount keeps iterating.
        for entry in &self.catalog.recurring {
            if !entry.active_in_month(month) {
                continue;
            }
            if entry.matches_label(&label) && entry.amount_accepts(tx.amount) {
                return Verdict::Fixed { entry: entry.clone() };
            }
        }

        // The aggregator's own recurring tag: trust it, synthesising an
        // entry from the transaction's category.
        if tx.has_tag(RECURRING_TAG) {
            let mut entry = RecurringExpense::with_pattern(&tx.label);
            entry.category = tx.category.clone();
            entry.identifier = format!("{} (tag Récurrent)", tx.label);
            return Verdict::Fixed { entry };
        }

        Verdict::Variable
    }
}
