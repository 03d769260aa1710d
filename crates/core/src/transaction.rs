use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::catalog::RecurringExpense;
use super::money::Money;

/// One normalised row of the aggregator export. Immutable once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// `None` when the export row carried an unparsable date; such rows are
    /// kept but skipped by date-driven logic.
    pub date: Option<NaiveDate>,
    pub label: String,
    pub notes: String,
    /// Signed amount; negative means debit.
    pub amount: Money,
    /// Free-text category as exported by the aggregator, possibly empty.
    pub category: String,
    pub account: String,
    pub tag_labels: Vec<String>,
}

impl Transaction {
    /// Label and notes joined with a single space; the matching key used by
    /// every rule in the system.
    pub fn combined_label(&self) -> String {
        if self.notes.is_empty() {
            self.label.clone()
        } else {
            format!("{} {}", self.label, self.notes)
        }
    }

    pub fn is_credit(&self) -> bool {
        !self.amount.is_debit()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag_labels.iter().any(|t| t == tag)
    }
}

/// Outcome of the classification pass for one debit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Verdict {
    Excluded { reason: String },
    Fixed { entry: RecurringExpense },
    Variable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedTransaction {
    pub transaction: Transaction,
    pub verdict: Verdict,
}

impl ClassifiedTransaction {
    pub fn is_fixed(&self) -> bool {
        matches!(self.verdict, Verdict::Fixed { .. })
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.verdict, Verdict::Variable)
    }

    pub fn excluded_reason(&self) -> Option<&str> {
        match &self.verdict {
            Verdict::Excluded { reason } => Some(reason),
            _ => None,
        }
    }

    /// Category for display: the catalog entry's category when the
    /// transaction was reconciled, the aggregator's otherwise.
    pub fn display_category(&self) -> &str {
        match &self.verdict {
            Verdict::Fixed { entry } if !entry.category.is_empty() => &entry.category,
            _ => &self.transaction.category,
        }
    }
}
