use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use fourmi_core::{Catalog, ClassifiedTransaction, MonthWindow, Money, Transaction, Verdict};
use fourmi_import::ExportPartition;

use crate::bayes::CategoryModel;
use crate::budget::{
    aggregate_families, variable_budget_status, BudgetStatus, FamilyTotal, MissingMember,
};
use crate::classify::Classifier;

/// Everything downstream needs: the partition, the totals, the budget
/// position, the family view. Built once per run by `analyze` and read-only
/// after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Debit rows considered (credits never count).
    pub transactions_total: usize,
    pub excluded: Vec<ClassifiedTransaction>,
    pub fixed: Vec<ClassifiedTransaction>,
    pub variable: Vec<ClassifiedTransaction>,
    pub total_fixed: Money,
    pub total_variable: Money,
    pub total: Money,
    pub budget: BudgetStatus,
    pub families: Vec<FamilyTotal>,
    pub missing_members: Vec<MissingMember>,
    pub family_alerts: Vec<String>,
    pub csv_path: PathBuf,
    pub window: MonthWindow,
}

/// Run classification and aggregation over the reader's partition.
pub fn analyze(
    catalog: &Catalog,
    partition: ExportPartition,
    window: MonthWindow,
    csv_path: PathBuf,
    model: Option<CategoryModel>,
) -> AnalysisResult {
    let classifier = Classifier::new(catalog, model);
    let classified = classifier.classify(partition.valid, window.month());

    // Excluded rows from the reader, restricted to debits so the partition
    // invariant holds over debit rows only.
    let excluded: Vec<ClassifiedTransaction> = partition
        .excluded
        .into_iter()
        .filter(|(tx, _): &(Transaction, String)| !tx.is_credit())
        .map(|(tx, reason)| ClassifiedTransaction {
            transaction: tx,
            verdict: Verdict::Excluded { reason },
        })
        .collect();

    let (fixed, variable): (Vec<_>, Vec<_>) =
        classified.into_iter().partition(ClassifiedTransaction::is_fixed);

    let total_fixed: Money = fixed.iter().map(|c| c.transaction.amount.abs()).sum();
    let total_variable: Money = variable.iter().map(|c| c.transaction.amount.abs()).sum();

    let (families, missing_members) = aggregate_families(&catalog.families, &fixed, window);
    let family_alerts = families
        .iter()
        .filter(|f| f.alert)
        .map(|f| {
            format!(
                "Budget famille « {} » dépassé : {} / {} ({:.0} %)",
                f.name, f.total, f.monthly_budget, f.percentage
            )
        })
        .collect();

    let budget = variable_budget_status(total_variable, catalog.budget_max(), window);

    tracing::info!(
        excluded = excluded.len(),
        fixed = fixed.len(),
        variable = variable.len(),
        "analysis complete: {total_fixed} fixed, {total_variable} variable"
    );

    AnalysisResult {
        transactions_total: excluded.len() + fixed.len() + variable.len(),
        excluded,
        total_fixed,
        total_variable,
        total: total_fixed + total_variable,
        fixed,
        variable,
        budget,
        families,
        missing_members,
        family_alerts,
        csv_path,
        window,
    }
}
