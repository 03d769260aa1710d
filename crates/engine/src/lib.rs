pub mod analysis;
pub mod bayes;
pub mod budget;
pub mod classify;
pub mod exclusion;

pub use analysis::{analyze, AnalysisResult};
pub use bayes::{CategoryModel, TrainingExample};
pub use budget::{
    aggregate_families, forecast, variable_budget_status, BudgetStatus, FamilyStatus, FamilyTotal,
    Forecast, MissingMember, StatusColor,
};
pub use classify::Classifier;
pub use exclusion::ExclusionEngine;
