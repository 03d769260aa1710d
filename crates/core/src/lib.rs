pub mod catalog;
pub mod money;
pub mod period;
pub mod transaction;

pub use catalog::{Catalog, ExclusionRules, Family, PresentationRule, RecurringExpense};
pub use money::Money;
pub use period::MonthWindow;
pub use transaction::{ClassifiedTransaction, Transaction, Verdict};
