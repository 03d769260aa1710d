use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use fourmi_core::{
    catalog::DisplayMode, money::Money, ClassifiedTransaction, Family, MonthWindow,
};

/// Traffic-light status of the variable budget and of forecasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Green,
    Orange,
    Red,
}

impl StatusColor {
    pub fn emoji(self) -> &'static str {
        match self {
            StatusColor::Green => "🟢",
            StatusColor::Orange => "🟠",
            StatusColor::Red => "🔴",
        }
    }

    pub fn css(self) -> &'static str {
        match self {
            StatusColor::Green => "#2e7d32",
            StatusColor::Orange => "#ef6c00",
            StatusColor::Red => "#c62828",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyStatus {
    Ok,
    Warning,
    Exceeded,
    NoBudget,
}

/// End-of-month projection from the current daily pace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    /// False on day zero, where the pace is undefined.
    pub defined: bool,
    pub amount: Money,
    pub overrun: Money,
    pub color: StatusColor,
    pub message: String,
}

impl Forecast {
    fn undefined() -> Self {
        Forecast {
            defined: false,
            amount: Money::zero(),
            overrun: Money::zero(),
            color: StatusColor::Green,
            message: "Prévision indisponible".to_string(),
        }
    }
}

/// `forecast = current + current/d × (D−d)` with `d` the elapsed days and
/// `D` the month length.
pub fn forecast_from_parts(current: Money, budget: Money, day: u32, last_day: u32) -> Forecast {
    if day == 0 {
        return Forecast::undefined();
    }
    let pace = current.as_decimal() / Decimal::from(day);
    let amount = Money::from_decimal(current.as_decimal() + pace * Decimal::from(last_day - day));
    let overrun = amount - budget;

    let ratio = if budget.is_zero() {
        f64::INFINITY
    } else {
        amount.to_f64() / budget.to_f64()
    };
    let (color, message) = if overrun > Money::zero() {
        (
            StatusColor::Red,
            format!("Dépassement prévu en fin de mois : {overrun}"),
        )
    } else if ratio > 0.9 {
        (
            StatusColor::Orange,
            format!("Prévision fin de mois proche du budget : {amount}"),
        )
    } else {
        (
            StatusColor::Green,
            format!("Prévision fin de mois dans le budget : {amount}"),
        )
    };

    Forecast {
        defined: true,
        amount,
        overrun,
        color,
        message,
    }
}

pub fn forecast(current: Money, budget: Money, window: MonthWindow) -> Forecast {
    forecast_from_parts(current, budget, window.day(), window.last_day())
}

/// One configured family with this month's matched spending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyTotal {
    pub name: String,
    pub total: Money,
    pub transaction_count: usize,
    pub monthly_budget: Money,
    pub percentage: f64,
    pub status: FamilyStatus,
    pub alert: bool,
    pub display_mode: DisplayMode,
    pub forecast: Forecast,
}

/// A family member substring that matched nothing this month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingMember {
    pub family: String,
    pub member: String,
}

/// Group the fixed transactions into the configured families. A transaction
/// is counted in the first family whose member substring matches, and only
/// once within that family (first member wins).
pub fn aggregate_families(
    families: &[Family],
    fixed: &[ClassifiedTransaction],
    window: MonthWindow,
) -> (Vec<FamilyTotal>, Vec<MissingMember>) {
    let mut totals: Vec<(Money, usize)> = vec![(Money::zero(), 0); families.len()];
    let mut matched_members: Vec<Vec<&str>> = vec![Vec::new(); families.len()];

    for ct in fixed {
        let label = ct.transaction.combined_label().to_uppercase();
        for (idx, family) in families.iter().enumerate() {
            if let Some(member) = family.matching_member(&label) {
                totals[idx].0 = totals[idx].0 + ct.transaction.amount.abs();
                totals[idx].1 += 1;
                if !matched_members[idx].contains(&member) {
                    matched_members[idx].push(member);
                }
                break;
            }
        }
    }

    let mut aggregated = Vec::with_capacity(families.len());
    let mut missing = Vec::new();

    for (idx, family) in families.iter().enumerate() {
        let (total, count) = totals[idx];
        let budget = Money::from_decimal(family.monthly_budget);

        let (percentage, status) = if family.has_budget() {
            let pct = total.to_f64() / budget.to_f64() * 100.0;
            let status = if pct > 100.0 {
                FamilyStatus::Exceeded
            } else if pct >= 90.0 {
                FamilyStatus::Warning
            } else {
                FamilyStatus::Ok
            };
            (pct, status)
        } else {
            (0.0, FamilyStatus::NoBudget)
        };

        for member in &family.members {
            if !matched_members[idx].iter().any(|m| m == member) {
                missing.push(MissingMember {
                    family: family.name.clone(),
                    member: member.clone(),
                });
            }
        }

        aggregated.push(FamilyTotal {
            name: family.name.clone(),
            total,
            transaction_count: count,
            monthly_budget: budget,
            percentage,
            status,
            alert: family.alert_on_overrun && status == FamilyStatus::Exceeded,
            display_mode: family.display_mode,
            forecast: forecast(total, budget, window),
        });
    }

    (aggregated, missing)
}

/// Variable-budget position for the month, with forecast and advice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub budget_max: Money,
    pub total_variable: Money,
    pub remaining: Money,
    pub percentage: f64,
    pub month_progress: f64,
    pub color: StatusColor,
    pub forecast: Forecast,
    pub advice: Vec<String>,
}

pub fn variable_budget_status(
    total_variable: Money,
    budget_max: Money,
    window: MonthWindow,
) -> BudgetStatus {
    let remaining = budget_max - total_variable;
    let percentage = if budget_max.is_zero() {
        0.0
    } else {
        total_variable.to_f64() / budget_max.to_f64() * 100.0
    };
    let month_progress = window.progress_percent();

    let color = if remaining < Money::zero() {
        StatusColor::Red
    } else if percentage >= 80.0 || percentage > month_progress + 10.0 {
        StatusColor::Orange
    } else {
        StatusColor::Green
    };

    let forecast = forecast(total_variable, budget_max, window);
    let advice = advice_lines(
        color,
        total_variable,
        budget_max,
        remaining,
        percentage,
        month_progress,
        window,
        &forecast,
    );

    BudgetStatus {
        budget_max,
        total_variable,
        remaining,
        percentage,
        month_progress,
        color,
        forecast,
        advice,
    }
}

/// Three to six short lines of French advice, branching on the status
/// colour.
#[allow(clippy::too_many_arguments)]
fn advice_lines(
    color: StatusColor,
    total_variable: Money,
    budget_max: Money,
    remaining: Money,
    percentage: f64,
    month_progress: f64,
    window: MonthWindow,
    forecast: &Forecast,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(6);
    let remaining_days = window.remaining_days();

    lines.push(format!(
        "Dépenses variables : {total_variable} sur {budget_max} ({percentage:.0} %)."
    ));

    match color {
        StatusColor::Red => {
            lines.push(format!("Budget dépassé de {}.", remaining.abs()));
            if remaining_days > 0 {
                lines.push(format!(
                    "Il reste {remaining_days} jours : limitez les dépenses au strict nécessaire."
                ));
            } else {
                lines.push("Dernier jour du mois : le dépassement est acquis.".to_string());
            }
        }
        StatusColor::Orange => {
            lines.push(format!("Il reste {remaining} pour finir le mois."));
            if remaining_days > 0 {
                let ceiling = Money::from_decimal(
                    remaining.as_decimal() / Decimal::from(remaining_days),
                );
                lines.push(format!("Plafond conseillé : {ceiling} par jour."));
            }
        }
        StatusColor::Green => {
            // Pace in euros: where the budget says you "should" be today.
            let pace_lead = Money::from_decimal(
                budget_max.as_decimal() * Decimal::try_from(month_progress / 100.0)
                    .unwrap_or(Decimal::ZERO),
            ) - total_variable;
            if pace_lead > Money::from_cents(5000) {
                lines.push(format!(
                    "Bravo : {pace_lead} d'avance sur le rythme du mois."
                ));
            } else {
                lines.push("Budget sous contrôle.".to_string());
            }
        }
    }

    if forecast.defined {
        lines.push(format!("{}.", forecast.message));
    }
    lines.push(format!(
        "Jour {} sur {} ({:.0} % du mois écoulé).",
        window.day(),
        window.last_day(),
        month_progress
    ));

    lines.truncate(6);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fourmi_core::{Transaction, Verdict};
    use std::str::FromStr;

    fn window(d: u32) -> MonthWindow {
        MonthWindow::for_date(NaiveDate::from_ymd_opt(2025, 11, d).unwrap())
    }

    fn money(s: &str) -> Money {
        Money::from_decimal(Decimal::from_str(s).unwrap())
    }

    fn fixed_tx(label: &str, cents: i64) -> ClassifiedTransaction {
        ClassifiedTransaction {
            transaction: Transaction {
                date: NaiveDate::from_ymd_opt(2025, 11, 10),
                label: label.to_string(),
                notes: String::new(),
                amount: Money::from_cents(cents),
                category: String::new(),
                account: String::new(),
                tag_labels: Vec::new(),
            },
            verdict: Verdict::Fixed {
                entry: fourmi_core::RecurringExpense::with_pattern(label),
            },
        }
    }

    fn family(name: &str, members: &[&str], budget: &str, alert: bool) -> Family {
        Family {
            name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
            monthly_budget: Decimal::from_str(budget).unwrap(),
            alert_on_overrun: alert,
            display_mode: DisplayMode::Detail,
        }
    }

    // ── forecast ─────────────────────────────────────────────────────────

    #[test]
    fn forecast_mid_month_overrun() {
        // 1200 spent on day 15 of 30 → 2400 projected, 900 over a 1500 budget.
        let f = forecast_from_parts(money("1200"), money("1500"), 15, 30);
        assert_eq!(f.amount, money("2400"));
        assert_eq!(f.overrun, money("900"));
        assert_eq!(f.color, StatusColor::Red);
        assert!(f.message.contains("900,00 €"));
    }

    #[test]
    fn forecast_day_one_is_defined() {
        let f = forecast_from_parts(money("40"), money("1500"), 1, 30);
        assert!(f.defined);
        assert_eq!(f.amount, money("1200"));
        assert_eq!(f.color, StatusColor::Green);
    }

    #[test]
    fn forecast_last_day_equals_current() {
        let f = forecast_from_parts(money("700"), money("1500"), 30, 30);
        assert_eq!(f.amount, money("700"));
        assert_eq!(f.color, StatusColor::Green);
    }

    #[test]
    fn forecast_day_zero_is_neutral() {
        let f = forecast_from_parts(money("0"), money("1500"), 0, 30);
        assert!(!f.defined);
        assert_eq!(f.message, "Prévision indisponible");
    }

    #[test]
    fn forecast_orange_above_ninety_percent() {
        // 700 on day 15 of 30 → 1400 of a 1500 budget ≈ 93 %.
        let f = forecast_from_parts(money("700"), money("1500"), 15, 30);
        assert_eq!(f.color, StatusColor::Orange);
    }

    // ── family aggregation ───────────────────────────────────────────────

    #[test]
    fn family_totals_and_status() {
        let families = vec![family("Énergie", &["EDF", "ENGIE"], "200", true)];
        let fixed = vec![fixed_tx("PRLV EDF", -11714), fixed_tx("PRLV ENGIE", -6000)];
        let (totals, missing) = aggregate_families(&families, &fixed, window(15));
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].total, money("177.14"));
        assert_eq!(totals[0].transaction_count, 2);
        assert_eq!(totals[0].status, FamilyStatus::Ok);
        assert!(!totals[0].alert);
        assert!(missing.is_empty());
    }

    #[test]
    fn family_exceeded_raises_alert() {
        let families = vec![family("Énergie", &["EDF"], "100", true)];
        let fixed = vec![fixed_tx("PRLV EDF", -11000)];
        let (totals, _) = aggregate_families(&families, &fixed, window(15));
        assert_eq!(totals[0].status, FamilyStatus::Exceeded);
        assert!(totals[0].alert);
    }

    #[test]
    fn family_warning_at_ninety_percent() {
        let families = vec![family("Énergie", &["EDF"], "100", false)];
        let fixed = vec![fixed_tx("PRLV EDF", -9000)];
        let (totals, _) = aggregate_families(&families, &fixed, window(15));
        assert_eq!(totals[0].status, FamilyStatus::Warning);
        assert!(!totals[0].alert);
    }

    #[test]
    fn family_without_budget() {
        let families = vec![family("Divers", &["X"], "0", true)];
        let (totals, _) = aggregate_families(&families, &[fixed_tx("X", -1000)], window(15));
        assert_eq!(totals[0].status, FamilyStatus::NoBudget);
        assert_eq!(totals[0].percentage, 0.0);
        assert!(!totals[0].alert);
    }

    #[test]
    fn transaction_counted_in_first_family_only() {
        let families = vec![
            family("A", &["EDF"], "100", false),
            family("B", &["EDF PARIS"], "100", false),
        ];
        let fixed = vec![fixed_tx("EDF PARIS", -5000)];
        let (totals, _) = aggregate_families(&families, &fixed, window(15));
        assert_eq!(totals[0].transaction_count, 1);
        assert_eq!(totals[1].transaction_count, 0);
    }

    #[test]
    fn missing_member_is_reported() {
        let families = vec![family("Énergie", &["EDF", "ENGIE"], "200", false)];
        let fixed = vec![fixed_tx("PRLV EDF", -11714)];
        let (_, missing) = aggregate_families(&families, &fixed, window(15));
        assert_eq!(
            missing,
            vec![MissingMember { family: "Énergie".into(), member: "ENGIE".into() }]
        );
    }

    #[test]
    fn family_sums_never_exceed_input() {
        let families = vec![family("A", &["EDF"], "100", false)];
        let fixed = vec![fixed_tx("PRLV EDF", -5000), fixed_tx("AUTRE", -7000)];
        let (totals, _) = aggregate_families(&families, &fixed, window(15));
        assert_eq!(totals[0].total, money("50"));
    }

    // ── variable budget status ───────────────────────────────────────────

    #[test]
    fn green_when_under_pace() {
        let s = variable_budget_status(money("0"), money("1000"), window(15));
        assert_eq!(s.remaining, money("1000"));
        assert_eq!(s.color, StatusColor::Green);
        assert!(s.advice.len() >= 3 && s.advice.len() <= 6);
    }

    #[test]
    fn orange_at_eighty_percent() {
        let s = variable_budget_status(money("800"), money("1000"), window(29));
        assert_eq!(s.color, StatusColor::Orange);
    }

    #[test]
    fn orange_when_ahead_of_month_pace() {
        // 40 % used on day 3 of 30 (10 % of the month): 40 > 10 + 10.
        let s = variable_budget_status(money("400"), money("1000"), window(3));
        assert_eq!(s.color, StatusColor::Orange);
        assert!(s.advice.iter().any(|l| l.contains("Plafond conseillé")));
    }

    #[test]
    fn red_when_over_budget() {
        let s = variable_budget_status(money("1200"), money("1000"), window(15));
        assert_eq!(s.color, StatusColor::Red);
        assert!(s.advice.iter().any(|l| l.contains("dépassé de 200,00 €")));
    }

    #[test]
    fn zero_budget_red_only_when_spending() {
        let spent = variable_budget_status(money("10"), money("0"), window(15));
        assert_eq!(spent.percentage, 0.0);
        assert_eq!(spent.color, StatusColor::Red);

        let idle = variable_budget_status(money("0"), money("0"), window(2));
        assert_eq!(idle.color, StatusColor::Green);
    }

    #[test]
    fn last_day_emits_no_daily_ceiling() {
        let s = variable_budget_status(money("950"), money("1000"), window(30));
        assert_eq!(s.color, StatusColor::Orange);
        assert!(!s.advice.iter().any(|l| l.contains("Plafond conseillé")));
    }

    #[test]
    fn green_congratulates_when_far_ahead() {
        // Pace position on day 15/30 of 1000 is 500; spent 100 → 400 ahead.
        let s = variable_budget_status(money("100"), money("1000"), window(15));
        assert_eq!(s.color, StatusColor::Green);
        assert!(s.advice.iter().any(|l| l.contains("Bravo")));
    }
}
