use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use fourmi_core::catalog::DisplayMode;
use fourmi_core::{Catalog, ClassifiedTransaction, Money};
use fourmi_engine::{AnalysisResult, FamilyTotal, StatusColor};

use crate::presentation::{effective_rules, presentation_family, FALLBACK_FAMILY};
use crate::sign::UrlSigner;
use crate::slug::slugify;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One generated drill-down page.
#[derive(Debug, Clone, Serialize)]
pub struct FamilyReport {
    pub name: String,
    pub slug: String,
    pub total: Money,
    pub transaction_count: usize,
    pub url: String,
    pub file_path: PathBuf,
}

/// The run's report set: the index page plus one page per non-empty family.
#[derive(Debug, Clone, Serialize)]
pub struct ReportIndex {
    pub report_date: NaiveDate,
    pub base_dir: PathBuf,
    pub index_url: String,
    pub families: Vec<FamilyReport>,
    pub grand_total: Money,
    pub total_transactions: usize,
}

/// Writes the dated report directory under `reports_root` and hands back
/// signed public URLs for the notification layer.
pub struct ReportWriter {
    reports_root: PathBuf,
    base_url: String,
    signer: UrlSigner,
}

impl ReportWriter {
    pub fn new(reports_root: PathBuf, base_url: String, signer: UrlSigner) -> Self {
        ReportWriter {
            reports_root,
            base_url,
            signer,
        }
    }

    /// Write `index.html` and the per-family pages for this run. Families
    /// with no transaction this month get no page and no index row.
    pub fn write(
        &self,
        catalog: &Catalog,
        analysis: &AnalysisResult,
        report_date: NaiveDate,
        now_epoch: i64,
    ) -> Result<ReportIndex, ReportError> {
        let date_dir = report_date.format("%Y-%m-%d").to_string();
        let base_dir = self.reports_root.join(&date_dir);
        fs::create_dir_all(&base_dir)?;

        let rules = effective_rules(catalog);

        // Ordered buckets: the rule table first, the fallback last. Fixed and
        // variable rows both appear in the drill-down; excluded rows do not.
        let mut names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
        names.push(FALLBACK_FAMILY);
        let mut buckets: Vec<Vec<&ClassifiedTransaction>> = vec![Vec::new(); names.len()];

        for ct in analysis.fixed.iter().chain(analysis.variable.iter()) {
            let family = presentation_family(&rules, &ct.transaction);
            let idx = names.iter().position(|n| *n == family).unwrap_or(names.len() - 1);
            buckets[idx].push(ct);
        }

        let mut families = Vec::new();
        for (name, mut rows) in names.into_iter().zip(buckets) {
            if rows.is_empty() {
                continue;
            }
            // Most recent first; dateless rows sink to the bottom.
            rows.sort_by(|a, b| b.transaction.date.cmp(&a.transaction.date));

            let slug = slugify(name);
            let file = format!("family-{slug}.html");
            let total: Money = rows.iter().map(|c| c.transaction.amount.abs()).sum();
            let budget_row = analysis.families.iter().find(|f| f.name == name);

            let page = family_page(name, &rows, total, budget_row, report_date);
            let file_path = base_dir.join(&file);
            fs::write(&file_path, page)?;

            families.push(FamilyReport {
                name: name.to_string(),
                slug,
                total,
                transaction_count: rows.len(),
                url: self.signer.signed_url(&self.base_url, &format!("{date_dir}/{file}"), now_epoch),
                file_path,
            });
        }

        // Biggest spenders first on the index page.
        families.sort_by(|a, b| b.total.cmp(&a.total));

        let index = ReportIndex {
            report_date,
            index_url: self
                .signer
                .signed_url(&self.base_url, &format!("{date_dir}/index.html"), now_epoch),
            families,
            grand_total: analysis.total,
            total_transactions: analysis.fixed.len() + analysis.variable.len(),
            base_dir: base_dir.clone(),
        };

        fs::write(base_dir.join("index.html"), index_page(&index, analysis))?;
        tracing::info!(
            dir = %base_dir.display(),
            pages = index.families.len() + 1,
            "report written"
        );

        Ok(index)
    }
}

/// Minimal HTML escaping for text nodes and attribute values.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page_shell(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="fr">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<meta name="robots" content="noindex">
<title>{title}</title>
<style>
body {{ font-family: -apple-system, "Segoe UI", sans-serif; margin: 1.5em auto; max-width: 46em; padding: 0 1em; color: #222; }}
table {{ border-collapse: collapse; width: 100%; }}
th, td {{ text-align: left; padding: 0.4em 0.6em; border-bottom: 1px solid #ddd; }}
td.amount, th.amount {{ text-align: right; white-space: nowrap; }}
tr.total td {{ font-weight: bold; border-top: 2px solid #999; }}
.budget {{ margin: 1em 0; padding: 0.8em 1em; border-radius: 6px; background: #f4f4f4; }}
.bar {{ height: 0.6em; border-radius: 3px; background: #ddd; overflow: hidden; margin-top: 0.4em; }}
.bar > div {{ height: 100%; }}
a {{ color: #1565c0; }}
</style>
</head>
<body>
{body}
</body>
</html>
"#,
        title = escape(title),
    )
}

fn progress_bar(percentage: f64, color: StatusColor) -> String {
    let width = percentage.clamp(0.0, 100.0);
    format!(
        r#"<div class="bar"><div style="width:{width:.0}%;background:{}"></div></div>"#,
        color.css()
    )
}

fn family_page(
    name: &str,
    rows: &[&ClassifiedTransaction],
    total: Money,
    budget: Option<&FamilyTotal>,
    report_date: NaiveDate,
) -> String {
    let mut body = format!(
        "<p><a href=\"index.html\">&larr; Synthèse</a></p>\n<h1>{}</h1>\n<p>Rapport du {}</p>\n",
        escape(name),
        report_date.format("%d/%m/%Y"),
    );

    if let Some(b) = budget {
        if !b.monthly_budget.is_zero() {
            let color = match b.percentage {
                p if p > 100.0 => StatusColor::Red,
                p if p >= 90.0 => StatusColor::Orange,
                _ => StatusColor::Green,
            };
            body.push_str(&format!(
                "<div class=\"budget\">Budget mensuel : {} / {} ({:.0} %){}\n{}</div>\n",
                b.total,
                b.monthly_budget,
                b.percentage,
                if b.forecast.defined {
                    format!("<br>{}", escape(&b.forecast.message))
                } else {
                    String::new()
                },
                progress_bar(b.percentage, color),
            ));
        }
    }

    // Summary-mode families get the totals line without the row listing.
    let summary_only = budget.is_some_and(|b| b.display_mode == DisplayMode::Summary);

    body.push_str(
        "<table>\n<tr><th>Date</th><th>Libellé</th><th>Catégorie</th><th class=\"amount\">Montant</th></tr>\n",
    );
    if !summary_only {
        for ct in rows {
            let date = ct
                .transaction
                .date
                .map(|d| d.format("%d/%m/%Y").to_string())
                .unwrap_or_else(|| "—".to_string());
            body.push_str(&format!(
                "<tr><td>{date}</td><td>{}</td><td>{}</td><td class=\"amount\">{}</td></tr>\n",
                escape(&ct.transaction.combined_label()),
                escape(ct.display_category()),
                ct.transaction.amount.abs(),
            ));
        }
    }
    body.push_str(&format!(
        "<tr class=\"total\"><td colspan=\"3\">Total ({} opérations)</td><td class=\"amount\">{total}</td></tr>\n</table>\n",
        rows.len(),
    ));

    page_shell(&format!("{name} — rapport du {}", report_date.format("%d/%m/%Y")), &body)
}

fn index_page(index: &ReportIndex, analysis: &AnalysisResult) -> String {
    let b = &analysis.budget;
    let mut body = format!(
        "<h1>Dépenses du mois {}</h1>\n<p>Rapport du {}</p>\n",
        analysis.window,
        index.report_date.format("%d/%m/%Y"),
    );

    body.push_str(&format!(
        "<div class=\"budget\">{} Variables : {} sur {} ({:.0} %)\n{}</div>\n",
        b.color.emoji(),
        b.total_variable,
        b.budget_max,
        b.percentage,
        progress_bar(b.percentage, b.color),
    ));
    for line in &b.advice {
        body.push_str(&format!("<p>{}</p>\n", escape(line)));
    }

    body.push_str(
        "<table>\n<tr><th>Famille</th><th>Opérations</th><th class=\"amount\">Total</th></tr>\n",
    );
    for f in &index.families {
        body.push_str(&format!(
            "<tr><td><a href=\"family-{}.html\">{}</a></td><td>{}</td><td class=\"amount\">{}</td></tr>\n",
            f.slug,
            escape(&f.name),
            f.transaction_count,
            f.total,
        ));
    }
    body.push_str(&format!(
        "<tr class=\"total\"><td>Total</td><td>{}</td><td class=\"amount\">{}</td></tr>\n</table>\n",
        index.total_transactions, index.grand_total,
    ));

    if !analysis.family_alerts.is_empty() {
        body.push_str("<h2>Alertes</h2>\n");
        for alert in &analysis.family_alerts {
            body.push_str(&format!("<p>⚠️ {}</p>\n", escape(alert)));
        }
    }
    if !analysis.missing_members.is_empty() {
        body.push_str("<h2>Prélèvements attendus non vus</h2>\n<ul>\n");
        for m in &analysis.missing_members {
            body.push_str(&format!(
                "<li>{} ({})</li>\n",
                escape(&m.member),
                escape(&m.family)
            ));
        }
        body.push_str("</ul>\n");
    }

    page_shell(
        &format!("Dépenses {} — rapport du {}", analysis.window, index.report_date.format("%d/%m/%Y")),
        &body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fourmi_core::{MonthWindow, Transaction, Verdict};
    use fourmi_engine::analyze;
    use fourmi_import::ExportPartition;
    use tempfile::TempDir;

    fn tx(label: &str, cents: i64, category: &str, day: u32) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(2025, 11, day),
            label: label.to_string(),
            notes: String::new(),
            amount: Money::from_cents(cents),
            category: category.to_string(),
            account: String::new(),
            tag_labels: Vec::new(),
        }
    }

    fn catalog() -> Catalog {
        Catalog::from_json(
            r#"{
                "depenses_fixes": [
                    {"patterns": ["EDF"], "identifier": "Électricité",
                     "category": "Énergie",
                     "expected_amount": 117.0, "amount_tolerance": 0.30}
                ],
                "totaux": {"budget_variable_max": 1000}
            }"#,
        )
        .unwrap()
    }

    fn analysis() -> AnalysisResult {
        let partition = ExportPartition {
            valid: vec![
                tx("PRLV EDF", -11714, "Énergie", 5),
                tx("CARREFOUR MARKET", -4520, "Alimentation", 12),
                tx("BOULANGERIE DUPONT", -350, "Alimentation", 14),
            ],
            excluded: Vec::new(),
        };
        let window = MonthWindow::for_date(NaiveDate::from_ymd_opt(2025, 11, 15).unwrap());
        analyze(&catalog(), partition, window, PathBuf::from("export.csv"), None)
    }

    fn writer(root: &Path, key: Option<&str>) -> ReportWriter {
        ReportWriter::new(
            root.to_path_buf(),
            "https://rapports.example.org".to_string(),
            UrlSigner::new(key.map(String::from)),
        )
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 15).unwrap()
    }

    #[test]
    fn writes_index_and_family_pages() {
        let dir = TempDir::new().unwrap();
        let index = writer(dir.path(), None)
            .write(&catalog(), &analysis(), date(), 0)
            .unwrap();

        assert!(index.base_dir.ends_with("2025-11-15"));
        assert!(index.base_dir.join("index.html").is_file());
        assert_eq!(index.families.len(), 2);
        assert_eq!(index.families[0].name, "Eau & Énergie");
        assert_eq!(index.families[1].name, "Alimentation");
        for f in &index.families {
            assert!(f.file_path.is_file());
        }
        assert_eq!(index.total_transactions, 3);
        assert_eq!(index.grand_total, Money::from_cents(16584));
    }

    #[test]
    fn index_links_every_family_page() {
        let dir = TempDir::new().unwrap();
        let index = writer(dir.path(), None)
            .write(&catalog(), &analysis(), date(), 0)
            .unwrap();
        let html = fs::read_to_string(index.base_dir.join("index.html")).unwrap();
        for f in &index.families {
            assert!(html.contains(&format!("family-{}.html", f.slug)));
        }
        assert!(html.contains("1000,00 €"));
    }

    #[test]
    fn family_page_rows_are_date_descending() {
        let dir = TempDir::new().unwrap();
        let index = writer(dir.path(), None)
            .write(&catalog(), &analysis(), date(), 0)
            .unwrap();
        let food = index.families.iter().find(|f| f.name == "Alimentation").unwrap();
        let html = fs::read_to_string(&food.file_path).unwrap();
        let boulangerie = html.find("BOULANGERIE DUPONT").unwrap();
        let carrefour = html.find("CARREFOUR MARKET").unwrap();
        assert!(boulangerie < carrefour, "14/11 row must precede 12/11 row");
    }

    #[test]
    fn empty_families_get_no_page() {
        let dir = TempDir::new().unwrap();
        let index = writer(dir.path(), None)
            .write(&catalog(), &analysis(), date(), 0)
            .unwrap();
        assert!(!index.base_dir.join("family-transports.html").exists());
        assert!(index.families.iter().all(|f| f.transaction_count > 0));
    }

    #[test]
    fn unmatched_rows_land_in_fallback_bucket() {
        let partition = ExportPartition {
            valid: vec![tx("TRUC OBSCUR", -990, "", 3)],
            excluded: Vec::new(),
        };
        let window = MonthWindow::for_date(date());
        let analysis = analyze(&catalog(), partition, window, PathBuf::new(), None);

        let dir = TempDir::new().unwrap();
        let index = writer(dir.path(), None)
            .write(&catalog(), &analysis, date(), 0)
            .unwrap();
        assert_eq!(index.families.len(), 1);
        assert_eq!(index.families[0].name, FALLBACK_FAMILY);
        assert_eq!(index.families[0].slug, "autres-depenses");
    }

    #[test]
    fn summary_mode_family_hides_the_row_listing() {
        let catalog = Catalog::from_json(
            r#"{
                "depenses_fixes": [
                    {"patterns": ["CARREFOUR"], "identifier": "Courses", "expected_amount": 0}
                ],
                "familles_depenses": [
                    {"name": "Alimentation", "members": ["CARREFOUR"],
                     "monthly_budget": 200, "display_mode": "summary"}
                ]
            }"#,
        )
        .unwrap();
        let partition = ExportPartition {
            valid: vec![tx("CARREFOUR MARKET", -4520, "Alimentation", 12)],
            excluded: Vec::new(),
        };
        let window = MonthWindow::for_date(date());
        let analysis = analyze(&catalog, partition, window, PathBuf::new(), None);

        let dir = TempDir::new().unwrap();
        let index = writer(dir.path(), None)
            .write(&catalog, &analysis, date(), 0)
            .unwrap();
        let food = index.families.iter().find(|f| f.name == "Alimentation").unwrap();
        let html = fs::read_to_string(&food.file_path).unwrap();
        assert!(!html.contains("CARREFOUR MARKET"));
        assert!(html.contains("Budget mensuel"));
        assert!(html.contains("45,20 €"));
    }

    #[test]
    fn urls_carry_tokens_when_signed() {
        let dir = TempDir::new().unwrap();
        let index = writer(dir.path(), Some("clef"))
            .write(&catalog(), &analysis(), date(), 1_700_000_000)
            .unwrap();
        assert!(index.index_url.starts_with("https://rapports.example.org/2025-11-15/index.html?t="));
        for f in &index.families {
            assert!(f.url.contains("?t="));
        }
    }

    #[test]
    fn labels_are_escaped() {
        let partition = ExportPartition {
            valid: vec![tx("ACHAT <script> & CO", -990, "", 3)],
            excluded: Vec::new(),
        };
        let window = MonthWindow::for_date(date());
        let analysis = analyze(&catalog(), partition, window, PathBuf::new(), None);

        let dir = TempDir::new().unwrap();
        let index = writer(dir.path(), None)
            .write(&catalog(), &analysis, date(), 0)
            .unwrap();
        let html = fs::read_to_string(&index.families[0].file_path).unwrap();
        assert!(html.contains("ACHAT &lt;script&gt; &amp; CO"));
        assert!(!html.contains("<script>"));
    }
}
