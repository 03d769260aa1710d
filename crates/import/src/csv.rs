use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use fourmi_core::{money::Money, MonthWindow, Transaction};

use crate::decode::{decode_export, detect_delimiter, DecodeError};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("export file not found: {0}")]
    NotFound(String),
    #[error("cannot read export file: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Encoding(#[from] DecodeError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("export contains no parsable rows")]
    NoRows,
}

/// Reason-tagged exclusion hook. The reader stays decoupled from the
/// classifier: the caller passes the exclusion stage in and gets the final
/// partition back.
pub type ExclusionFn<'a> = dyn Fn(&Transaction) -> Option<String> + 'a;

/// The reader's output: the rows that enter classification and the rows the
/// exclusion stage removed, each with its reason.
#[derive(Debug, Default)]
pub struct ExportPartition {
    pub valid: Vec<Transaction>,
    pub excluded: Vec<(Transaction, String)>,
}

impl ExportPartition {
    pub fn total_rows(&self) -> usize {
        self.valid.len() + self.excluded.len()
    }
}

/// Column indices resolved from the aggregator's French header row. Every
/// column is optional; absent fields default downstream.
#[derive(Debug, Default, Clone, Copy)]
struct ColumnMap {
    date: Option<usize>,
    label: Option<usize>,
    notes: Option<usize>,
    amount: Option<usize>,
    category: Option<usize>,
    account: Option<usize>,
    labels: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let mut map = ColumnMap::default();
        for (idx, raw) in headers.iter().enumerate() {
            let name = raw.trim().trim_start_matches('\u{FEFF}');
            match name {
                "Date" => map.date = Some(idx),
                "Libellé" | "Libelle" => map.label = Some(idx),
                "Notes" => map.notes = Some(idx),
                "Montant" => map.amount = Some(idx),
                "Catégorie" | "Categorie" => map.category = Some(idx),
                "Nom du compte" | "Compte" => map.account = Some(idx),
                "Labels" => map.labels = Some(idx),
                _ => {}
            }
        }
        map
    }

    fn field<'r>(&self, record: &'r csv::StringRecord, col: Option<usize>) -> &'r str {
        col.and_then(|c| record.get(c)).unwrap_or_default().trim()
    }
}

/// Read and normalise the aggregator export at `path`, keep only the rows of
/// `window`'s calendar month, and split them through the exclusion stage.
pub fn read_export(
    path: &Path,
    window: MonthWindow,
    exclude: &ExclusionFn<'_>,
) -> Result<ExportPartition, ImportError> {
    if !path.exists() {
        return Err(ImportError::NotFound(path.display().to_string()));
    }
    let bytes = std::fs::read(path)?;
    let (text, encoding) = decode_export(&bytes)?;
    let delimiter = detect_delimiter(&text);
    tracing::debug!(
        encoding = encoding.label(),
        delimiter = %(delimiter as char),
        "reading export {}",
        path.display()
    );

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let map = ColumnMap::from_headers(reader.headers()?);

    let mut partition = ExportPartition::default();
    let mut parsed_rows = 0usize;

    for result in reader.records() {
        let record = result?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        parsed_rows += 1;

        let tx = Transaction {
            date: parse_export_date(map.field(&record, map.date)),
            label: map.field(&record, map.label).to_string(),
            notes: map.field(&record, map.notes).to_string(),
            amount: parse_locale_amount(map.field(&record, map.amount)),
            category: map.field(&record, map.category).to_string(),
            account: map.field(&record, map.account).to_string(),
            tag_labels: split_tags(map.field(&record, map.labels)),
        };

        // The scraper's period selector is only a hint; the month filter here
        // is authoritative. Dateless rows are kept for downstream to skip.
        if let Some(date) = tx.date {
            if !window.contains(date) {
                continue;
            }
        }

        match exclude(&tx) {
            Some(reason) => partition.excluded.push((tx, reason)),
            None => partition.valid.push(tx),
        }
    }

    if parsed_rows == 0 {
        return Err(ImportError::NoRows);
    }

    Ok(partition)
}

/// `DD/MM/YYYY`; anything else yields `None` and the row is kept dateless.
pub fn parse_export_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%d/%m/%Y").ok()
}

/// Locale-agnostic amount: spaces (incl. non-breaking) and the euro sign are
/// stripped, the decimal comma becomes a dot. Unparsable input maps to zero.
pub fn parse_locale_amount(s: &str) -> Money {
    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '€' && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return Money::zero();
    }
    Decimal::from_str(&cleaned)
        .map(Money::from_decimal)
        .unwrap_or_else(|_| Money::zero())
}

fn split_tags(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn window() -> MonthWindow {
        MonthWindow::for_date(NaiveDate::from_ymd_opt(2025, 11, 15).unwrap())
    }

    fn no_exclusion(_: &Transaction) -> Option<String> {
        None
    }

    fn write_export(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    const HEADERS: &str = "Date;Libellé;Notes;Montant;Catégorie;Nom du compte;Labels";

    // ── amount parsing ───────────────────────────────────────────────────

    #[test]
    fn amount_locale_comma() {
        assert_eq!(parse_locale_amount("-12,34"), Money::from_cents(-1234));
    }

    #[test]
    fn amount_with_euro_sign_and_spaces() {
        assert_eq!(parse_locale_amount("-1 234,56 €"), Money::from_cents(-123_456));
        assert_eq!(parse_locale_amount("-1\u{a0}234,56\u{a0}€"), Money::from_cents(-123_456));
    }

    #[test]
    fn amount_unparsable_is_zero() {
        assert!(parse_locale_amount("n/a").is_zero());
        assert!(parse_locale_amount("").is_zero());
    }

    // ── date parsing ─────────────────────────────────────────────────────

    #[test]
    fn date_french_format() {
        assert_eq!(
            parse_export_date("15/11/2025"),
            NaiveDate::from_ymd_opt(2025, 11, 15)
        );
    }

    #[test]
    fn date_invalid_is_none() {
        assert_eq!(parse_export_date("2025-11-15"), None);
        assert_eq!(parse_export_date("pas une date"), None);
    }

    // ── full reads ───────────────────────────────────────────────────────

    #[test]
    fn read_semicolon_export() {
        let f = write_export(&format!(
            "{HEADERS}\n15/11/2025;EDF PARIS;;-117,14;Energie;Compte courant;\n"
        ));
        let p = read_export(f.path(), window(), &no_exclusion).unwrap();
        assert_eq!(p.valid.len(), 1);
        assert_eq!(p.valid[0].label, "EDF PARIS");
        assert_eq!(p.valid[0].amount, Money::from_cents(-11714));
        assert_eq!(p.valid[0].category, "Energie");
    }

    #[test]
    fn read_tab_delimited_export() {
        let f = write_export(
            "Date\tLibellé\tNotes\tMontant\tCatégorie\tNom du compte\tLabels\n\
             15/11/2025\tSNCF\t\t-45,00\tTransport\tCompte\t\n",
        );
        let p = read_export(f.path(), window(), &no_exclusion).unwrap();
        assert_eq!(p.valid.len(), 1);
        assert_eq!(p.valid[0].label, "SNCF");
    }

    #[test]
    fn rows_outside_the_month_are_dropped() {
        let f = write_export(&format!(
            "{HEADERS}\n\
             15/10/2025;OLD;;-10,00;;;\n\
             15/11/2025;KEPT;;-10,00;;;\n\
             01/12/2025;FUTURE;;-10,00;;;\n"
        ));
        let p = read_export(f.path(), window(), &no_exclusion).unwrap();
        assert_eq!(p.valid.len(), 1);
        assert_eq!(p.valid[0].label, "KEPT");
    }

    #[test]
    fn dateless_rows_are_kept() {
        let f = write_export(&format!("{HEADERS}\n???;SANS DATE;;-10,00;;;\n"));
        let p = read_export(f.path(), window(), &no_exclusion).unwrap();
        assert_eq!(p.valid.len(), 1);
        assert_eq!(p.valid[0].date, None);
    }

    #[test]
    fn exclusion_stage_partitions_inline() {
        let f = write_export(&format!(
            "{HEADERS}\n\
             15/11/2025;AMAZON PAYMENTS;;-10,00;;;\n\
             15/11/2025;BOULANGERIE;;-3,50;;;\n"
        ));
        let exclude = |tx: &Transaction| {
            tx.combined_label()
                .contains("AMAZON")
                .then(|| "internal merchant".to_string())
        };
        let p = read_export(f.path(), window(), &exclude).unwrap();
        assert_eq!(p.valid.len(), 1);
        assert_eq!(p.excluded.len(), 1);
        assert_eq!(p.excluded[0].1, "internal merchant");
        assert_eq!(p.total_rows(), 2);
    }

    #[test]
    fn tags_are_split_on_commas() {
        let f = write_export(&format!(
            "{HEADERS}\n15/11/2025;SPOTIFY;;-10,99;;;Récurrent, Loisirs\n"
        ));
        let p = read_export(f.path(), window(), &no_exclusion).unwrap();
        assert_eq!(p.valid[0].tag_labels, vec!["Récurrent", "Loisirs"]);
    }

    #[test]
    fn utf16_export_reads_end_to_end() {
        let content = format!("{HEADERS}\n15/11/2025;CAFÉ;;-4,20;;;\n");
        let mut bytes = vec![0xFF, 0xFE];
        for unit in content.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&bytes).unwrap();
        let p = read_export(f.path(), window(), &no_exclusion).unwrap();
        assert_eq!(p.valid.len(), 1);
        assert_eq!(p.valid[0].label, "CAFÉ");
    }

    #[test]
    fn missing_file_errors() {
        let err = read_export(Path::new("/nonexistent/export.csv"), window(), &no_exclusion);
        assert!(matches!(err, Err(ImportError::NotFound(_))));
    }

    #[test]
    fn header_only_export_errors() {
        let f = write_export(&format!("{HEADERS}\n"));
        assert!(matches!(
            read_export(f.path(), window(), &no_exclusion),
            Err(ImportError::NoRows)
        ));
    }
}
