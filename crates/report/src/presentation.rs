use fourmi_core::{Catalog, PresentationRule, Transaction};

/// Bucket for everything the table does not claim.
pub const FALLBACK_FAMILY: &str = "Autres dépenses";

/// The compiled default presentation table. Ordered: the first matching row
/// wins. The catalog's `familles_presentation` key replaces it entirely.
pub fn default_rules() -> Vec<PresentationRule> {
    fn rule(name: &str, categories: &[&str], labels: &[&str]) -> PresentationRule {
        PresentationRule {
            name: name.to_string(),
            category_patterns: categories.iter().map(|s| s.to_string()).collect(),
            label_patterns: labels.iter().map(|s| s.to_string()).collect(),
        }
    }

    vec![
        rule("Crédits & Prêts", &["Crédit", "Prêt"], &["CREDIT IMMO", "PRET PERSO"]),
        rule(
            "Épargne & Investissements",
            &["Épargne", "Epargne", "Investissement"],
            &["LIVRET", "ASSURANCE VIE", "PEA"],
        ),
        rule("Animaux", &["Animaux"], &["VETERINAIRE", "CLINIQUE VET", "ANIMALERIE"]),
        rule(
            "Eau & Énergie",
            &["Énergie", "Energie", "Eau"],
            &["EDF", "ENGIE", "VEOLIA", "SUEZ", "TOTALENERGIES ELEC"],
        ),
        rule(
            "Télécommunications",
            &["Téléphone", "Internet"],
            &["ORANGE", "SFR", "BOUYGUES TELECOM", "FREE MOBILE", "FREE HAUTDEBIT"],
        ),
        rule("Impôts & Taxes", &["Impôts", "Impots", "Taxe"], &["DGFIP", "TRESOR PUBLIC"]),
        rule("Assurances", &["Assurance"], &["MAIF", "MACIF", "MATMUT", "AXA", "GMF"]),
        rule(
            "Transports",
            &["Transport"],
            &["SNCF", "RATP", "NAVIGO", "AUTOROUTE", "PARKING"],
        ),
        rule(
            "Alimentation",
            &["Alimentation", "Courses"],
            &["CARREFOUR", "LECLERC", "AUCHAN", "INTERMARCHE", "LIDL", "BOULANGERIE"],
        ),
        rule("Santé", &["Santé", "Sante", "Pharmacie"], &["PHARMACIE", "MUTUELLE", "CPAM"]),
        rule("Logement", &["Loyer", "Logement"], &["LOYER", "SYNDIC", "AGENCE IMMO"]),
    ]
}

/// The table in force for this run: the catalog's when present, the
/// compiled defaults otherwise.
pub fn effective_rules(catalog: &Catalog) -> Vec<PresentationRule> {
    if catalog.presentation.is_empty() {
        default_rules()
    } else {
        catalog.presentation.clone()
    }
}

/// Name of the presentation family a transaction belongs to. First matching
/// row wins; the fallback bucket catches the rest.
pub fn presentation_family<'a>(rules: &'a [PresentationRule], tx: &Transaction) -> &'a str {
    let category = tx.category.to_uppercase();
    let label = tx.combined_label().to_uppercase();
    rules
        .iter()
        .find(|r| r.matches(&category, &label))
        .map(|r| r.name.as_str())
        .unwrap_or(FALLBACK_FAMILY)
}
