use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Categories the aggregator uses when it has nothing to say; the fallback
/// only fires for these.
const GENERIC_CATEGORIES: [&str; 3] = ["", "Non classé", "Autres"];

/// Minimum posterior for a predicted category to be applied.
pub const CONFIDENCE_FLOOR: f64 = 0.5;

pub fn is_generic_category(category: &str) -> bool {
    GENERIC_CATEGORIES.iter().any(|g| category.trim() == *g)
}

/// One labelled example from the training sidecar or the user-corrections
/// file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    pub label: String,
    pub category: String,
}

/// Multinomial naive-Bayes over label tokens with Laplace smoothing.
///
/// This never drives the fixed-vs-variable verdict; it only enriches an
/// empty or generic category. When the sidecar files are absent the model is
/// simply not built and rule-based classification stands alone.
pub struct CategoryModel {
    class_examples: HashMap<String, usize>,
    class_token_totals: HashMap<String, usize>,
    token_counts: HashMap<String, HashMap<String, usize>>,
    vocabulary: usize,
    total_examples: usize,
}

fn tokenize(label: &str) -> Vec<String> {
    label
        .to_uppercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(str::to_string)
        .collect()
}

impl CategoryModel {
    pub fn train(examples: &[TrainingExample]) -> Option<Self> {
        let mut class_examples: HashMap<String, usize> = HashMap::new();
        let mut class_token_totals: HashMap<String, usize> = HashMap::new();
        let mut token_counts: HashMap<String, HashMap<String, usize>> = HashMap::new();
        let mut vocabulary: HashMap<String, ()> = HashMap::new();
        let mut total = 0usize;

        for ex in examples {
            if ex.category.trim().is_empty() {
                continue;
            }
            let tokens = tokenize(&ex.label);
            if tokens.is_empty() {
                continue;
            }
            total += 1;
            *class_examples.entry(ex.category.clone()).or_default() += 1;
            let per_class = token_counts.entry(ex.category.clone()).or_default();
            for token in tokens {
                vocabulary.insert(token.clone(), ());
                *class_token_totals.entry(ex.category.clone()).or_default() += 1;
                *per_class.entry(token).or_default() += 1;
            }
        }

        if total == 0 {
            return None;
        }

        Some(CategoryModel {
            class_examples,
            class_token_totals,
            token_counts,
            vocabulary: vocabulary.len(),
            total_examples: total,
        })
    }

    /// Build the model from the `data/ml` sidecar directory. Either file may
    /// be absent; no file at all means no model.
    pub fn load(ml_dir: &Path) -> Option<Self> {
        let mut examples = Vec::new();
        for name in ["training_data.json", "user_corrections.json"] {
            let path = ml_dir.join(name);
            match std::fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<Vec<TrainingExample>>(&raw) {
                    Ok(mut batch) => examples.append(&mut batch),
                    Err(e) => {
                        tracing::warn!("ignoring unreadable sidecar {}: {e}", path.display());
                    }
                },
                Err(_) => continue,
            }
        }
        let model = Self::train(&examples);
        if model.is_none() {
            tracing::debug!("no usable training data in {}, fallback disabled", ml_dir.display());
        }
        model
    }

    /// Most probable category for the label with its posterior probability.
    pub fn predict(&self, label: &str) -> Option<(String, f64)> {
        let tokens = tokenize(label);
        if tokens.is_empty() {
            return None;
        }

        let mut scores: Vec<(&String, f64)> = Vec::with_capacity(self.class_examples.len());
        for (class, count) in &self.class_examples {
            let prior = (*count as f64 / self.total_examples as f64).ln();
            let token_total = *self.class_token_totals.get(class).unwrap_or(&0);
            let denominator = (token_total + self.vocabulary) as f64;
            let per_class = self.token_counts.get(class);
            let likelihood: f64 = tokens
                .iter()
                .map(|t| {
                    let count = per_class
                        .and_then(|m| m.get(t))
                        .copied()
                        .unwrap_or(0);
                    (((count + 1) as f64) / denominator).ln()
                })
                .sum();
            scores.push((class, prior + likelihood));
        }

        let max = scores
            .iter()
            .map(|(_, s)| *s)
            .fold(f64::NEG_INFINITY, f64::max);
        let normaliser: f64 = scores.iter().map(|(_, s)| (s - max).exp()).sum();

        scores
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(class, score)| (class.clone(), (score - max).exp() / normaliser))
    }

    /// Prediction gated by the confidence floor.
    pub fn confident_prediction(&self, label: &str) -> Option<String> {
        self.predict(label)
            .filter(|(_, confidence)| *confidence >= CONFIDENCE_FLOOR)
            .map(|(category, _)| category)
    }
}
