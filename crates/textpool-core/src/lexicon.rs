//! Keyword-lexicon line classifier.
//!
//! Each non-blank line of the input becomes one [`Extraction`]. Every label
//! scores `bias + matched tokens`; the default label always scores zero.
//! Probabilities are the softmax over those scores.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::model::ModelRunner;

#[derive(Debug, Deserialize)]
struct ModelFile {
    default_label: String,
    #[serde(default)]
    labels: BTreeMap<String, LabelFile>,
}

#[derive(Debug, Deserialize)]
struct LabelFile {
    terms: Vec<String>,
    #[serde(default)]
    bias: f64,
}

#[derive(Debug)]
struct Label {
    name: String,
    bias: f64,
}

/// One labelled line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub prediction: String,
    pub probabilities: BTreeMap<String, f64>,
}

pub struct LexiconModel {
    default_label: String,
    /// Sorted by name; index is the label id used in `terms`.
    labels: Vec<Label>,
    terms: HashMap<String, Vec<usize>>,
}

impl LexiconModel {
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ModelError> {
        let file: ModelFile = toml::from_str(text).map_err(|source| ModelError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::build(file)
    }

    fn build(file: ModelFile) -> Result<Self, ModelError> {
        if file.labels.is_empty() {
            return Err(ModelError::Invalid("model defines no labels".into()));
        }
        if file.labels.contains_key(&file.default_label) {
            return Err(ModelError::Invalid(format!(
                "label {:?} is also the default label",
                file.default_label
            )));
        }

        let mut labels = Vec::with_capacity(file.labels.len());
        let mut terms: HashMap<String, Vec<usize>> = HashMap::new();

        // BTreeMap iteration keeps label ids in alphabetical order.
        for (id, (name, label)) in file.labels.into_iter().enumerate() {
            if label.terms.is_empty() {
                return Err(ModelError::Invalid(format!("label {name:?} has no terms")));
            }
            let unique: HashSet<String> = label.terms.iter().map(|t| t.to_lowercase()).collect();
            for term in unique {
                terms.entry(term).or_default().push(id);
            }
            labels.push(Label { name, bias: label.bias });
        }

        Ok(Self {
            default_label: file.default_label,
            labels,
            terms,
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.default_label.as_str()).chain(self.labels.iter().map(|l| l.name.as_str()))
    }

    fn classify(&self, line: &str) -> Extraction {
        let mut scores: Vec<f64> = self.labels.iter().map(|l| l.bias).collect();
        for token in tokens(line) {
            if let Some(ids) = self.terms.get(&token) {
                for &id in ids {
                    scores[id] += 1.0;
                }
            }
        }

        // Default label first, so strict `>` resolves ties in its favor and
        // then alphabetically.
        let mut best = (self.default_label.as_str(), 0.0_f64);
        for (label, &score) in self.labels.iter().zip(&scores) {
            if score > best.1 {
                best = (label.name.as_str(), score);
            }
        }

        let max = scores.iter().copied().fold(0.0_f64, f64::max);
        let default_exp = (0.0 - max).exp();
        let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
        let total = default_exp + exps.iter().sum::<f64>();

        let mut probabilities = BTreeMap::new();
        probabilities.insert(self.default_label.clone(), round6(default_exp / total));
        for (label, e) in self.labels.iter().zip(exps) {
            probabilities.insert(label.name.clone(), round6(e / total));
        }

        Extraction {
            text: line.to_string(),
            prediction: best.0.to_string(),
            probabilities,
        }
    }
}

impl ModelRunner for LexiconModel {
    type Record = Extraction;

    fn load(config: &ModelConfig) -> Result<Self, ModelError> {
        let path = config.path();
        let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::from_toml_str(&text, path)?;
        tracing::debug!("Loaded lexicon model with {} labels from {}", model.labels.len() + 1, path.display());
        Ok(model)
    }

    fn run(&mut self, text: &str) -> Result<Option<Vec<Extraction>>, ModelError> {
        let records: Vec<Extraction> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| self.classify(l))
            .collect();

        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(records))
    }
}

fn tokens(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}
