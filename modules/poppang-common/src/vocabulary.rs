use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

const EMBEDDED: &str = include_str!("../../../config/vocabulary.toml");

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Category {
    pub name: String,
    pub id: i32,
}

/// Versioned category and human-indicator vocabularies.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Vocabulary {
    pub version: u32,
    pub catch_all: String,
    pub fallback_id: i32,
    pub human_indicators: Vec<String>,
    pub categories: Vec<Category>,
}

impl Vocabulary {
    /// The vocabulary shipped with the binary.
    pub fn embedded() -> Result<Self> {
        Self::parse(EMBEDDED).context("embedded vocabulary is invalid")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read vocabulary: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse vocabulary: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut vocab: Vocabulary = toml::from_str(content)?;
        if vocab.categories.is_empty() {
            bail!("vocabulary has no categories");
        }
        if !vocab.categories.iter().any(|c| c.name == vocab.catch_all) {
            bail!("catch-all category {:?} is not in the category list", vocab.catch_all);
        }
        for term in &mut vocab.human_indicators {
            *term = term.to_lowercase();
        }
        Ok(vocab)
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    pub fn category_id(&self, name: &str) -> Option<i32> {
        self.categories
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.id)
    }

    /// Map category names to ids. Unknown names are ignored; the result is never empty.
    pub fn category_ids<S: AsRef<str>>(&self, names: &[S]) -> Vec<i32> {
        let mut ids = Vec::new();
        for name in names {
            if let Some(id) = self.category_id(name.as_ref().trim()) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        if ids.is_empty() {
            ids.push(self.fallback_id);
        }
        ids
    }

    /// Whether a vision label names people (case-insensitive substring match).
    pub fn is_human_label(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.human_indicators
            .iter()
            .any(|term| label.contains(term.as_str()))
    }
}
