// Model Registry - explicit, immutable index of generated-app models

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Highest app number per model
pub const MAX_APPS_PER_MODEL: u32 = 100;

/// Model identifier (as configured, case-sensitive)
pub type ModelId = String;

/// One registered model and the number of apps generated for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: ModelId,
    pub app_count: u32,
}

impl ModelEntry {
    pub fn new(name: impl Into<String>, app_count: u32) -> Self {
        Self {
            name: name.into(),
            app_count,
        }
    }
}

/// Ordered registry; a model's position is its index for port derivation
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entries: Vec<ModelEntry>,
    by_name: HashMap<ModelId, usize>,
}

impl ModelRegistry {
    pub fn new(entries: Vec<ModelEntry>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(DomainError::EmptyModelName);
            }
            if by_name.insert(entry.name.clone(), index).is_some() {
                return Err(DomainError::DuplicateModel(entry.name.clone()));
            }
            if entry.app_count > MAX_APPS_PER_MODEL {
                return Err(DomainError::TooManyApps {
                    model: entry.name.clone(),
                    app_count: entry.app_count,
                    max: MAX_APPS_PER_MODEL,
                });
            }
        }
        Ok(Self { entries, by_name })
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&ModelEntry> {
        self.index_of(name).map(|i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All app numbers of a model (1..=app_count)
    pub fn all_apps(&self, name: &str) -> Option<Vec<u32>> {
        self.get(name).map(|e| (1..=e.app_count).collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_follows_insertion_order() {
        let registry = ModelRegistry::new(vec![
            ModelEntry::new("Llama", 3),
            ModelEntry::new("Mistral", 2),
        ])
        .unwrap();

        assert_eq!(registry.index_of("Llama"), Some(0));
        assert_eq!(registry.index_of("Mistral"), Some(1));
        assert_eq!(registry.index_of("llama"), None);
        assert_eq!(registry.all_apps("Mistral"), Some(vec![1, 2]));
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = ModelRegistry::new(vec![ModelEntry::new("Llama", 1), ModelEntry::new("Llama", 2)])
            .unwrap_err();
        assert!(matches!(err, DomainError::DuplicateModel(name) if name == "Llama"));
    }

    #[test]
    fn test_app_count_above_port_space_rejected() {
        let err = ModelRegistry::new(vec![ModelEntry::new("Llama", MAX_APPS_PER_MODEL + 50)])
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::TooManyApps { app_count: 150, max: MAX_APPS_PER_MODEL, .. }
        ));

        let full = ModelRegistry::new(vec![ModelEntry::new("Llama", MAX_APPS_PER_MODEL)]).unwrap();
        assert_eq!(full.all_apps("Llama").map(|apps| apps.len()), Some(100));
    }
}
