// App catalog discovery: `<apps_root>/<model>/app<N>` directories

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use fleetscan_core::domain::ModelEntry;
use fleetscan_core::error::{AppError, Result};

/// A configured model; `app_count` is discovered on disk when absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSource {
    pub name: String,
    #[serde(default)]
    pub app_count: Option<u32>,
}

/// Highest N among the `app<N>` directories (N >= 1) under `<apps_root>/<model>`
///
/// Gaps are kept in the numbering, so `app1` and `app5` give 5. A model
/// without a directory has zero apps.
pub fn highest_app_number(apps_root: &Path, model: &str) -> Result<u32> {
    let model_dir = apps_root.join(model);
    if !model_dir.is_dir() {
        return Ok(0);
    }

    let mut highest = 0;
    for entry in std::fs::read_dir(&model_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let app_num = name
            .to_str()
            .and_then(|n| n.strip_prefix("app"))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(n) = app_num {
            highest = highest.max(n);
        }
    }
    Ok(highest)
}

/// Turn configured models into registry entries, preserving order
pub fn resolve_models(apps_root: &Path, sources: &[ModelSource]) -> Result<Vec<ModelEntry>> {
    if sources.is_empty() {
        return Err(AppError::Config("no models configured".to_string()));
    }

    let mut entries = Vec::with_capacity(sources.len());
    for source in sources {
        let app_count = match source.app_count {
            Some(count) => count,
            None => {
                let discovered = highest_app_number(apps_root, &source.name)?;
                if discovered == 0 {
                    warn!(model = %source.name, root = %apps_root.display(), "No apps found for model");
                }
                discovered
            }
        };
        entries.push(ModelEntry::new(source.name.clone(), app_count));
    }

    info!(models = entries.len(), "Resolved model catalog");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn catalog() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for dir in ["Llama/app1", "Llama/app2", "Llama/app3", "Llama/scratch", "Llama/app0"] {
            fs::create_dir_all(root.path().join(dir)).unwrap();
        }
        fs::write(root.path().join("Llama/app4"), "not a directory").unwrap();
        root
    }

    #[test]
    fn test_only_app_directories_are_considered() {
        let root = catalog();
        assert_eq!(highest_app_number(root.path(), "Llama").unwrap(), 3);
        assert_eq!(highest_app_number(root.path(), "Missing").unwrap(), 0);
    }

    #[test]
    fn test_gaps_keep_highest_app_number() {
        let root = tempfile::tempdir().unwrap();
        for dir in ["Llama/app1", "Llama/app5"] {
            fs::create_dir_all(root.path().join(dir)).unwrap();
        }
        assert_eq!(highest_app_number(root.path(), "Llama").unwrap(), 5);

        let sources = vec![ModelSource {
            name: "Llama".to_string(),
            app_count: None,
        }];
        let entries = resolve_models(root.path(), &sources).unwrap();
        assert_eq!(entries, vec![ModelEntry::new("Llama", 5)]);
    }

    #[test]
    fn test_resolve_models_keeps_order_and_explicit_counts() {
        let root = catalog();
        let sources = vec![
            ModelSource {
                name: "GPT-4".to_string(),
                app_count: Some(7),
            },
            ModelSource {
                name: "Llama".to_string(),
                app_count: None,
            },
        ];

        let entries = resolve_models(root.path(), &sources).unwrap();
        assert_eq!(
            entries,
            vec![ModelEntry::new("GPT-4", 7), ModelEntry::new("Llama", 3)]
        );
    }

    #[test]
    fn test_resolve_models_requires_models() {
        let root = catalog();
        assert!(matches!(
            resolve_models(root.path(), &[]),
            Err(AppError::Config(_))
        ));
    }
}
