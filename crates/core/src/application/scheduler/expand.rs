// Job validation and task-list expansion

use crate::application::port_allocator::MAX_APPS_PER_MODEL;
use crate::domain::{parse_app_range, JobSpec, ModelRegistry, ScanSelection, ScanType};
use crate::error::{AppError, Result};
use std::collections::HashSet;

/// One task to be created, in dispatch order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTask {
    pub model: String,
    pub app_num: u32,
    pub scan_type: ScanType,
}

/// Validate `spec` and expand it to models x apps x scan types
///
/// Nothing is created when any part of the spec is invalid.
pub fn expand(
    spec: &JobSpec,
    registry: &ModelRegistry,
    supports: impl Fn(&ScanType) -> bool,
) -> Result<Vec<PlannedTask>> {
    if spec.models.is_empty() {
        return Err(AppError::validation(
            "models",
            "at least one model must be selected",
        ));
    }

    let mut seen = HashSet::new();
    for model in &spec.models {
        if !registry.contains(model) {
            return Err(AppError::validation(
                "models",
                format!("unknown model '{}'", model),
            ));
        }
        if !seen.insert(model.as_str()) {
            return Err(AppError::validation(
                "models",
                format!("model '{}' selected more than once", model),
            ));
        }
    }

    let scan_types = validate_scan_types(&spec.scan_type, &supports)?;

    for key in spec.app_ranges.keys() {
        if !seen.contains(key.as_str()) {
            return Err(AppError::validation(
                format!("app_ranges.{}", key),
                "range given for a model that is not selected",
            ));
        }
    }

    let mut planned = Vec::new();
    for model in &spec.models {
        let field = format!("app_ranges.{}", model);
        let apps: Vec<u32> = match spec.app_ranges.get(model) {
            Some(raw) => match parse_app_range(raw, MAX_APPS_PER_MODEL) {
                Ok(Some(apps)) => apps.into_iter().collect(),
                Ok(None) => all_apps(registry, model),
                Err(e) => return Err(AppError::validation(field, e.to_string())),
            },
            None => all_apps(registry, model),
        };

        for app_num in apps {
            for scan_type in &scan_types {
                planned.push(PlannedTask {
                    model: model.clone(),
                    app_num,
                    scan_type: scan_type.clone(),
                });
            }
        }
    }

    Ok(planned)
}

fn all_apps(registry: &ModelRegistry, model: &str) -> Vec<u32> {
    registry.all_apps(model).unwrap_or_default()
}

fn validate_scan_types(
    selection: &ScanSelection,
    supports: &impl Fn(&ScanType) -> bool,
) -> Result<Vec<ScanType>> {
    if let ScanSelection::Custom(names) = selection {
        if names.is_empty() {
            return Err(AppError::validation(
                "scan_type",
                "at least one custom analyzer must be named",
            ));
        }
        if names.iter().any(|name| name.trim().is_empty()) {
            return Err(AppError::validation(
                "scan_type",
                "custom analyzer names must not be empty",
            ));
        }
    }

    let scan_types = selection.scan_types();
    if let Some(missing) = scan_types.iter().find(|st| !supports(st)) {
        return Err(AppError::validation(
            "scan_type",
            format!("no analyzer registered for scan type '{}'", missing),
        ));
    }
    Ok(scan_types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobOptions, ModelEntry};
    use std::collections::BTreeMap;

    fn registry() -> ModelRegistry {
        ModelRegistry::new(vec![
            ModelEntry::new("Llama", 3),
            ModelEntry::new("GPT-4", 2),
            ModelEntry::new("Empty", 0),
        ])
        .unwrap()
    }

    fn spec(models: &[&str], scan_type: ScanSelection) -> JobSpec {
        JobSpec {
            name: "nightly".to_string(),
            description: String::new(),
            scan_type,
            models: models.iter().map(|m| m.to_string()).collect(),
            app_ranges: BTreeMap::new(),
            options: JobOptions::default(),
        }
    }

    fn all_supported(_: &ScanType) -> bool {
        true
    }

    fn field_of(err: AppError) -> String {
        match err {
            AppError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_both_with_range_expands_in_order() {
        let mut spec = spec(&["Llama"], ScanSelection::Both);
        spec.app_ranges.insert("Llama".to_string(), "1-2".to_string());

        let planned = expand(&spec, &registry(), all_supported).unwrap();

        let shape: Vec<(u32, String)> = planned
            .iter()
            .map(|p| (p.app_num, p.scan_type.to_string()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (1, "frontend".to_string()),
                (1, "backend".to_string()),
                (2, "frontend".to_string()),
                (2, "backend".to_string()),
            ]
        );
    }

    #[test]
    fn test_absent_or_empty_range_selects_all_apps() {
        let mut spec = spec(&["Llama", "GPT-4"], ScanSelection::Backend);
        spec.app_ranges.insert("GPT-4".to_string(), "  ".to_string());

        let planned = expand(&spec, &registry(), all_supported).unwrap();
        assert_eq!(planned.len(), 5);
        assert_eq!(planned[3].model, "GPT-4");
    }

    #[test]
    fn test_model_without_apps_expands_to_nothing() {
        let spec = spec(&["Empty"], ScanSelection::Frontend);
        assert!(expand(&spec, &registry(), all_supported).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_specs_rejected_with_field() {
        let err = expand(&spec(&[], ScanSelection::Both), &registry(), all_supported).unwrap_err();
        assert_eq!(field_of(err), "models");

        let err = expand(&spec(&["Mistral"], ScanSelection::Both), &registry(), all_supported)
            .unwrap_err();
        assert_eq!(field_of(err), "models");

        let err = expand(
            &spec(&["Llama", "Llama"], ScanSelection::Both),
            &registry(),
            all_supported,
        )
        .unwrap_err();
        assert_eq!(field_of(err), "models");

        let mut reversed = spec(&["Llama"], ScanSelection::Both);
        reversed.app_ranges.insert("Llama".to_string(), "3-1".to_string());
        let err = expand(&reversed, &registry(), all_supported).unwrap_err();
        assert_eq!(field_of(err), "app_ranges.Llama");

        let mut too_large = spec(&["Llama"], ScanSelection::Both);
        too_large.app_ranges.insert("Llama".to_string(), "99-101".to_string());
        let err = expand(&too_large, &registry(), all_supported).unwrap_err();
        assert_eq!(field_of(err), "app_ranges.Llama");

        let mut unbounded = spec(&["Llama"], ScanSelection::Both);
        unbounded.app_ranges.insert("Llama".to_string(), "1-4294967295".to_string());
        let err = expand(&unbounded, &registry(), all_supported).unwrap_err();
        assert_eq!(field_of(err), "app_ranges.Llama");

        let mut stray = spec(&["Llama"], ScanSelection::Both);
        stray.app_ranges.insert("GPT-4".to_string(), "1".to_string());
        let err = expand(&stray, &registry(), all_supported).unwrap_err();
        assert_eq!(field_of(err), "app_ranges.GPT-4");
    }

    #[test]
    fn test_custom_scan_types_require_registered_analyzer() {
        let only_zap = |st: &ScanType| *st == ScanType::Custom("zap".into());

        let ok = expand(
            &spec(&["GPT-4"], ScanSelection::Custom(vec!["zap".into()])),
            &registry(),
            only_zap,
        )
        .unwrap();
        assert_eq!(ok.len(), 2);

        let err = expand(
            &spec(&["GPT-4"], ScanSelection::Custom(vec!["semgrep".into()])),
            &registry(),
            only_zap,
        )
        .unwrap_err();
        assert_eq!(field_of(err), "scan_type");

        let err = expand(
            &spec(&["GPT-4"], ScanSelection::Custom(vec![])),
            &registry(),
            only_zap,
        )
        .unwrap_err();
        assert_eq!(field_of(err), "scan_type");
    }
}
