//! PortAllocator - pure (model, app_num) -> ports/names derivation
//!
//! Layout: every (model, app) pair owns one slot of two consecutive ports.
//! `slot = model_index * MAX_APPS_PER_MODEL + (app_num - 1)`,
//! `backend = BASE_PORT + 2 * slot`, `frontend = backend + 1`.

use crate::domain::{AppInstance, ModelRegistry, PortError, PortPair};
use std::sync::Arc;

pub use crate::domain::MAX_APPS_PER_MODEL;

/// First port handed out
pub const BASE_PORT: u16 = 5001;

const PORTS_PER_APP: u32 = 2;

/// Largest registry that still fits below port 65535
pub const MAX_MODELS: usize =
    ((u16::MAX as u32 - BASE_PORT as u32 + 1) / (PORTS_PER_APP * MAX_APPS_PER_MODEL)) as usize;

pub struct PortAllocator {
    registry: Arc<ModelRegistry>,
}

impl PortAllocator {
    pub fn new(registry: Arc<ModelRegistry>) -> Result<Self, PortError> {
        if registry.len() > MAX_MODELS {
            return Err(PortError::RegistryTooLarge {
                models: registry.len(),
                max: MAX_MODELS,
            });
        }
        Ok(Self { registry })
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Port pair for a model index
    pub fn ports(&self, model_index: usize, app_num: u32) -> Result<PortPair, PortError> {
        if model_index >= self.registry.len() {
            return Err(PortError::InvalidModel(format!("index {}", model_index)));
        }
        if app_num == 0 || app_num > MAX_APPS_PER_MODEL {
            return Err(PortError::InvalidAppNumber {
                app_num,
                max: MAX_APPS_PER_MODEL,
            });
        }

        let slot = model_index as u32 * MAX_APPS_PER_MODEL + (app_num - 1);
        let backend = BASE_PORT as u32 + PORTS_PER_APP * slot;
        // Bounded by MAX_MODELS, checked in new()
        Ok(PortPair {
            backend_port: backend as u16,
            frontend_port: (backend + 1) as u16,
        })
    }

    /// Resolve ports and derived names by model name
    pub fn instance(&self, model: &str, app_num: u32) -> Result<AppInstance, PortError> {
        let model_index = self
            .registry
            .index_of(model)
            .ok_or_else(|| PortError::InvalidModel(model.to_string()))?;
        let ports = self.ports(model_index, app_num)?;
        let slug = slug(model);

        Ok(AppInstance {
            model: model.to_string(),
            model_index,
            app_num,
            ports,
            project_name: format!("{}-app{}-{}", slug, app_num, ports.backend_port),
            backend_container: format!("{}_app{}_backend_{}", slug, app_num, ports.backend_port),
            frontend_container: format!(
                "{}_app{}_frontend_{}",
                slug, app_num, ports.frontend_port
            ),
        })
    }
}

/// Lower-case, non-alphanumerics replaced by '-'
fn slug(model: &str) -> String {
    model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}
