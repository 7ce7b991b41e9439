//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes (ADR-020).

use fleetscan_core::domain::PortError;
use fleetscan_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;
use serde_json::json;

/// RPC Error Codes (ADR-020)
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const DB_ERROR: i32 = 5001;
    pub const SYSTEM_ERROR: i32 = 5002;
}

/// Convert AppError to JSON-RPC ErrorObject
///
/// Validation failures carry the offending field in `data.field`.
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    match err {
        AppError::Validation { field, message } => validation(&field, message),
        AppError::Port(e) => match e {
            PortError::InvalidModel(_) => validation("model", e.to_string()),
            PortError::InvalidAppNumber { .. } => validation("app_num", e.to_string()),
            PortError::RegistryTooLarge { .. } => {
                ErrorObjectOwned::owned(code::INTERNAL_ERROR, e.to_string(), None::<()>)
            }
        },
        AppError::Serialization(e) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, e.to_string(), None::<()>)
        }
        AppError::NotFound(msg) => ErrorObjectOwned::owned(code::NOT_FOUND, msg, None::<()>),
        AppError::InvalidState(msg) => ErrorObjectOwned::owned(code::CONFLICT, msg, None::<()>),
        AppError::Domain(e) => ErrorObjectOwned::owned(code::CONFLICT, e.to_string(), None::<()>),
        AppError::Database(msg) => ErrorObjectOwned::owned(code::DB_ERROR, msg, None::<()>),
        AppError::Io(e) => ErrorObjectOwned::owned(code::SYSTEM_ERROR, e.to_string(), None::<()>),
        AppError::Container(e) => {
            ErrorObjectOwned::owned(code::SYSTEM_ERROR, e.to_string(), Some(json!({"kind": e.kind()})))
        }
        AppError::Config(msg) => ErrorObjectOwned::owned(code::INTERNAL_ERROR, msg, None::<()>),
        AppError::Internal(msg) => ErrorObjectOwned::owned(code::INTERNAL_ERROR, msg, None::<()>),
    }
}

fn validation(field: &str, message: String) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code::VALIDATION_ERROR, message, Some(json!({ "field": field })))
}
