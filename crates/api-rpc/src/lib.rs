//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 job control surface for Fleetscan.
//! Adheres to ADR-020 (API Contract).

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{build_module, RpcServer, RpcServerConfig};
