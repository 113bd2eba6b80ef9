//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 server for the Rowcast export daemon.

pub mod error;
pub mod handler;
pub mod registry;
pub mod server;
pub mod types;

pub use registry::ActiveExports;
pub use server::{RpcServer, RpcServerConfig};
