//! JSON-RPC API Layer
//!
//! JSON-RPC 2.0 server exposing the invoice and customer stores and control
//! over the billing scheduler.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
