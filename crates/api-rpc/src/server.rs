//! JSON-RPC Server
//!
//! Serves JSON-RPC 2.0 over HTTP and WebSocket on a localhost TCP port.

use crate::handler::RpcHandler;
use crate::types::{GetCustomerRequest, GetInvoiceRequest, RestartRequest};
use billrun_core::error::{AppError, Result};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 7000;

/// RPC Server Configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: RpcHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Start the JSON-RPC server
    ///
    /// Returns the bound address (useful with port 0) and the handle that
    /// keeps the server running.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder().build(&addr).await.map_err(|e| {
            AppError::Internal(format!("Failed to build server on {}: {}", addr, e))
        })?;
        let local_addr = server
            .local_addr()
            .map_err(|e| AppError::Internal(format!("Failed to read bound address: {}", e)))?;

        let module = self.build_module()?;
        let handle = server.start(module);

        info!(addr = %local_addr, "JSON-RPC server started");
        Ok((local_addr, handle))
    }

    fn build_module(&self) -> Result<RpcModule<()>> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("health.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.health().await }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method("invoices.list.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.list_invoices().await }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method("invoices.get.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: GetInvoiceRequest = params.parse()?;
                    handler.get_invoice(req).await
                }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method("customers.list.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.list_customers().await }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method("customers.get.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: GetCustomerRequest = params.parse()?;
                    handler.get_customer(req).await
                }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method("billing.status.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.billing_status().await }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method("billing.restart.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: RestartRequest = params.parse()?;
                    handler.restart_billing(req).await
                }
            })
            .map_err(register_error)?;

        Ok(module)
    }
}

fn register_error(e: jsonrpsee::core::RegisterMethodError) -> AppError {
    AppError::Internal(format!("Failed to register RPC method: {}", e))
}
