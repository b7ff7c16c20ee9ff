//! Billrun - Main Entry Point
//! Monthly billing scheduler with JSON-RPC control surface

mod config;
mod logging;

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

// Import workspace crates
use billrun_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use billrun_core::application::{BillingScheduler, CycleDispatcher};
use billrun_core::port::{CustomerRepository, InvoiceRepository, SystemTimeProvider};
use billrun_infra_payment::SimulatedPaymentProvider;
use billrun_infra_sqlite::{
    create_pool, run_migrations, seed_demo_data, SqliteCustomerRepository,
    SqliteInvoiceRepository,
};
use config::{DaemonConfig, DEMO_CUSTOMERS, DEMO_INVOICES_PER_CUSTOMER};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration (.env is optional)
    let dotenv_loaded = dotenvy::dotenv().is_ok();
    let config = DaemonConfig::from_env()?;

    // 2. Initialize logging
    let _log_guard = logging::init_logging(config.log_format, config.log_dir.as_deref())?;

    info!(version = VERSION, dotenv = dotenv_loaded, "Billrun starting...");

    // 3. Initialize database
    info!(db_path = %config.db_path, "Initializing database...");
    let pool = create_pool(&config.db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    if config.seed_demo_data {
        seed_demo_data(&pool, DEMO_CUSTOMERS, DEMO_INVOICES_PER_CUSTOMER)
            .await
            .map_err(|e| anyhow::anyhow!("Seeding demo data failed: {}", e))?;
    }

    // 4. Setup dependencies (DI wiring)
    let invoice_repo: Arc<dyn InvoiceRepository> =
        Arc::new(SqliteInvoiceRepository::new(pool.clone()));
    let customer_repo: Arc<dyn CustomerRepository> =
        Arc::new(SqliteCustomerRepository::new(pool.clone()));
    let payment_provider = Arc::new(SimulatedPaymentProvider::new(
        customer_repo.clone(),
        config.payment.clone(),
    )?);

    let dispatcher = CycleDispatcher::new(
        invoice_repo.clone(),
        customer_repo.clone(),
        payment_provider,
        config.retry_policy.clone(),
    );
    let scheduler = Arc::new(BillingScheduler::new(dispatcher, Arc::new(SystemTimeProvider)));

    // 5. Arm the billing scheduler
    let summary = scheduler
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Billing scheduler start failed: {}", e))?;
    info!(
        anchor_ms = summary.anchor_millis,
        batches = summary.batches.len(),
        invoices = summary.scheduled_invoices(),
        "Billing scheduler armed"
    );

    // 6. Start JSON-RPC server
    let rpc_config = RpcServerConfig {
        host: config.rpc_host.clone(),
        port: config.rpc_port,
    };
    let handler = RpcHandler::new(invoice_repo, customer_repo, scheduler.clone());
    let (rpc_addr, rpc_handle) = RpcServer::new(rpc_config, handler)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(rpc_addr = %rpc_addr, "System ready. Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown
    if !scheduler.stop().await {
        warn!("Billing scheduler was already stopped");
    }
    if let Err(e) = rpc_handle.stop() {
        error!(error = %e, "RPC server stop failed");
    }
    rpc_handle.stopped().await;
    pool.close().await;

    info!("Shutdown complete.");
    Ok(())
}
