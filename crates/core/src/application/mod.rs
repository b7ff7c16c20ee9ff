// Application Layer - Use Cases and Business Logic

pub mod billing;
pub mod calendar;
pub mod charge_task;
pub mod constants;
pub mod retry;
pub mod shutdown;

// Re-exports
pub use billing::{BillingScheduler, CycleDispatcher, CycleSummary, SchedulerState};
pub use charge_task::{BatchReport, ChargeOutcome, ChargeTask};
pub use retry::{RetryDecision, RetryPolicy};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
