//! Monthly Billing Scheduler
//!
//! Arms one billing cycle per calendar month. Each pass fetches PENDING
//! invoices, groups them by customer timezone and schedules one charge batch
//! per zone so every customer is charged right after their local midnight on
//! day 1.
//!
//! ```text
//! STOPPED ──start──▶ ARMED ──month boundary──▶ ARMED ...
//!    ▲                 │
//!    └──stop/restart───┘
//! ```
//!
//! At every month boundary the previous cycle is cancelled and its in-flight
//! charges are awaited before the new pass fetches, so no invoice is
//! scheduled by two cycles at once.

pub mod cycle;
pub mod partition;

pub use cycle::{BatchSummary, Cycle, CycleDispatcher, CycleSummary};
pub use partition::{partition_by_timezone, BatchPlan, CustomerCache, Partition, TimezoneGroup};

use crate::application::calendar::next_month_start;
use crate::application::shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
use crate::error::{AppError, Result};
use crate::port::{OffsetTimeProvider, TimeProvider};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulerState {
    Stopped,
    Armed,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Stopped => write!(f, "STOPPED"),
            SchedulerState::Armed => write!(f, "ARMED"),
        }
    }
}

type CycleSlot = Arc<Mutex<Option<Cycle>>>;

/// Live state of an armed scheduler
struct Armed {
    clock: Arc<dyn TimeProvider>,
    stop: ShutdownSender,
    trigger: JoinHandle<()>,
    current: CycleSlot,
}

impl Armed {
    async fn disarm(self) {
        self.stop.shutdown();
        if let Err(e) = self.trigger.await {
            error!(error = %e, "Month trigger task failed");
        }

        let cycle = self.current.lock().await.take();
        if let Some(cycle) = cycle {
            cycle.cancel_and_join().await;
        }
    }
}

pub struct BillingScheduler {
    dispatcher: CycleDispatcher,
    time_provider: Arc<dyn TimeProvider>,
    armed: Mutex<Option<Armed>>,
}

impl BillingScheduler {
    pub fn new(dispatcher: CycleDispatcher, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            dispatcher,
            time_provider,
            armed: Mutex::new(None),
        }
    }

    /// Run the first pass now and arm the month-boundary trigger
    ///
    /// # Errors
    /// - `AppError::InvalidState` if already armed
    /// - Any error that aborts the first pass; the scheduler stays STOPPED
    pub async fn start(&self) -> Result<CycleSummary> {
        let mut armed = self.armed.lock().await;
        if armed.is_some() {
            return Err(AppError::InvalidState(
                "Billing scheduler is already armed".to_string(),
            ));
        }

        let (state, summary) = arm(self.dispatcher.clone(), self.time_provider.clone()).await?;
        *armed = Some(state);
        Ok(summary)
    }

    /// Stop, then start again with a simulated clock
    ///
    /// The clock reads `simulated_now` immediately and then advances in real
    /// time. With `unbounded_retries` every charge is retried without delay
    /// until it succeeds; otherwise the configured policy applies.
    pub async fn restart_with_overrides(
        &self,
        simulated_now: i64,
        unbounded_retries: bool,
    ) -> Result<CycleSummary> {
        let mut armed = self.armed.lock().await;
        if let Some(state) = armed.take() {
            state.disarm().await;
        }

        let clock: Arc<dyn TimeProvider> = Arc::new(OffsetTimeProvider::starting_at(
            self.time_provider.clone(),
            simulated_now,
        ));
        let policy = if unbounded_retries {
            self.dispatcher.policy().unbounded_immediate()
        } else {
            self.dispatcher.policy().clone()
        };

        info!(
            simulated_now_ms = simulated_now,
            unbounded_retries = unbounded_retries,
            "Restarting billing scheduler"
        );

        let (state, summary) = arm(self.dispatcher.clone().with_policy(policy), clock).await?;
        *armed = Some(state);
        Ok(summary)
    }

    /// Cancel everything scheduled and wait for in-flight charges to settle.
    /// Returns false if already stopped.
    pub async fn stop(&self) -> bool {
        match self.armed.lock().await.take() {
            Some(state) => {
                state.disarm().await;
                info!("Billing scheduler stopped");
                true
            }
            None => false,
        }
    }

    pub async fn state(&self) -> SchedulerState {
        if self.armed.lock().await.is_some() {
            SchedulerState::Armed
        } else {
            SchedulerState::Stopped
        }
    }

    /// Current reading of the clock driving the scheduler
    ///
    /// After a restart this is the simulated clock.
    pub async fn now_millis(&self) -> i64 {
        match self.armed.lock().await.as_ref() {
            Some(state) => state.clock.now_millis(),
            None => self.time_provider.now_millis(),
        }
    }

    /// Summary of the cycle currently in effect, if any
    pub async fn current_cycle(&self) -> Option<CycleSummary> {
        let armed = self.armed.lock().await;
        let state = armed.as_ref()?;
        let cycle = state.current.lock().await;
        cycle.as_ref().map(|c| c.summary().clone())
    }
}

async fn arm(
    dispatcher: CycleDispatcher,
    clock: Arc<dyn TimeProvider>,
) -> Result<(Armed, CycleSummary)> {
    let now = clock.now_millis();
    let first_boundary = next_month_start(now)?;
    let cycle = dispatcher.dispatch(now).await?;
    let summary = cycle.summary().clone();

    let current: CycleSlot = Arc::new(Mutex::new(Some(cycle)));
    let (stop, token) = shutdown_channel();
    let trigger = tokio::spawn(month_trigger(
        dispatcher,
        clock.clone(),
        first_boundary,
        current.clone(),
        token,
    ));

    Ok((
        Armed {
            clock,
            stop,
            trigger,
            current,
        },
        summary,
    ))
}

/// Re-run the billing pass at 00:00 UTC on day 1 of every month
async fn month_trigger(
    dispatcher: CycleDispatcher,
    clock: Arc<dyn TimeProvider>,
    mut boundary: i64,
    current: CycleSlot,
    mut stop: ShutdownToken,
) {
    loop {
        let wait_ms = (boundary - clock.now_millis()).max(0);
        debug!(boundary_ms = boundary, wait_ms = wait_ms, "Waiting for month boundary");

        tokio::select! {
            biased;
            _ = stop.wait() => return,
            _ = sleep(Duration::from_millis(wait_ms as u64)) => {}
        }

        let previous = current.lock().await.take();
        if let Some(previous) = previous {
            previous.cancel_and_join().await;
        }
        if stop.is_shutdown() {
            return;
        }

        // Read the clock: a late wake-up must shorten batch delays
        let now = clock.now_millis().max(boundary);
        match dispatcher.dispatch(now).await {
            Ok(cycle) => {
                *current.lock().await = Some(cycle);
            }
            Err(e) => {
                error!(boundary_ms = boundary, now_ms = now, error = %e, "Billing pass failed");
            }
        }

        boundary = match next_month_start(boundary) {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "No further month boundary, trigger exits");
                return;
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::constants::HOUR_MILLIS;
    use crate::application::retry::RetryPolicy;
    use crate::domain::{Currency, Customer, Invoice, InvoiceStatus, Money};
    use crate::port::customer_repository::mocks::InMemoryCustomerRepository;
    use crate::port::invoice_repository::mocks::InMemoryInvoiceRepository;
    use crate::port::payment_provider::mocks::ScriptedPaymentProvider;
    use crate::port::time_provider::mocks::FixedTimeProvider;

    // 2025-02-01 00:00 UTC
    const FEB_1: i64 = 1_738_368_000_000;
    // 2025-03-01 00:00 UTC
    const MAR_1: i64 = 1_740_787_200_000;

    fn invoice(id: i64, customer_id: i64) -> Invoice {
        Invoice::new(
            id,
            customer_id,
            Money::parse("49.90", Currency::Eur).unwrap(),
            InvoiceStatus::Pending,
        )
    }

    struct Fixture {
        invoices: InMemoryInvoiceRepository,
        provider: Arc<ScriptedPaymentProvider>,
        clock: Arc<FixedTimeProvider>,
        scheduler: BillingScheduler,
    }

    /// Invoice 1 belongs to a Copenhagen customer, invoice 2 to New York
    fn fixture(now: i64, provider: ScriptedPaymentProvider) -> Fixture {
        let customers = InMemoryCustomerRepository::new([
            Customer::new(1, Currency::Eur, "Europe/Copenhagen"),
            Customer::new(2, Currency::Eur, "America/New_York"),
        ]);
        let invoices = InMemoryInvoiceRepository::new([invoice(1, 1), invoice(2, 2)]);
        let provider = Arc::new(provider);
        let dispatcher = CycleDispatcher::new(
            Arc::new(invoices.clone()),
            Arc::new(customers),
            provider.clone(),
            RetryPolicy::bounded(3, Duration::from_secs(1)),
        );
        let clock = Arc::new(FixedTimeProvider::new(now));
        let scheduler = BillingScheduler::new(dispatcher, clock.clone());

        Fixture {
            invoices,
            provider,
            clock,
            scheduler,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_arms_and_charges_at_local_midnight() {
        let f = fixture(FEB_1 - HOUR_MILLIS * 12, ScriptedPaymentProvider::always_succeed());

        let summary = f.scheduler.start().await.unwrap();
        assert_eq!(summary.anchor_millis, FEB_1);
        assert_eq!(summary.batches.len(), 2);
        assert_eq!(f.scheduler.state().await, SchedulerState::Armed);

        sleep(Duration::from_millis((HOUR_MILLIS * 11 + 60_000) as u64)).await;
        assert_eq!(f.invoices.status_of(1), Some(InvoiceStatus::Paid));
        assert_eq!(f.invoices.status_of(2), Some(InvoiceStatus::Pending));

        // New York is handed over to the cycle armed at the boundary
        sleep(Duration::from_millis((HOUR_MILLIS * 6) as u64)).await;
        assert_eq!(f.invoices.status_of(2), Some(InvoiceStatus::Paid));
        assert_eq!(f.provider.total_attempts(), 2);

        let current = f.scheduler.current_cycle().await.unwrap();
        assert_eq!(current.now_millis, FEB_1);
        assert_eq!(current.anchor_millis, FEB_1);

        assert!(f.scheduler.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let f = fixture(FEB_1 - HOUR_MILLIS, ScriptedPaymentProvider::always_succeed());

        f.scheduler.start().await.unwrap();
        let second = f.scheduler.start().await;

        assert!(matches!(second, Err(AppError::InvalidState(_))));
        f.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_and_is_idempotent() {
        let f = fixture(FEB_1 - HOUR_MILLIS * 12, ScriptedPaymentProvider::always_succeed());
        f.scheduler.start().await.unwrap();

        assert!(f.scheduler.stop().await);
        assert!(!f.scheduler.stop().await);
        assert_eq!(f.scheduler.state().await, SchedulerState::Stopped);
        assert!(f.scheduler.current_cycle().await.is_none());

        sleep(Duration::from_millis((HOUR_MILLIS * 48) as u64)).await;
        assert_eq!(f.provider.total_attempts(), 0);
        assert_eq!(f.invoices.status_of(1), Some(InvoiceStatus::Pending));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let f = fixture(FEB_1, ScriptedPaymentProvider::always_succeed());

        assert!(!f.scheduler.stop().await);
        assert_eq!(f.scheduler.state().await, SchedulerState::Stopped);
        assert_eq!(f.scheduler.now_millis().await, FEB_1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_with_unbounded_retries_pays_everything() {
        let f = fixture(FEB_1 - HOUR_MILLIS * 12, ScriptedPaymentProvider::failing_times(7));
        f.scheduler.start().await.unwrap();

        // Day 1, 05:00 UTC: both zones are already past local midnight
        let summary = f
            .scheduler
            .restart_with_overrides(FEB_1 + HOUR_MILLIS * 5, true)
            .await
            .unwrap();
        assert_eq!(summary.anchor_millis, FEB_1);
        assert!(summary.batches.iter().all(|b| b.delay_millis == 0));
        assert_eq!(f.scheduler.now_millis().await, FEB_1 + HOUR_MILLIS * 5);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(f.invoices.status_of(1), Some(InvoiceStatus::Paid));
        assert_eq!(f.invoices.status_of(2), Some(InvoiceStatus::Paid));
        assert_eq!(f.provider.attempts_for(1), 8);

        f.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_without_override_keeps_bounded_policy() {
        let f = fixture(0, ScriptedPaymentProvider::failing_times(7));

        f.scheduler
            .restart_with_overrides(FEB_1 + HOUR_MILLIS * 5, false)
            .await
            .unwrap();
        sleep(Duration::from_secs(10)).await;

        assert_eq!(f.provider.attempts_for(1), 3);
        assert_eq!(f.invoices.status_of(1), Some(InvoiceStatus::Pending));
        f.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_month_boundary_picks_up_new_invoices() {
        let f = fixture(FEB_1 + HOUR_MILLIS * 12, ScriptedPaymentProvider::always_succeed());

        // Mid-day on day 1 heads into March
        let summary = f.scheduler.start().await.unwrap();
        assert_eq!(summary.anchor_millis, MAR_1);

        f.invoices.insert(invoice(3, 1));
        let until_march = MAR_1 - (FEB_1 + HOUR_MILLIS * 12);
        sleep(Duration::from_millis((until_march + HOUR_MILLIS * 6) as u64)).await;

        let current = f.scheduler.current_cycle().await.unwrap();
        assert_eq!(current.now_millis, MAR_1);
        // Invoice 1 was paid by the February cycle
        assert_eq!(current.scheduled_invoices(), 2);
        assert_eq!(f.invoices.status_of(2), Some(InvoiceStatus::Paid));
        assert_eq!(f.invoices.status_of(3), Some(InvoiceStatus::Paid));
        assert_eq!(f.provider.attempts_for(1), 1);

        f.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_boundary_waits_for_in_flight_charge() {
        let invoices = InMemoryInvoiceRepository::new([invoice(1, 1)]);
        let customers =
            InMemoryCustomerRepository::new([Customer::new(1, Currency::Eur, "Pacific/Kiritimati")]);
        let provider = Arc::new(
            ScriptedPaymentProvider::always_succeed().with_latency(Duration::from_secs(5)),
        );
        let dispatcher = CycleDispatcher::new(
            Arc::new(invoices.clone()),
            Arc::new(customers),
            provider.clone(),
            RetryPolicy::bounded(3, Duration::from_secs(1)),
        );
        let scheduler =
            BillingScheduler::new(dispatcher, Arc::new(FixedTimeProvider::new(FEB_1 - 1000)));

        // Kiritimati is already past midnight; its charge spans the boundary
        scheduler.start().await.unwrap();
        sleep(Duration::from_secs(60)).await;

        assert_eq!(provider.attempts_for(1), 1);
        assert_eq!(invoices.status_of(1), Some(InvoiceStatus::Paid));
        let current = scheduler.current_cycle().await.unwrap();
        assert_eq!(current.now_millis, FEB_1);
        assert_eq!(current.scheduled_invoices(), 0);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_trigger_uses_clock_reading() {
        let f = fixture(FEB_1 - HOUR_MILLIS, ScriptedPaymentProvider::always_succeed());
        f.scheduler.start().await.unwrap();

        // The host slept through the boundary
        f.clock.set(FEB_1 + HOUR_MILLIS * 3);
        sleep(Duration::from_millis((HOUR_MILLIS + HOUR_MILLIS / 2) as u64)).await;

        let current = f.scheduler.current_cycle().await.unwrap();
        assert_eq!(current.now_millis, FEB_1 + HOUR_MILLIS * 3);
        assert_eq!(current.anchor_millis, FEB_1);
        let new_york = current
            .batches
            .iter()
            .find(|b| b.timezone == "America/New_York")
            .unwrap();
        assert_eq!(new_york.delay_millis, HOUR_MILLIS * 2);

        f.scheduler.stop().await;
    }
}
