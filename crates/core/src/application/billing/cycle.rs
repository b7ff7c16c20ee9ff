// One billing pass: fetch, group, schedule

use super::partition::{partition_by_timezone, plan_batches, CustomerCache};
use crate::application::calendar::next_cycle_anchor;
use crate::application::charge_task::{BatchReport, ChargeTask};
use crate::application::retry::RetryPolicy;
use crate::application::shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
use crate::domain::InvoiceId;
use crate::error::{AppError, Result};
use crate::port::{CustomerRepository, InvoiceRepository, PaymentProvider};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub timezone: String,
    pub utc_offset_millis: i64,
    pub delay_millis: i64,
    pub invoice_ids: Vec<InvoiceId>,
}

/// What a pass scheduled, as seen at dispatch time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub now_millis: i64,
    pub anchor_millis: i64,
    pub batches: Vec<BatchSummary>,
    /// Invoices whose customer could not be found
    pub skipped: Vec<InvoiceId>,
}

impl CycleSummary {
    pub fn scheduled_invoices(&self) -> usize {
        self.batches.iter().map(|b| b.invoice_ids.len()).sum()
    }
}

/// A dispatched pass and the handles needed to cancel it
pub struct Cycle {
    summary: CycleSummary,
    cancel: ShutdownSender,
    slots: Arc<Semaphore>,
    handles: Vec<JoinHandle<BatchReport>>,
}

impl Cycle {
    pub fn summary(&self) -> &CycleSummary {
        &self.summary
    }

    /// Batches whose task has not completed yet
    pub fn pending_batches(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Cancel unfired batches and pending retry waits
    ///
    /// A payment call already in flight runs to completion; nothing new
    /// acquires a slot afterwards.
    pub fn cancel(self) {
        self.signal_cancel();
    }

    /// Cancel, then wait until in-flight payment calls have settled
    ///
    /// Once this returns, every invoice charged by the cycle has had its
    /// PAID update applied, so a fresh fetch no longer sees it as PENDING.
    pub async fn cancel_and_join(self) -> Vec<BatchReport> {
        self.signal_cancel();
        self.join().await
    }

    fn signal_cancel(&self) {
        info!(
            anchor_ms = self.summary.anchor_millis,
            pending_batches = self.pending_batches(),
            "Cancelling billing cycle"
        );
        self.cancel.shutdown();
        self.slots.close();
    }

    /// Wait for every batch of the cycle to finish
    pub async fn join(self) -> Vec<BatchReport> {
        let Cycle {
            cancel, handles, ..
        } = self;

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "Charge batch task failed"),
            }
        }

        // Keep timers alive until every batch has resolved
        drop(cancel);
        reports
    }
}

/// Runs one fetch-group-schedule pass against the configured ports
#[derive(Clone)]
pub struct CycleDispatcher {
    invoice_repo: Arc<dyn InvoiceRepository>,
    customer_repo: Arc<dyn CustomerRepository>,
    payment_provider: Arc<dyn PaymentProvider>,
    policy: RetryPolicy,
}

impl CycleDispatcher {
    pub fn new(
        invoice_repo: Arc<dyn InvoiceRepository>,
        customer_repo: Arc<dyn CustomerRepository>,
        payment_provider: Arc<dyn PaymentProvider>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            invoice_repo,
            customer_repo,
            payment_provider,
            policy,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Schedule every PENDING invoice for the cycle `now_millis` heads into
    ///
    /// # Errors
    /// - Repository errors other than a missing customer
    /// - `AppError::Scheduling` when called outside a tokio runtime
    pub async fn dispatch(&self, now_millis: i64) -> Result<Cycle> {
        let anchor_millis = next_cycle_anchor(now_millis)?;
        let pending = self.invoice_repo.fetch_pending().await?;

        let mut cache = CustomerCache::new(self.customer_repo.as_ref());
        let partition = partition_by_timezone(&pending, &mut cache).await?;
        let customers_loaded = cache.len();
        drop(cache);

        let skipped = partition.skipped;
        let plans = plan_batches(partition.groups, now_millis, anchor_millis)?;

        let runtime = Handle::try_current()
            .map_err(|e| AppError::Scheduling(format!("No runtime to schedule batches on: {}", e)))?;

        // One slot per timezone in this cycle
        let slots = Arc::new(Semaphore::new(plans.len()));
        let (cancel, token) = shutdown_channel();

        let mut batches = Vec::with_capacity(plans.len());
        let mut handles = Vec::with_capacity(plans.len());

        for plan in plans {
            let invoice_ids: Vec<InvoiceId> = plan.invoices.iter().map(|i| i.id).collect();
            info!(
                timezone = %plan.timezone,
                offset_ms = plan.utc_offset_millis,
                delay_ms = plan.delay_millis,
                invoices = invoice_ids.len(),
                "Scheduling charge batch"
            );

            let task = ChargeTask::new(
                plan.invoices,
                self.payment_provider.clone(),
                self.invoice_repo.clone(),
                self.policy.clone(),
                slots.clone(),
                token.clone(),
            );
            let delay = Duration::from_millis(u64::try_from(plan.delay_millis).unwrap_or(0));
            handles.push(runtime.spawn(run_batch(task, delay, plan.timezone, token.clone())));

            batches.push(BatchSummary {
                timezone: plan.timezone.name().to_string(),
                utc_offset_millis: plan.utc_offset_millis,
                delay_millis: plan.delay_millis,
                invoice_ids,
            });
        }

        let summary = CycleSummary {
            now_millis,
            anchor_millis,
            batches,
            skipped,
        };

        info!(
            now_ms = now_millis,
            anchor_ms = anchor_millis,
            batches = summary.batches.len(),
            invoices = summary.scheduled_invoices(),
            skipped = summary.skipped.len(),
            customers_loaded = customers_loaded,
            "Billing cycle dispatched"
        );

        Ok(Cycle {
            summary,
            cancel,
            slots,
            handles,
        })
    }
}

async fn run_batch(
    task: ChargeTask,
    delay: Duration,
    timezone: Tz,
    mut shutdown: ShutdownToken,
) -> BatchReport {
    tokio::select! {
        biased;
        _ = shutdown.wait() => {
            info!(timezone = %timezone, "Batch cancelled before firing");
            return BatchReport::cancelled(task.invoice_ids());
        }
        _ = sleep(delay) => {}
    }

    info!(timezone = %timezone, "Charge batch firing");
    task.execute().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::constants::HOUR_MILLIS;
    use crate::domain::{Currency, Customer, CustomerId, Invoice, InvoiceStatus, Money};
    use crate::port::customer_repository::mocks::InMemoryCustomerRepository;
    use crate::port::invoice_repository::mocks::InMemoryInvoiceRepository;
    use crate::port::payment_provider::mocks::ScriptedPaymentProvider;
    use std::collections::HashSet;

    // 2025-02-01 00:00 UTC
    const FEB_1: i64 = 1_738_368_000_000;

    const ZONES: [&str; 5] = [
        "Europe/Copenhagen",
        "America/New_York",
        "Asia/Tokyo",
        "Pacific/Kiritimati",
        "Pacific/Pago_Pago",
    ];

    fn invoice(id: i64, customer_id: CustomerId) -> Invoice {
        Invoice::new(
            id,
            customer_id,
            Money::parse("25.00", Currency::Usd).unwrap(),
            InvoiceStatus::Pending,
        )
    }

    struct Fixture {
        invoices: InMemoryInvoiceRepository,
        provider: Arc<ScriptedPaymentProvider>,
        dispatcher: CycleDispatcher,
    }

    fn fixture(invoice_count: i64, provider: ScriptedPaymentProvider) -> Fixture {
        let customers = InMemoryCustomerRepository::new(
            ZONES
                .iter()
                .enumerate()
                .map(|(i, tz)| Customer::new(i as CustomerId + 1, Currency::Usd, *tz)),
        );
        let invoices = InMemoryInvoiceRepository::new(
            (1..=invoice_count).map(|id| invoice(id, id % ZONES.len() as i64 + 1)),
        );
        let provider = Arc::new(provider);
        let dispatcher = CycleDispatcher::new(
            Arc::new(invoices.clone()),
            Arc::new(customers),
            provider.clone(),
            RetryPolicy::bounded(3, Duration::from_millis(10)),
        );
        Fixture {
            invoices,
            provider,
            dispatcher,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hundred_invoices_five_zones() {
        let f = fixture(100, ScriptedPaymentProvider::always_succeed());
        let now = FEB_1 - HOUR_MILLIS * 12;

        let cycle = f.dispatcher.dispatch(now).await.unwrap();
        let summary = cycle.summary().clone();

        assert_eq!(summary.anchor_millis, FEB_1);
        assert_eq!(summary.batches.len(), 5);
        assert_eq!(summary.scheduled_invoices(), 100);

        let mut seen = HashSet::new();
        for batch in &summary.batches {
            assert_eq!(batch.invoice_ids.len(), 20);
            for id in &batch.invoice_ids {
                assert!(seen.insert(*id), "invoice {} in two batches", id);
            }
        }

        let delay_of = |tz: &str| {
            summary
                .batches
                .iter()
                .find(|b| b.timezone == tz)
                .map(|b| b.delay_millis)
                .unwrap()
        };
        assert_eq!(delay_of("Europe/Copenhagen"), HOUR_MILLIS * 11);
        assert_eq!(delay_of("America/New_York"), HOUR_MILLIS * 17);
        assert_eq!(delay_of("Asia/Tokyo"), HOUR_MILLIS * 3);
        assert_eq!(delay_of("Pacific/Kiritimati"), 0);
        assert_eq!(delay_of("Pacific/Pago_Pago"), HOUR_MILLIS * 23);

        let reports = cycle.join().await;
        let paid: usize = reports.iter().map(|r| r.paid.len()).sum();
        assert_eq!(paid, 100);
        assert_eq!(f.provider.total_attempts(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_wait_for_local_midnight() {
        let f = fixture(10, ScriptedPaymentProvider::always_succeed());
        let cycle = f.dispatcher.dispatch(FEB_1 - HOUR_MILLIS * 12).await.unwrap();

        // Kiritimati (+14) fires at once; Tokyo (+9) needs three hours
        sleep(Duration::from_secs(60)).await;
        let kiritimati = f.invoices.status_of(3);
        let tokyo = f.invoices.status_of(2);

        assert_eq!(kiritimati, Some(InvoiceStatus::Paid));
        assert_eq!(tokyo, Some(InvoiceStatus::Pending));

        cycle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_unfired_batches() {
        let f = fixture(10, ScriptedPaymentProvider::always_succeed());
        let cycle = f.dispatcher.dispatch(FEB_1 - HOUR_MILLIS * 12).await.unwrap();

        sleep(Duration::from_secs(60)).await;
        cycle.cancel();
        sleep(Duration::from_secs(3600 * 48)).await;

        // Only the Kiritimati batch (invoices 3 and 8 map to customer 4) fired
        let paid: Vec<_> = f
            .invoices
            .update_calls()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(paid.len(), 2);
        assert_eq!(f.provider.total_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_join_waits_for_in_flight_charges() {
        let f = fixture(
            10,
            ScriptedPaymentProvider::always_succeed().with_latency(Duration::from_secs(5)),
        );
        let cycle = f.dispatcher.dispatch(FEB_1 - HOUR_MILLIS * 12).await.unwrap();

        // Kiritimati charges are mid-call
        sleep(Duration::from_secs(1)).await;
        assert_eq!(f.invoices.status_of(3), Some(InvoiceStatus::Pending));

        let reports = cycle.cancel_and_join().await;

        assert_eq!(f.invoices.status_of(3), Some(InvoiceStatus::Paid));
        assert_eq!(f.invoices.status_of(8), Some(InvoiceStatus::Paid));
        let paid: usize = reports.iter().map(|r| r.paid.len()).sum();
        let cancelled: usize = reports.iter().map(|r| r.cancelled.len()).sum();
        assert_eq!(paid, 2);
        assert_eq!(cancelled, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_customers_are_reported() {
        let f = fixture(5, ScriptedPaymentProvider::always_succeed());
        f.invoices.insert(invoice(99, 404));

        let cycle = f.dispatcher.dispatch(FEB_1 - HOUR_MILLIS).await.unwrap();

        assert_eq!(cycle.summary().skipped, vec![99]);
        assert_eq!(cycle.summary().scheduled_invoices(), 5);
        cycle.cancel();
    }

    #[tokio::test]
    async fn test_empty_store_schedules_nothing() {
        let f = fixture(0, ScriptedPaymentProvider::always_succeed());
        let cycle = f.dispatcher.dispatch(FEB_1).await.unwrap();

        assert!(cycle.summary().batches.is_empty());
        assert!(cycle.join().await.is_empty());
    }

    #[test]
    fn test_dispatch_outside_runtime_is_scheduling_error() {
        let f = fixture(3, ScriptedPaymentProvider::always_succeed());
        let result = futures::executor::block_on(f.dispatcher.dispatch(FEB_1));

        assert!(matches!(result, Err(AppError::Scheduling(_))));
    }
}
