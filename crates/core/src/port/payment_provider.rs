// Payment Provider Port
// Abstraction over the external payment gateway

use crate::domain::{Currency, CustomerId, Invoice, InvoiceId};
use async_trait::async_trait;
use thiserror::Error;

/// Payment gateway errors
///
/// The billing core treats every variant the same way as a declined charge:
/// the attempt failed and the retry policy decides what happens next.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Customer {0} not found by payment gateway")]
    CustomerNotFound(CustomerId),

    #[error("Currency mismatch on invoice {invoice_id}: invoice in {invoice_currency}, customer pays in {customer_currency}")]
    CurrencyMismatch {
        invoice_id: InvoiceId,
        invoice_currency: Currency,
        customer_currency: Currency,
    },

    #[error("Network error: {0}")]
    Network(String),
}

/// Payment Provider trait
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Charge the customer's account the amount on the invoice
    ///
    /// Returns `Ok(true)` when the account was charged and `Ok(false)` when
    /// the charge was declined (e.g. insufficient balance).
    ///
    /// No idempotency key is sent: calling this twice for the same invoice
    /// charges twice.
    async fn charge(&self, invoice: &Invoice) -> Result<bool, PaymentError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Mock provider behavior for a failed attempt
    #[derive(Debug, Clone)]
    pub enum FailureMode {
        /// Return Ok(false)
        Decline,
        /// Return Err(Network)
        NetworkError,
    }

    /// Payment provider that fails the first `failures` attempts of every
    /// invoice, then succeeds
    pub struct ScriptedPaymentProvider {
        failures: Option<u32>,
        mode: FailureMode,
        latency: Duration,
        attempts: Arc<Mutex<HashMap<InvoiceId, u32>>>,
    }

    impl ScriptedPaymentProvider {
        pub fn failing_times(failures: u32) -> Self {
            Self {
                failures: Some(failures),
                mode: FailureMode::Decline,
                latency: Duration::ZERO,
                attempts: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        pub fn always_succeed() -> Self {
            Self::failing_times(0)
        }

        pub fn always_fail() -> Self {
            Self {
                failures: None,
                ..Self::failing_times(0)
            }
        }

        pub fn with_mode(mut self, mode: FailureMode) -> Self {
            self.mode = mode;
            self
        }

        /// Sleep this long inside every charge call
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        pub fn attempts_for(&self, id: InvoiceId) -> u32 {
            self.attempts.lock().unwrap().get(&id).copied().unwrap_or(0)
        }

        pub fn total_attempts(&self) -> u32 {
            self.attempts.lock().unwrap().values().sum()
        }
    }

    #[async_trait]
    impl PaymentProvider for ScriptedPaymentProvider {
        async fn charge(&self, invoice: &Invoice) -> Result<bool, PaymentError> {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let count = attempts.entry(invoice.id).or_insert(0);
                *count += 1;
                *count
            };

            let succeeds = match self.failures {
                Some(failures) => attempt > failures,
                None => false,
            };

            if succeeds {
                return Ok(true);
            }
            match self.mode {
                FailureMode::Decline => Ok(false),
                FailureMode::NetworkError => {
                    Err(PaymentError::Network("connection reset".to_string()))
                }
            }
        }
    }
}
