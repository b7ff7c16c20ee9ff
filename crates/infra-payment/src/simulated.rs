// Simulated payment gateway
// Implements: PaymentProvider with configurable success, network failure and latency

use async_trait::async_trait;
use billrun_core::domain::Invoice;
use billrun_core::error::{AppError, Result};
use billrun_core::port::{CustomerRepository, PaymentError, PaymentProvider};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Tunables for the simulated gateway
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Probability that a valid charge goes through
    pub success_rate: f64,
    /// Probability that a call fails with a network error before charging
    pub network_failure_rate: f64,
    /// Artificial delay inside every call
    pub latency: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            success_rate: 0.5,
            network_failure_rate: 0.0,
            latency: Duration::ZERO,
        }
    }
}

impl SimulationConfig {
    /// Reject rates outside 0..=1
    pub fn validate(&self) -> Result<()> {
        for (name, rate) in [
            ("success_rate", self.success_rate),
            ("network_failure_rate", self.network_failure_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(AppError::Config(format!(
                    "{} must be between 0 and 1, got {}",
                    name, rate
                )));
            }
        }
        Ok(())
    }
}

/// Payment gateway that validates the invoice against the customer store and
/// then succeeds at random
pub struct SimulatedPaymentProvider {
    customers: Arc<dyn CustomerRepository>,
    config: SimulationConfig,
    rng: Mutex<StdRng>,
}

impl SimulatedPaymentProvider {
    pub fn new(customers: Arc<dyn CustomerRepository>, config: SimulationConfig) -> Result<Self> {
        Self::with_rng(customers, config, StdRng::from_entropy())
    }

    /// Deterministic outcomes for a given seed
    pub fn with_seed(
        customers: Arc<dyn CustomerRepository>,
        config: SimulationConfig,
        seed: u64,
    ) -> Result<Self> {
        Self::with_rng(customers, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        customers: Arc<dyn CustomerRepository>,
        config: SimulationConfig,
        rng: StdRng,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            customers,
            config,
            rng: Mutex::new(rng),
        })
    }

    /// (network failure, charge succeeds)
    fn roll(&self) -> (bool, bool) {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        (
            rng.gen_bool(self.config.network_failure_rate),
            rng.gen_bool(self.config.success_rate),
        )
    }
}

#[async_trait]
impl PaymentProvider for SimulatedPaymentProvider {
    async fn charge(&self, invoice: &Invoice) -> std::result::Result<bool, PaymentError> {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        let (network_failure, succeeds) = self.roll();
        if network_failure {
            return Err(PaymentError::Network(format!(
                "simulated gateway timeout charging invoice {}",
                invoice.id
            )));
        }

        let customer = match self.customers.fetch(invoice.customer_id).await {
            Ok(customer) => customer,
            Err(e) if e.is_not_found() => {
                return Err(PaymentError::CustomerNotFound(invoice.customer_id))
            }
            Err(e) => return Err(PaymentError::Network(e.to_string())),
        };

        if customer.currency != invoice.amount.currency {
            return Err(PaymentError::CurrencyMismatch {
                invoice_id: invoice.id,
                invoice_currency: invoice.amount.currency,
                customer_currency: customer.currency,
            });
        }

        debug!(
            invoice_id = %invoice.id,
            amount = %invoice.amount,
            charged = succeeds,
            "Simulated charge"
        );
        Ok(succeeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billrun_core::domain::{Currency, Customer, InvoiceStatus, Money};
    use billrun_core::port::customer_repository::mocks::InMemoryCustomerRepository;

    fn customers() -> Arc<dyn CustomerRepository> {
        Arc::new(InMemoryCustomerRepository::new([Customer::new(
            1,
            Currency::Dkk,
            "Europe/Copenhagen",
        )]))
    }

    fn invoice(customer_id: i64, currency: Currency) -> Invoice {
        Invoice::new(
            10,
            customer_id,
            Money::parse("125.00", currency).unwrap(),
            InvoiceStatus::Pending,
        )
    }

    fn config(success_rate: f64, network_failure_rate: f64) -> SimulationConfig {
        SimulationConfig {
            success_rate,
            network_failure_rate,
            latency: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_certain_success() {
        let provider = SimulatedPaymentProvider::new(customers(), config(1.0, 0.0)).unwrap();
        assert_eq!(provider.charge(&invoice(1, Currency::Dkk)).await, Ok(true));
    }

    #[tokio::test]
    async fn test_certain_decline() {
        let provider = SimulatedPaymentProvider::new(customers(), config(0.0, 0.0)).unwrap();
        assert_eq!(provider.charge(&invoice(1, Currency::Dkk)).await, Ok(false));
    }

    #[tokio::test]
    async fn test_unknown_customer() {
        let provider = SimulatedPaymentProvider::new(customers(), config(1.0, 0.0)).unwrap();
        assert_eq!(
            provider.charge(&invoice(2, Currency::Dkk)).await,
            Err(PaymentError::CustomerNotFound(2))
        );
    }

    #[tokio::test]
    async fn test_currency_mismatch() {
        let provider = SimulatedPaymentProvider::new(customers(), config(1.0, 0.0)).unwrap();
        let result = provider.charge(&invoice(1, Currency::Eur)).await;
        assert!(matches!(result, Err(PaymentError::CurrencyMismatch { .. })));
    }

    #[tokio::test]
    async fn test_network_failures_injected() {
        let provider = SimulatedPaymentProvider::new(customers(), config(1.0, 1.0)).unwrap();
        let result = provider.charge(&invoice(1, Currency::Dkk)).await;
        assert!(matches!(result, Err(PaymentError::Network(_))));
    }

    #[tokio::test]
    async fn test_same_seed_same_outcomes() {
        let outcomes = |seed| async move {
            let provider =
                SimulatedPaymentProvider::with_seed(customers(), config(0.5, 0.0), seed).unwrap();
            let mut results = Vec::new();
            for _ in 0..20 {
                results.push(provider.charge(&invoice(1, Currency::Dkk)).await);
            }
            results
        };

        assert_eq!(outcomes(7).await, outcomes(7).await);
    }

    #[test]
    fn test_rates_are_validated() {
        assert!(config(1.5, 0.0).validate().is_err());
        assert!(config(0.5, -0.1).validate().is_err());
        assert!(matches!(
            SimulatedPaymentProvider::new(customers(), config(0.5, 2.0)),
            Err(AppError::Config(_))
        ));
        assert!(SimulationConfig::default().validate().is_ok());
    }
}
