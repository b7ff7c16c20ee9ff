// Invoice Repository Port (Interface)

use crate::domain::{Invoice, InvoiceId, InvoiceStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for the external invoice store
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// All invoices currently in PENDING
    async fn fetch_pending(&self) -> Result<Vec<Invoice>>;

    /// All invoices regardless of status
    async fn fetch_all(&self) -> Result<Vec<Invoice>>;

    /// Find invoice by ID
    async fn find_by_id(&self, id: InvoiceId) -> Result<Option<Invoice>>;

    /// Transition an invoice to `status`
    ///
    /// Returns the authoritative post-update record.
    ///
    /// # Errors
    /// - `AppError::NotFound` if the id is unknown
    async fn update_status(&self, id: InvoiceId, status: InvoiceStatus) -> Result<Invoice>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    /// In-memory invoice store
    #[derive(Clone, Default)]
    pub struct InMemoryInvoiceRepository {
        invoices: Arc<Mutex<BTreeMap<InvoiceId, Invoice>>>,
        update_calls: Arc<Mutex<Vec<(InvoiceId, InvoiceStatus)>>>,
        fail_updates: Arc<Mutex<bool>>,
    }

    impl InMemoryInvoiceRepository {
        pub fn new(invoices: impl IntoIterator<Item = Invoice>) -> Self {
            let repo = Self::default();
            {
                let mut map = repo.invoices.lock().unwrap();
                for invoice in invoices {
                    map.insert(invoice.id, invoice);
                }
            }
            repo
        }

        pub fn insert(&self, invoice: Invoice) {
            self.invoices.lock().unwrap().insert(invoice.id, invoice);
        }

        pub fn status_of(&self, id: InvoiceId) -> Option<InvoiceStatus> {
            self.invoices.lock().unwrap().get(&id).map(|i| i.status)
        }

        pub fn update_calls(&self) -> Vec<(InvoiceId, InvoiceStatus)> {
            self.update_calls.lock().unwrap().clone()
        }

        /// Make every subsequent `update_status` fail with a database error
        pub fn fail_updates(&self, fail: bool) {
            *self.fail_updates.lock().unwrap() = fail;
        }
    }

    #[async_trait]
    impl InvoiceRepository for InMemoryInvoiceRepository {
        async fn fetch_pending(&self) -> Result<Vec<Invoice>> {
            Ok(self
                .invoices
                .lock()
                .unwrap()
                .values()
                .filter(|i| i.is_pending())
                .cloned()
                .collect())
        }

        async fn fetch_all(&self) -> Result<Vec<Invoice>> {
            Ok(self.invoices.lock().unwrap().values().cloned().collect())
        }

        async fn find_by_id(&self, id: InvoiceId) -> Result<Option<Invoice>> {
            Ok(self.invoices.lock().unwrap().get(&id).cloned())
        }

        async fn update_status(&self, id: InvoiceId, status: InvoiceStatus) -> Result<Invoice> {
            self.update_calls.lock().unwrap().push((id, status));
            if *self.fail_updates.lock().unwrap() {
                return Err(AppError::Database("invoice store unavailable".to_string()));
            }

            let mut map = self.invoices.lock().unwrap();
            let invoice = map
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("Invoice {} not found", id)))?;
            invoice.status = status;
            Ok(invoice.clone())
        }
    }
}
