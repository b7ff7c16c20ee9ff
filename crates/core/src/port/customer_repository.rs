// Customer Repository Port (Interface)

use crate::domain::{Customer, CustomerId};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for the external customer store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Fetch a customer by ID
    ///
    /// # Errors
    /// - `AppError::NotFound` if the id is unknown
    async fn fetch(&self, id: CustomerId) -> Result<Customer>;

    /// All customers
    async fn fetch_all(&self) -> Result<Vec<Customer>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    /// In-memory customer store that counts lookups
    #[derive(Clone, Default)]
    pub struct InMemoryCustomerRepository {
        customers: Arc<Mutex<BTreeMap<CustomerId, Customer>>>,
        fetch_count: Arc<Mutex<usize>>,
    }

    impl InMemoryCustomerRepository {
        pub fn new(customers: impl IntoIterator<Item = Customer>) -> Self {
            let repo = Self::default();
            {
                let mut map = repo.customers.lock().unwrap();
                for customer in customers {
                    map.insert(customer.id, customer);
                }
            }
            repo
        }

        pub fn fetch_count(&self) -> usize {
            *self.fetch_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl CustomerRepository for InMemoryCustomerRepository {
        async fn fetch(&self, id: CustomerId) -> Result<Customer> {
            *self.fetch_count.lock().unwrap() += 1;
            self.customers
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("Customer {} not found", id)))
        }

        async fn fetch_all(&self) -> Result<Vec<Customer>> {
            Ok(self.customers.lock().unwrap().values().cloned().collect())
        }
    }
}
