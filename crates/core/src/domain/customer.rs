// Customer Domain Model

use super::invoice::Currency;
use serde::{Deserialize, Serialize};

/// Customer identifier (store-assigned)
pub type CustomerId = i64;

/// Customer as owned by the customer store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub currency: Currency,
    /// IANA timezone identifier, e.g. "Europe/Copenhagen"
    pub timezone: String,
}

impl Customer {
    pub fn new(id: CustomerId, currency: Currency, timezone: impl Into<String>) -> Self {
        Self {
            id,
            currency,
            timezone: timezone.into(),
        }
    }
}
