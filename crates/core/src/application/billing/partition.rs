// Timezone partitioning for one scheduling pass

use crate::application::calendar::{execution_delay, resolve_timezone, utc_offset_millis};
use crate::domain::{Customer, CustomerId, Invoice, InvoiceId};
use crate::error::{AppError, Result};
use crate::port::CustomerRepository;
use chrono_tz::Tz;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Read-through customer lookup scoped to a single scheduling pass
///
/// Built empty at the start of a pass and dropped with it, so every cycle
/// sees fresh customer data.
pub struct CustomerCache<'a> {
    repo: &'a dyn CustomerRepository,
    customers: HashMap<CustomerId, Customer>,
}

impl<'a> CustomerCache<'a> {
    pub fn new(repo: &'a dyn CustomerRepository) -> Self {
        Self {
            repo,
            customers: HashMap::new(),
        }
    }

    /// Cached customer, fetching from the store on first miss
    pub async fn get(&mut self, id: CustomerId) -> Result<Customer> {
        if let Some(customer) = self.customers.get(&id) {
            debug!(customer_id = %id, "Customer cache hit");
            return Ok(customer.clone());
        }

        let customer = self.repo.fetch(id).await?;
        self.customers.insert(id, customer.clone());
        Ok(customer)
    }

    pub fn len(&self) -> usize {
        self.customers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }
}

/// Invoices of one pass whose customers share a timezone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneGroup {
    pub timezone: Tz,
    pub invoices: Vec<Invoice>,
}

/// Result of grouping a pending-invoice list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Keyed by IANA timezone name
    pub groups: BTreeMap<String, TimezoneGroup>,
    /// Invoices left out because their customer could not be found
    pub skipped: Vec<InvoiceId>,
}

impl Partition {
    pub fn invoice_count(&self) -> usize {
        self.groups.values().map(|g| g.invoices.len()).sum()
    }
}

/// Group pending invoices by their customer's timezone
///
/// Invoices that are not PENDING or appear twice are dropped, so no invoice
/// can land in two batches. A customer that cannot be found only skips its
/// invoices; any other store failure aborts the pass.
///
/// An unknown timezone id falls back to UTC.
pub async fn partition_by_timezone(
    invoices: &[Invoice],
    cache: &mut CustomerCache<'_>,
) -> Result<Partition> {
    let mut partition = Partition::default();
    let mut seen = HashSet::new();

    for invoice in invoices {
        if !invoice.is_pending() {
            debug!(invoice_id = %invoice.id, status = %invoice.status, "Ignoring non-pending invoice");
            continue;
        }
        if !seen.insert(invoice.id) {
            warn!(invoice_id = %invoice.id, "Duplicate invoice in pending list");
            continue;
        }

        let customer = match cache.get(invoice.customer_id).await {
            Ok(customer) => customer,
            Err(AppError::NotFound(reason)) => {
                warn!(
                    invoice_id = %invoice.id,
                    customer_id = %invoice.customer_id,
                    reason = %reason,
                    "Skipping invoice: customer not found"
                );
                partition.skipped.push(invoice.id);
                continue;
            }
            Err(e) => return Err(e),
        };

        let timezone = resolve_timezone(&customer.timezone).unwrap_or_else(|| {
            warn!(
                customer_id = %customer.id,
                timezone = %customer.timezone,
                "Unknown timezone, billing in UTC"
            );
            Tz::UTC
        });

        partition
            .groups
            .entry(timezone.name().to_string())
            .or_insert_with(|| TimezoneGroup {
                timezone,
                invoices: Vec::new(),
            })
            .invoices
            .push(invoice.clone());
    }

    Ok(partition)
}

/// A timezone group with its computed firing time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub timezone: Tz,
    pub utc_offset_millis: i64,
    pub delay_millis: i64,
    pub invoices: Vec<Invoice>,
}

/// Compute each group's delay from its zone's offset at the anchor
pub fn plan_batches(
    groups: BTreeMap<String, TimezoneGroup>,
    now_millis: i64,
    anchor_millis: i64,
) -> Result<Vec<BatchPlan>> {
    groups
        .into_values()
        .map(|group| {
            let offset = utc_offset_millis(&group.timezone, anchor_millis)?;
            Ok(BatchPlan {
                timezone: group.timezone,
                utc_offset_millis: offset,
                delay_millis: execution_delay(offset, now_millis, anchor_millis),
                invoices: group.invoices,
            })
        })
        .collect()
}
