//! Admission check: one ready order per owner.

use common::OwnerId;
use domain::Order;
use store::{OrderStore, Result};

/// Outcome of the admission check.
#[derive(Debug, Clone)]
pub enum Admission {
    /// No ready order exists; a new one may be created.
    Fresh,
    /// A ready order from an earlier, interrupted checkout must be continued.
    Resume(Order),
}

/// Decides whether a checkout creates a new order or resumes a stalled one.
///
/// Must run under the owner's lock.
pub async fn admit(orders: &dyn OrderStore, owner: &OwnerId) -> Result<Admission> {
    Ok(match orders.find_ready_by_owner(owner).await? {
        Some(order) => Admission::Resume(order),
        None => Admission::Fresh,
    })
}
