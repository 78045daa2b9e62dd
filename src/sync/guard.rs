//! In-process idempotency guard for remote mutations.
//!
//! A concurrent key set over `(shop_domain, remote_order_id)`. A held key
//! means a fulfillment attempt for that pair is in flight; callers treat a
//! failed acquisition as "skip, in progress", never as a failure. Release is
//! RAII: the permit removes its key on drop, on every exit path.

use dashmap::DashSet;
use std::sync::Arc;

use crate::util::normalize_domain;

#[derive(Clone, Default)]
pub struct SyncGuard {
    held: Arc<DashSet<(String, String)>>,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-and-insert. Returns `None` when the key is already held.
    pub fn acquire(&self, shop_domain: &str, remote_order_id: &str) -> Option<GuardPermit> {
        let key = (normalize_domain(shop_domain), remote_order_id.to_string());
        if self.held.insert(key.clone()) {
            Some(GuardPermit {
                held: self.held.clone(),
                key,
            })
        } else {
            None
        }
    }

    /// Whether a fulfillment attempt is currently in flight for this pair
    pub fn is_held(&self, shop_domain: &str, remote_order_id: &str) -> bool {
        self.held
            .contains(&(normalize_domain(shop_domain), remote_order_id.to_string()))
    }
}

/// Scoped acquisition; dropping the permit releases the key.
pub struct GuardPermit {
    held: Arc<DashSet<(String, String)>>,
    key: (String, String),
}

impl Drop for GuardPermit {
    fn drop(&mut self) {
        self.held.remove(&self.key);
    }
}
