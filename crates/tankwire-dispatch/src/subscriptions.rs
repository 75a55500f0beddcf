//! Opcode subscriptions for unsolicited server messages.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tankwire_protocol::Opcode;

use crate::{DecodedResponse, SubscriberError};

/// Receives every broadcast for the opcodes it is subscribed to.
///
/// Called on the connection's receive worker, so it must return quickly.
/// Closures of the right shape implement this automatically.
pub trait Subscriber<M>: Send + Sync {
    fn on_message(&self, message: &DecodedResponse<M>) -> Result<(), SubscriberError>;
}

impl<M, F> Subscriber<M> for F
where
    F: Fn(&DecodedResponse<M>) -> Result<(), SubscriberError> + Send + Sync,
{
    fn on_message(&self, message: &DecodedResponse<M>) -> Result<(), SubscriberError> {
        self(message)
    }
}

/// Subscriber lists per opcode, in subscription order.
pub(crate) struct SubscriptionRegistry<M> {
    by_opcode: Mutex<HashMap<Opcode, Vec<Arc<dyn Subscriber<M>>>>>,
}

impl<M> SubscriptionRegistry<M> {
    pub fn new() -> Self {
        Self {
            by_opcode: Mutex::new(HashMap::new()),
        }
    }

    /// Adds `subscriber`. Returns `false` if that same instance is
    /// already subscribed to `opcode`.
    pub fn subscribe(&self, opcode: Opcode, subscriber: Arc<dyn Subscriber<M>>) -> bool {
        let mut by_opcode = self.by_opcode.lock();
        let list = by_opcode.entry(opcode).or_default();
        if list.iter().any(|existing| same_instance(existing, &subscriber)) {
            return false;
        }
        list.push(subscriber);
        true
    }

    /// Removes `subscriber`. Returns whether it was subscribed.
    pub fn unsubscribe(&self, opcode: Opcode, subscriber: &Arc<dyn Subscriber<M>>) -> bool {
        let mut by_opcode = self.by_opcode.lock();
        let Some(list) = by_opcode.get_mut(&opcode) else {
            return false;
        };
        let before = list.len();
        list.retain(|existing| !same_instance(existing, subscriber));
        let removed = list.len() != before;
        if list.is_empty() {
            by_opcode.remove(&opcode);
        }
        removed
    }

    pub fn count(&self, opcode: Opcode) -> usize {
        self.by_opcode.lock().get(&opcode).map_or(0, Vec::len)
    }

    /// Delivers `message` to every subscriber of `opcode`.
    ///
    /// The list is copied out first, so subscribers may subscribe or
    /// unsubscribe from inside the callback. A subscriber that fails or
    /// panics is logged and skipped. Returns how many were invoked.
    pub fn publish(&self, opcode: Opcode, message: &DecodedResponse<M>) -> usize {
        let snapshot: Vec<_> = match self.by_opcode.lock().get(&opcode) {
            Some(list) => list.clone(),
            None => return 0,
        };

        for subscriber in &snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_message(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(%opcode, error = %e, "subscriber failed");
                }
                Err(_) => {
                    tracing::error!(%opcode, "subscriber panicked");
                }
            }
        }
        snapshot.len()
    }
}

/// Keeps one subscription alive; dropping it unsubscribes.
///
/// Returned by [`Dispatcher::subscribe_scoped`](crate::Dispatcher::subscribe_scoped).
/// Outliving the dispatcher is fine: the drop is then a no-op.
#[must_use = "dropping the handle unsubscribes immediately"]
pub struct SubscriptionHandle<M> {
    registry: Weak<SubscriptionRegistry<M>>,
    opcode: Opcode,
    subscriber: Arc<dyn Subscriber<M>>,
}

impl<M> SubscriptionHandle<M> {
    pub(crate) fn new(
        registry: &Arc<SubscriptionRegistry<M>>,
        opcode: Opcode,
        subscriber: Arc<dyn Subscriber<M>>,
    ) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            opcode,
            subscriber,
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }
}

impl<M> Drop for SubscriptionHandle<M> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.unsubscribe(self.opcode, &self.subscriber) {
                tracing::debug!(opcode = %self.opcode, "subscription dropped");
            }
        }
    }
}

/// Compares data pointers only; vtable pointers for the same type may differ
/// between codegen units.
fn same_instance<M>(a: &Arc<dyn Subscriber<M>>, b: &Arc<dyn Subscriber<M>>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
