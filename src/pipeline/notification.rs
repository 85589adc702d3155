//! Domain event fan-out.
//!
//! Unlike requests, an event may have any number of handlers, including
//! none. Delivery is in-process and best effort: a failing handler is logged
//! and does not stop the others.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::AppResult;

// == Event ==
pub trait Event: Clone + Send + Sync + 'static {
    const NAME: &'static str;
}

// == Notification Handler ==
#[async_trait]
pub trait NotificationHandler<E: Event>: Send + Sync + 'static {
    async fn handle(&self, event: E) -> AppResult<()>;
}

// == Event Bus ==
/// Registry of notification handlers keyed by event type.
///
/// Clones share the same registry, so the bus can be handed to collaborators
/// before every subscriber is known.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<HashMap<TypeId, Vec<Box<dyn Any + Send + Sync>>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler for events of type `E`.
    pub fn subscribe<E, H>(&self, handler: H)
    where
        E: Event,
        H: NotificationHandler<E>,
    {
        let handler: Arc<dyn NotificationHandler<E>> = Arc::new(handler);
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Box::new(handler));
    }

    /// Number of handlers subscribed to `E`.
    pub fn subscribers<E: Event>(&self) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(&TypeId::of::<E>()).map_or(0, Vec::len)
    }

    // == Publish ==
    /// Delivers `event` to every subscriber in subscription order.
    ///
    /// Returns the number of handlers that completed successfully.
    pub async fn publish<E: Event>(&self, event: E) -> usize {
        let targets: Vec<Arc<dyn NotificationHandler<E>>> = {
            let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            handlers
                .get(&TypeId::of::<E>())
                .map(|list| {
                    list.iter()
                        .filter_map(|h| h.downcast_ref::<Arc<dyn NotificationHandler<E>>>())
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        if targets.is_empty() {
            debug!(event = E::NAME, "No subscribers for event");
            return 0;
        }

        let mut delivered = 0;
        for handler in targets {
            match handler.handle(event.clone()).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(event = E::NAME, code = %err.code, error = %err.message, "Event handler failed")
                }
            }
        }
        debug!(event = E::NAME, delivered, "Event published");
        delivered
    }
}
