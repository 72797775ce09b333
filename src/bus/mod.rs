//! Message bus - fans decoded frames out to application handlers
//!
//! Handlers are keyed by message id. Dispatch is expected to happen
//! from the caller's event-consumer loop, so handlers inherit the
//! single-delivery-context guarantee of the connection event channel.

use std::collections::HashMap;

use tokio::sync::Mutex;

/// A registered message handler. Receives the raw frame body; any
/// application-level decoding happens inside the handler.
pub type MessageHandler = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Per-message-id handler registry
pub struct MessageBus {
    handlers: Mutex<HashMap<i32, Vec<MessageHandler>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a handler for a message id. Multiple handlers per id
    /// are invoked in registration order.
    pub async fn register<F>(&self, id: i32, handler: F)
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .await
            .entry(id)
            .or_default()
            .push(Box::new(handler));
    }

    /// Drop every handler registered for a message id
    pub async fn unregister(&self, id: i32) {
        self.handlers.lock().await.remove(&id);
    }

    /// Invoke every handler registered for `id` with the frame body.
    /// Returns the number of handlers invoked; a message nobody
    /// subscribed to is not an error.
    pub async fn dispatch(&self, id: i32, body: &[u8]) -> usize {
        let handlers = self.handlers.lock().await;
        match handlers.get(&id) {
            Some(list) => {
                for handler in list {
                    handler(body);
                }
                list.len()
            }
            None => {
                tracing::debug!("no handler registered for message {}", id);
                0
            }
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_register_and_dispatch() {
        let bus = MessageBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        bus.register(7, move |body| {
            assert_eq!(body, &[1, 2, 3]);
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(bus.dispatch(7, &[1, 2, 3]).await, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_without_handler() {
        let bus = MessageBus::new();
        assert_eq!(bus.dispatch(99, &[]).await, 0);
    }

    #[tokio::test]
    async fn test_multiple_handlers_in_order() {
        let bus = MessageBus::new();
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let calls = calls.clone();
            bus.register(1, move |_| calls.lock().unwrap().push(tag))
                .await;
        }

        assert_eq!(bus.dispatch(1, &[]).await, 2);
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_unregister() {
        let bus = MessageBus::new();
        bus.register(5, |_| {}).await;
        assert_eq!(bus.dispatch(5, &[]).await, 1);

        bus.unregister(5).await;
        assert_eq!(bus.dispatch(5, &[]).await, 0);
    }
}
