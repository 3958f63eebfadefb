//! Inbound frame parsing and subscriber fan-out.
//!
//! # Isolation
//!
//! A frame that fails to parse is counted and logged, then dropped. A handler
//! that returns an error or panics is counted and logged; the remaining
//! handlers still see the event, and the router keeps serving later frames.
//!
//! Dispatch is synchronous: every handler finishes with one event before the
//! next frame is parsed.

use std::panic::{AssertUnwindSafe, catch_unwind};

use parley_proto::InboundEvent;
use tracing::{debug, warn};

use crate::error::HandlerError;

/// Subscriber for decoded events.
pub trait EventHandler {
    /// Observe one event.
    fn handle(&mut self, event: &InboundEvent) -> Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: FnMut(&InboundEvent) -> Result<(), HandlerError>,
{
    fn handle(&mut self, event: &InboundEvent) -> Result<(), HandlerError> {
        self(event)
    }
}

/// Registration handle returned by [`MessageRouter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Events delivered to the handler list
    pub dispatched: u64,
    /// Frames dropped because they did not decode
    pub parse_failures: u64,
    /// Handler invocations that errored or panicked
    pub handler_failures: u64,
}

/// Ordered list of subscribers.
#[derive(Default)]
pub struct MessageRouter {
    handlers: Vec<(HandlerId, Box<dyn EventHandler + Send>)>,
    next_id: u64,
    stats: RouterStats,
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("handlers", &self.handlers.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl MessageRouter {
    /// Router with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Handlers run in registration order.
    pub fn subscribe(&mut self, handler: impl EventHandler + Send + 'static) -> HandlerId {
        self.subscribe_boxed(Box::new(handler))
    }

    /// Register an already boxed handler.
    pub fn subscribe_boxed(&mut self, handler: Box<dyn EventHandler + Send>) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, handler));
        id
    }

    /// Remove a handler. Returns false if `id` was not registered.
    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        self.handlers.len() != before
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Diagnostic counters.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Decode one raw frame. Failures are counted and logged, never returned.
    pub fn parse(&mut self, raw: &str) -> Option<InboundEvent> {
        match InboundEvent::decode(raw) {
            Ok(event) => Some(event),
            Err(error) => {
                self.stats.parse_failures += 1;
                warn!(%error, len = raw.len(), "dropping undecodable frame");
                None
            },
        }
    }

    /// Run every handler against `event`.
    pub fn dispatch(&mut self, event: &InboundEvent) {
        self.stats.dispatched += 1;
        debug!(event_type = event.type_tag(), handlers = self.handlers.len(), "dispatching");

        for (id, handler) in &mut self.handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
                Ok(Ok(())) => {},
                Ok(Err(error)) => {
                    self.stats.handler_failures += 1;
                    warn!(handler = ?id, event_type = event.type_tag(), %error, "handler failed");
                },
                Err(_) => {
                    self.stats.handler_failures += 1;
                    warn!(handler = ?id, event_type = event.type_tag(), "handler panicked");
                },
            }
        }
    }

    /// [`parse`](Self::parse) then [`dispatch`](Self::dispatch).
    pub fn route(&mut self, raw: &str) -> Option<InboundEvent> {
        let event = self.parse(raw)?;
        self.dispatch(&event);
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl EventHandler + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let handler = move |_: &InboundEvent| -> Result<(), HandlerError> {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        (count, handler)
    }

    #[test]
    fn every_handler_sees_every_event() {
        let mut router = MessageRouter::new();
        let (a, handler_a) = counter();
        let (b, handler_b) = counter();
        router.subscribe(handler_a);
        router.subscribe(handler_b);

        router.route(r#"{"type":"pong"}"#);
        router.route(r#"{"type":"user_online","user_id":1}"#);

        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);
        assert_eq!(router.stats().dispatched, 2);
    }

    #[test]
    fn malformed_frame_is_dropped() {
        let mut router = MessageRouter::new();
        let (count, handler) = counter();
        router.subscribe(handler);

        assert_eq!(router.route("not json"), None);
        assert_eq!(router.route(r#"{"no_type":true}"#), None);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(router.stats().parse_failures, 2);
        assert_eq!(router.stats().dispatched, 0);
    }

    #[test]
    fn failing_handler_is_isolated() {
        let mut router = MessageRouter::new();
        router.subscribe(|_: &InboundEvent| -> Result<(), HandlerError> {
            Err(HandlerError::new("boom"))
        });
        let (count, handler) = counter();
        router.subscribe(handler);

        router.route(r#"{"type":"pong"}"#);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(router.stats().handler_failures, 1);
    }

    #[test]
    #[allow(clippy::panic)]
    fn panicking_handler_is_isolated() {
        let mut router = MessageRouter::new();
        router.subscribe(|_: &InboundEvent| -> Result<(), HandlerError> { panic!("handler bug") });
        let (count, handler) = counter();
        router.subscribe(handler);

        router.route(r#"{"type":"pong"}"#);
        router.route(r#"{"type":"pong"}"#);

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(router.stats().handler_failures, 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut router = MessageRouter::new();
        let (count, handler) = counter();
        let id = router.subscribe(handler);

        assert!(router.unsubscribe(id));
        assert!(!router.unsubscribe(id));
        router.route(r#"{"type":"pong"}"#);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(router.handler_count(), 0);
    }
}
