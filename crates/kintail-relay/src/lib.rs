//! Request/response correlation for Kintail Local relay channels.
//!
//! The worker relays each intercepted fetch to the owning page over a
//! dedicated, transient message channel and waits for exactly one reply.
//! This crate makes that contract explicit: a [`RelayTable`] hands out a
//! correlation id plus an awaitable [`RelayTicket`] per relayed request, and
//! whoever receives the reply settles the entry by id.
//!
//! The table is deliberately free of any browser types so the relay protocol
//! can be exercised on the host without a live message bus: tickets are plain
//! futures, settlement is a method call.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

/// Identifier pairing one relayed request with its single reply.
pub type CorrelationId = u32;

// =============================================================================
// Relay errors
// =============================================================================

/// Errors that can occur during a relay round trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayError {
    /// The client that issued the fetch is no longer addressable
    ClientNotFound,
    /// The reply channel was discarded before a reply arrived
    ChannelClosed,
    /// A reply arrived but did not decode as a relay response
    MalformedReply(String),
    /// The underlying read or post failed
    Transport(String),
}

impl RelayError {
    /// Convert to a user-facing error message.
    pub fn message(&self) -> &str {
        match self {
            RelayError::ClientNotFound => "Client not found",
            RelayError::ChannelClosed => "Relay channel closed before a reply arrived",
            RelayError::MalformedReply(detail) => detail,
            RelayError::Transport(detail) => detail,
        }
    }
}

// =============================================================================
// Pending-request table
// =============================================================================

enum Slot<T> {
    /// Waiting for the reply; holds the waker of the awaiting ticket
    Pending(Option<Waker>),
    /// Reply (or failure) arrived before the ticket was polled again
    Settled(Result<T, RelayError>),
}

struct Inner<T> {
    /// Next correlation id (monotonically increasing, never reused)
    next_id: AtomicU32,
    /// Pending relays: correlation id -> slot
    pending: Mutex<HashMap<CorrelationId, Slot<T>>>,
}

/// Pending-request table keyed by correlation id.
///
/// Each relayed request registers exactly one entry; the entry is removed
/// when the ticket resolves or is dropped. Settling an id that is unknown or
/// already settled returns `false` so callers can log the stray reply.
pub struct RelayTable<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RelayTable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for RelayTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RelayTable<T> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU32::new(1),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a new pending relay.
    ///
    /// Returns the correlation id to hand to the reply side and the ticket
    /// that resolves when the entry is settled.
    pub fn register(&self) -> (CorrelationId, RelayTicket<T>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.insert(id, Slot::Pending(None));
        }
        (
            id,
            RelayTicket {
                id,
                inner: self.inner.clone(),
            },
        )
    }

    /// Deliver the reply for a pending relay.
    ///
    /// Returns `false` if the id is unknown or already settled (exactly one
    /// reply per relay; callers log and drop the extra one).
    pub fn resolve(&self, id: CorrelationId, value: T) -> bool {
        self.settle(id, Ok(value))
    }

    /// Fail a pending relay.
    pub fn reject(&self, id: CorrelationId, error: RelayError) -> bool {
        self.settle(id, Err(error))
    }

    /// Number of relays still awaiting their reply.
    pub fn pending_count(&self) -> usize {
        self.inner
            .pending
            .lock()
            .map(|pending| pending.len())
            .unwrap_or(0)
    }

    fn settle(&self, id: CorrelationId, result: Result<T, RelayError>) -> bool {
        let waker = {
            let mut pending = match self.inner.pending.lock() {
                Ok(pending) => pending,
                Err(_) => return false,
            };
            match pending.get_mut(&id) {
                Some(slot @ Slot::Pending(_)) => {
                    let previous = std::mem::replace(slot, Slot::Settled(result));
                    match previous {
                        Slot::Pending(waker) => waker,
                        Slot::Settled(_) => None,
                    }
                }
                _ => return false,
            }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }
}

// =============================================================================
// Ticket
// =============================================================================

/// The awaitable half of a pending relay entry.
///
/// Resolves with the reply delivered through [`RelayTable::resolve`] or the
/// failure delivered through [`RelayTable::reject`]. Dropping an unresolved
/// ticket removes its entry; a reply arriving afterwards is reported as stray.
pub struct RelayTicket<T> {
    id: CorrelationId,
    inner: Arc<Inner<T>>,
}

impl<T> RelayTicket<T> {
    /// The correlation id this ticket is waiting on.
    pub fn id(&self) -> CorrelationId {
        self.id
    }
}

impl<T> Future for RelayTicket<T> {
    type Output = Result<T, RelayError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut pending = match self.inner.pending.lock() {
            Ok(pending) => pending,
            Err(_) => return Poll::Ready(Err(RelayError::ChannelClosed)),
        };
        match pending.get_mut(&self.id) {
            Some(Slot::Pending(waker)) => {
                *waker = Some(cx.waker().clone());
                return Poll::Pending;
            }
            Some(Slot::Settled(_)) => {}
            // Entry gone without being settled: the table was torn down.
            None => return Poll::Ready(Err(RelayError::ChannelClosed)),
        }
        match pending.remove(&self.id) {
            Some(Slot::Settled(result)) => Poll::Ready(result),
            _ => Poll::Ready(Err(RelayError::ChannelClosed)),
        }
    }
}

impl<T> Drop for RelayTicket<T> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::pin;

    fn poll_once<T>(ticket: &mut RelayTicket<T>) -> Poll<Result<T, RelayError>> {
        let mut cx = Context::from_waker(Waker::noop());
        Pin::new(ticket).poll(&mut cx)
    }

    #[test]
    fn test_resolve_delivers_value() {
        let table: RelayTable<&'static str> = RelayTable::new();
        let (id, mut ticket) = table.register();

        assert!(matches!(poll_once(&mut ticket), Poll::Pending));
        assert!(table.resolve(id, "reply"));
        assert_eq!(poll_once(&mut ticket), Poll::Ready(Ok("reply")));
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn test_reject_delivers_error() {
        let table: RelayTable<()> = RelayTable::new();
        let (id, mut ticket) = table.register();

        assert!(table.reject(id, RelayError::ClientNotFound));
        assert_eq!(
            poll_once(&mut ticket),
            Poll::Ready(Err(RelayError::ClientNotFound))
        );
    }

    #[test]
    fn test_channel_isolation() {
        // Two concurrent relays settle independently: resolving one leaves
        // the other pending, and each ticket sees only its own reply.
        let table: RelayTable<u32> = RelayTable::new();
        let (first_id, mut first) = table.register();
        let (second_id, mut second) = table.register();
        assert_ne!(first_id, second_id);

        assert!(table.resolve(second_id, 22));
        assert!(matches!(poll_once(&mut first), Poll::Pending));
        assert_eq!(poll_once(&mut second), Poll::Ready(Ok(22)));

        assert!(table.resolve(first_id, 11));
        assert_eq!(poll_once(&mut first), Poll::Ready(Ok(11)));
    }

    #[test]
    fn test_exactly_one_reply_per_relay() {
        let table: RelayTable<u32> = RelayTable::new();
        let (id, mut ticket) = table.register();

        assert!(table.resolve(id, 1));
        // A second settlement of the same id is reported as stray.
        assert!(!table.resolve(id, 2));
        assert!(!table.reject(id, RelayError::ChannelClosed));
        assert_eq!(poll_once(&mut ticket), Poll::Ready(Ok(1)));
    }

    #[test]
    fn test_unknown_id_is_reported() {
        let table: RelayTable<u32> = RelayTable::new();
        assert!(!table.resolve(999, 1));
    }

    #[test]
    fn test_dropped_ticket_removes_entry() {
        let table: RelayTable<u32> = RelayTable::new();
        let (id, ticket) = table.register();
        assert_eq!(table.pending_count(), 1);

        drop(ticket);
        assert_eq!(table.pending_count(), 0);
        // The late reply is stray, not delivered to anyone.
        assert!(!table.resolve(id, 7));
    }

    #[test]
    fn test_wake_on_settle() {
        use std::sync::atomic::AtomicBool;
        use std::task::Wake;

        struct Flag(AtomicBool);
        impl Wake for Flag {
            fn wake(self: Arc<Self>) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let table: RelayTable<u32> = RelayTable::new();
        let (id, ticket) = table.register();
        let mut ticket = pin!(ticket);

        let flag = Arc::new(Flag(AtomicBool::new(false)));
        let waker = Waker::from(flag.clone());
        let mut cx = Context::from_waker(&waker);

        assert!(matches!(ticket.as_mut().poll(&mut cx), Poll::Pending));
        assert!(table.resolve(id, 5));
        assert!(flag.0.load(Ordering::SeqCst));
        assert_eq!(ticket.as_mut().poll(&mut cx), Poll::Ready(Ok(5)));
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let table: RelayTable<()> = RelayTable::new();
        let mut seen = std::collections::HashSet::new();
        let tickets: Vec<_> = (0..64)
            .map(|_| {
                let (id, ticket) = table.register();
                assert!(seen.insert(id));
                ticket
            })
            .collect();
        assert_eq!(table.pending_count(), tickets.len());
    }
}
