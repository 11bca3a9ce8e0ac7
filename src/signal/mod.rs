// Signal/slot module
//
// Thread-safe multi-subscriber broadcast. Producers (the capture worker, the
// tracking engine) emit on the calling thread; subscribers connect and
// disconnect from any thread at any time.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Lifecycle of a single subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    /// The handler fires on every emit
    Active,

    /// [`Connection::disconnect`] was called
    Disconnected,

    /// The tracked owner was dropped before an emit reached the handler
    OwnerGone,
}

impl SlotStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SlotStatus::Active,
            1 => SlotStatus::Disconnected,
            _ => SlotStatus::OwnerGone,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SlotStatus::Active => 0,
            SlotStatus::Disconnected => 1,
            SlotStatus::OwnerGone => 2,
        }
    }
}

/// Shared between a slot and the connection handles pointing at it.
#[derive(Debug)]
struct SlotState {
    status: AtomicU8,
}

impl SlotState {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(SlotStatus::Active.as_u8()),
        }
    }

    fn status(&self) -> SlotStatus {
        SlotStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn is_active(&self) -> bool {
        self.status() == SlotStatus::Active
    }

    /// Move out of `Active`. The first expiry reason wins.
    fn expire(&self, reason: SlotStatus) {
        let _ = self.status.compare_exchange(
            SlotStatus::Active.as_u8(),
            reason.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Outcome of handing one emit to one handler.
enum Delivery {
    Delivered,
    OwnerGone,
}

type Handler<A> = Box<dyn Fn(&A) -> Delivery + Send + Sync>;

struct Slot<A> {
    state: Arc<SlotState>,
    handler: Handler<A>,
}

/// Broadcast channel carrying values of type `A` to any number of handlers.
///
/// Multiple arguments are passed as a tuple, e.g. `Signal<(i32, i32, bool)>`.
///
/// # Delivery rules
///
/// - [`emit()`](Self::emit) calls every active handler once, in the order the
///   handlers were connected.
/// - The internal subscriber table is only locked while it is being read or
///   modified, never while a handler runs. Handlers may connect, disconnect or
///   emit re-entrantly.
/// - A handler connected while an emit is in progress is not called by that
///   emit.
/// - A subscription that was disconnected, or whose tracked owner is gone, is
///   skipped and removed from the table on the next emit.
///
/// # Example
/// ```
/// use gazeview::signal::Signal;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let signal = Signal::<u32>::new();
/// let total = Arc::new(AtomicUsize::new(0));
///
/// let sink = Arc::clone(&total);
/// let connection = signal.connect(move |value| {
///     sink.fetch_add(*value as usize, Ordering::SeqCst);
/// });
///
/// signal.emit(&5);
/// connection.disconnect();
/// signal.emit(&7);
///
/// assert_eq!(total.load(Ordering::SeqCst), 5);
/// ```
pub struct Signal<A> {
    slots: Mutex<IndexMap<u64, Arc<Slot<A>>>>,
    next_id: AtomicU64,
}

impl<A> Signal<A> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(IndexMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Connect a handler that fires on every emit until disconnected.
    pub fn connect<F>(&self, handler: F) -> Connection
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.insert(Box::new(move |args| {
            handler(args);
            Delivery::Delivered
        }))
    }

    /// Connect a handler whose lifetime is tied to `owner`.
    ///
    /// The signal only keeps a [`Weak`] reference to the owner. Each emit tries
    /// to upgrade it; while the upgrade succeeds the handler is called with the
    /// owner, and once every `Arc` to the owner is gone the subscription
    /// silently expires.
    pub fn connect_tracked<O, F>(&self, owner: &Arc<O>, handler: F) -> Connection
    where
        O: Send + Sync + 'static,
        F: Fn(&O, &A) + Send + Sync + 'static,
    {
        let owner: Weak<O> = Arc::downgrade(owner);
        self.insert(Box::new(move |args| match owner.upgrade() {
            Some(owner) => {
                handler(&owner, args);
                Delivery::Delivered
            }
            None => Delivery::OwnerGone,
        }))
    }

    /// Call every active handler with `args`, in connection order.
    pub fn emit(&self, args: &A) {
        let live: Vec<Arc<Slot<A>>> = {
            let mut slots = self.slots.lock();
            slots.retain(|_, slot| slot.state.is_active());
            slots.values().cloned().collect()
        };

        for slot in live {
            // Re-check right before the call: a disconnect from another
            // thread or an earlier handler must be honoured.
            if !slot.state.is_active() {
                continue;
            }

            if let Delivery::OwnerGone = (slot.handler)(args) {
                tracing::trace!("tracked owner dropped, expiring subscription");
                slot.state.expire(SlotStatus::OwnerGone);
            }
        }
    }

    /// Number of subscriptions that are still active.
    ///
    /// Subscriptions whose tracked owner died are only detected on emit, so
    /// they count as active until then.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.state.is_active())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disconnect every subscription and clear the table.
    pub fn disconnect_all(&self) {
        let drained: Vec<Arc<Slot<A>>> = {
            let mut slots = self.slots.lock();
            slots.drain(..).map(|(_, slot)| slot).collect()
        };
        for slot in &drained {
            slot.state.expire(SlotStatus::Disconnected);
        }
        // Handlers are dropped here, outside the table lock.
    }

    fn insert(&self, handler: Handler<A>) -> Connection {
        let state = Arc::new(SlotState::new());
        let connection = Connection {
            state: Arc::downgrade(&state),
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.slots.lock().insert(id, Arc::new(Slot { state, handler }));
        connection
    }
}

impl<A> Default for Signal<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.len())
            .finish()
    }
}

/// Handle to one subscription.
///
/// Holds no strong reference to the signal or to the handler. Once the
/// signal has dropped the subscription, every method is a harmless no-op.
/// Dropping a `Connection` does not disconnect; see [`ScopedConnection`] for
/// that.
#[derive(Clone, Debug, Default)]
pub struct Connection {
    state: Weak<SlotState>,
}

impl Connection {
    /// Stop the handler from being called by any later emit.
    ///
    /// Idempotent. A call already running on another thread completes.
    pub fn disconnect(&self) {
        if let Some(state) = self.state.upgrade() {
            state.expire(SlotStatus::Disconnected);
        }
    }

    /// Whether the subscription would still fire on the next emit.
    pub fn is_connected(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| state.is_active())
    }

    /// Current lifecycle state, or `None` once the signal has forgotten the
    /// subscription (or the signal itself is gone).
    pub fn status(&self) -> Option<SlotStatus> {
        self.state.upgrade().map(|state| state.status())
    }

    /// Convert into a guard that disconnects when dropped.
    pub fn scoped(self) -> ScopedConnection {
        ScopedConnection::new(self)
    }
}

/// A [`Connection`] that disconnects when dropped.
#[derive(Debug, Default)]
#[must_use = "the subscription is disconnected as soon as this is dropped"]
pub struct ScopedConnection {
    connection: Connection,
}

impl ScopedConnection {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Swap in a new connection, disconnecting the one held before.
    pub fn replace(&mut self, connection: Connection) {
        let previous = std::mem::replace(&mut self.connection, connection);
        previous.disconnect();
    }

    /// Give up the guard without disconnecting.
    pub fn release(mut self) -> Connection {
        std::mem::take(&mut self.connection)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }
}

impl From<Connection> for ScopedConnection {
    fn from(connection: Connection) -> Self {
        Self::new(connection)
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.connection.disconnect();
    }
}
