//! Push-based event streams.
//!
//! - [`Emitter`]: a multicast source that delivers values to its listeners
//! - [`EventStream`]: a lazily-subscribed stream with `map`, `filter`,
//!   `filter_map`, `merge`, `distinct_until_changed` and `debounce`
//! - [`Subscription`]: RAII guard; dropping it cancels the subscription
//! - [`Watch`]: a subscription that buffers values into a channel
//!
//! Listeners run synchronously on the emitting thread, in registration
//! order, and never while an emitter's internal lock is held. The only
//! operator that changes threads is a non-zero [`EventStream::debounce`],
//! which delivers from a dedicated worker.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A callback receiving stream values.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

type SubscribeFn<T> = dyn Fn(Listener<T>) -> Subscription + Send + Sync;

/// Handle to an active subscription. Cancelled on drop.
#[must_use = "dropping a Subscription cancels it immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Create a subscription that runs `cancel` exactly once.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// Cancel now.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    /// Whether this subscription still has a pending cancellation.
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Combine two subscriptions into one that cancels both.
    pub fn join(self, other: Subscription) -> Subscription {
        Subscription::new(move || {
            drop(self);
            drop(other);
        })
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

struct EmitterInner<T> {
    listeners: RwLock<Vec<(u64, Listener<T>)>>,
    next_id: AtomicU64,
}

impl<T: 'static> EmitterInner<T> {
    fn add(self: &Arc<Self>, listener: Listener<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.write().push((id, listener));

        let weak = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.write().retain(|(other, _)| *other != id);
            }
        })
    }
}

/// Multicast event source.
pub struct Emitter<T> {
    inner: Arc<EmitterInner<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> Emitter<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                listeners: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Deliver `value` to every current listener.
    pub fn emit(&self, value: &T) {
        let listeners: Vec<Listener<T>> = self
            .inner
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// A stream over this emitter's future values.
    ///
    /// The stream holds the emitter weakly; subscribing after the emitter
    /// is gone yields an inert subscription.
    pub fn stream(&self) -> EventStream<T> {
        let weak = Arc::downgrade(&self.inner);
        EventStream::new(move |listener| match weak.upgrade() {
            Some(inner) => inner.add(listener),
            None => Subscription::empty(),
        })
    }
}

impl<T: Send + Sync + 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A composable, lazily-subscribed stream of values.
pub struct EventStream<T> {
    subscribe: Arc<SubscribeFn<T>>,
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            subscribe: Arc::clone(&self.subscribe),
        }
    }
}

impl<T: Send + Sync + 'static> EventStream<T> {
    /// Build a stream from its subscribe function.
    pub fn new(subscribe: impl Fn(Listener<T>) -> Subscription + Send + Sync + 'static) -> Self {
        Self {
            subscribe: Arc::new(subscribe),
        }
    }

    /// A stream that never emits.
    pub fn never() -> Self {
        Self::new(|_| Subscription::empty())
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        (self.subscribe)(Arc::new(listener))
    }

    pub fn map<U: Send + Sync + 'static>(
        &self,
        f: impl Fn(&T) -> U + Send + Sync + 'static,
    ) -> EventStream<U> {
        let source = self.clone();
        let f = Arc::new(f);
        EventStream::new(move |listener: Listener<U>| {
            let f = Arc::clone(&f);
            source.subscribe(move |value| listener(&f(value)))
        })
    }

    pub fn filter(&self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> EventStream<T> {
        let source = self.clone();
        let predicate = Arc::new(predicate);
        EventStream::new(move |listener: Listener<T>| {
            let predicate = Arc::clone(&predicate);
            source.subscribe(move |value| {
                if predicate(value) {
                    listener(value);
                }
            })
        })
    }

    /// Map and drop `None` results.
    pub fn filter_map<U: Send + Sync + 'static>(
        &self,
        f: impl Fn(&T) -> Option<U> + Send + Sync + 'static,
    ) -> EventStream<U> {
        let source = self.clone();
        let f = Arc::new(f);
        EventStream::new(move |listener: Listener<U>| {
            let f = Arc::clone(&f);
            source.subscribe(move |value| {
                if let Some(mapped) = f(value) {
                    listener(&mapped);
                }
            })
        })
    }

    /// Interleave the values of both streams.
    pub fn merge(&self, other: &EventStream<T>) -> EventStream<T> {
        let first = self.clone();
        let second = other.clone();
        EventStream::new(move |listener: Listener<T>| {
            let left = Arc::clone(&listener);
            let a = first.subscribe(move |value| left(value));
            let b = second.subscribe(move |value| listener(value));
            a.join(b)
        })
    }

    /// Suppress values equal to the previous one delivered to the same
    /// subscriber.
    pub fn distinct_until_changed(&self) -> EventStream<T>
    where
        T: Clone + PartialEq,
    {
        let source = self.clone();
        EventStream::new(move |listener: Listener<T>| {
            let last: Mutex<Option<T>> = Mutex::new(None);
            source.subscribe(move |value| {
                {
                    let mut last = last.lock();
                    if last.as_ref() == Some(value) {
                        return;
                    }
                    *last = Some(value.clone());
                }
                listener(value);
            })
        })
    }

    /// Emit only the last value of each burst, once `period` has passed
    /// without a newer value.
    ///
    /// A zero period passes values through synchronously. Otherwise each
    /// subscriber gets a worker thread that exits when the subscription is
    /// cancelled; a value still waiting out its period at that point is
    /// discarded.
    ///
    /// Cancelling waits for a delivery already in progress on the worker,
    /// so no value reaches the listener after cancellation returns. The
    /// worker may cancel its own subscription from inside the listener.
    pub fn debounce(&self, period: Duration) -> EventStream<T>
    where
        T: Clone,
    {
        if period.is_zero() {
            return self.clone();
        }

        let source = self.clone();
        EventStream::new(move |listener: Listener<T>| {
            let (tx, rx) = unbounded::<T>();
            let gate: Arc<DeliveryGate> = Arc::new(ReentrantMutex::new(Cell::new(true)));

            let upstream = source.subscribe(move |value| {
                let _ = tx.send(value.clone());
            });

            let worker_gate = Arc::clone(&gate);
            let spawned = thread::Builder::new()
                .name("formsync-debounce".to_string())
                .spawn(move || debounce_worker(rx, period, worker_gate, listener));
            if let Err(err) = spawned {
                tracing::error!(error = %err, "failed to spawn debounce worker");
            }

            Subscription::new(move || {
                gate.lock().set(false);
                drop(upstream);
            })
        })
    }

    /// Subscribe and buffer every value into a channel.
    pub fn watch(&self) -> Watch<T>
    where
        T: Clone,
    {
        let (tx, receiver) = unbounded();
        let subscription = self.subscribe(move |value| {
            let _ = tx.send(value.clone());
        });
        Watch {
            receiver,
            _subscription: subscription,
        }
    }
}

/// Open while the subscription is active. Held across each delivery.
type DeliveryGate = ReentrantMutex<Cell<bool>>;

fn debounce_worker<T>(
    rx: Receiver<T>,
    period: Duration,
    gate: Arc<DeliveryGate>,
    listener: Listener<T>,
) {
    while let Ok(mut pending) = rx.recv() {
        loop {
            match rx.recv_timeout(period) {
                Ok(next) => pending = next,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        let open = gate.lock();
        if !open.get() {
            return;
        }
        listener(&pending);
    }
}

/// A subscription whose values are buffered in a channel.
///
/// Dropping the watch cancels the underlying subscription.
pub struct Watch<T> {
    receiver: Receiver<T>,
    _subscription: Subscription,
}

impl<T> Watch<T> {
    /// Receive the next value (blocking).
    pub fn recv(&self) -> Result<T, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a value (non-blocking).
    pub fn try_recv(&self) -> Result<T, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<T, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything buffered so far.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }
}
