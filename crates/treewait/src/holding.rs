//! Registry of in-flight mocked calls.
//!
//! Every call the mocked app issues is represented by a
//! [`HoldingPromise`] appended here. Waiters subscribe to appends instead
//! of patching the registry: each [`Subscription`] gets exactly one
//! notification per append, in subscription order. Dropping the subscription
//! deregisters it.
//!
//! A notification carries only the number of promises present after the
//! append. Those promises are a prefix of the registry, so a listener that
//! needs them reads [`HoldingRegistry::pending`] with that length.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Cloneable handle to one in-flight call; resolves once it settles
pub type HoldingPromise = Shared<BoxFuture<'static, ()>>;

type Listener = Arc<dyn Fn(usize) + Send + Sync>;

#[derive(Default)]
struct RegistryState {
    promises: Vec<HoldingPromise>,
    listeners: Vec<(u64, Listener)>,
    next_listener: u64,
}

fn lock(state: &Mutex<RegistryState>) -> MutexGuard<'_, RegistryState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Ordered, append-only set of holding promises with append listeners
#[derive(Clone, Default)]
pub struct HoldingRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl std::fmt::Debug for HoldingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("HoldingRegistry")
            .field("promises", &state.promises.len())
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl HoldingRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new in-flight call and notify every listener
    pub fn append<F>(&self, future: F) -> HoldingPromise
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.append_indexed(future, |_| {})
    }

    /// Like [`append`](Self::append), running `on_index` with the new
    /// promise's position before any listener hears about it
    ///
    /// `on_index` runs under the registry lock and must not touch the
    /// registry.
    pub fn append_indexed<F, I>(&self, future: F, on_index: I) -> HoldingPromise
    where
        F: Future<Output = ()> + Send + 'static,
        I: FnOnce(usize),
    {
        let promise = future.boxed().shared();
        let (len, listeners) = {
            let mut state = lock(&self.state);
            on_index(state.promises.len());
            state.promises.push(promise.clone());
            let listeners: Vec<Listener> =
                state.listeners.iter().map(|(_, l)| l.clone()).collect();
            (state.promises.len(), listeners)
        };
        tracing::trace!(
            holding = len,
            listeners = listeners.len(),
            "holding promise appended"
        );
        // Listeners may subscribe or append themselves, so run them unlocked
        for listener in listeners {
            listener(len);
        }
        promise
    }

    /// Unsettled promises among the first `len` appended, oldest first
    #[must_use]
    pub fn pending(&self, len: usize) -> Vec<HoldingPromise> {
        lock(&self.state)
            .promises
            .iter()
            .take(len)
            .filter(|promise| promise.peek().is_none())
            .cloned()
            .collect()
    }

    /// Number of promises ever appended
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.state).promises.len()
    }

    /// Check whether nothing was appended yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live subscriptions
    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.state).listeners.len()
    }

    /// Call `listener` with the promise count after every append
    #[must_use = "dropping the subscription deregisters the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let mut state = lock(&self.state);
        let id = state.next_listener;
        state.next_listener += 1;
        state.listeners.push((id, Arc::new(listener)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.state),
        }
    }

    /// Resolve once every promise present right now has settled
    pub fn settled(&self) -> impl Future<Output = ()> + Send + 'static {
        settle_all(self.pending(self.len()))
    }
}

/// Resolve once every given promise has settled
pub async fn settle_all(promises: Vec<HoldingPromise>) {
    futures::future::join_all(promises).await;
}

/// Listener registration; deregisters on drop
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<RegistryState>>,
}

impl Subscription {
    /// Deregister now
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.registry.upgrade() {
            lock(&state).listeners.retain(|(id, _)| *id != self.id);
        }
    }
}
