//! Observable value holder
//!
//! An [`Observable`] keeps the latest value and calls every registered
//! observer when it changes. Subscribing delivers the current value right
//! away. Setting a value equal to the current one notifies nobody.
//!
//! Observers run on the thread that called [`Observable::set`], outside any
//! internal lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use tokio::sync::mpsc;

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Told whenever an observer is added or removed
pub trait ObserverHook: Send + Sync {
    fn observers_changed(&self);
}

/// A registered observer and the last value version it was given
struct Entry<T> {
    callback: Callback<T>,
    last_version: AtomicU64,
}

impl<T> Entry<T> {
    /// Deliver unless the observer already saw this version or a newer one
    fn deliver(&self, version: u64, value: &T) {
        if self.last_version.fetch_max(version, Ordering::AcqRel) < version {
            (self.callback)(value);
        }
    }
}

struct State<T> {
    value: T,
    version: u64,
    observers: BTreeMap<u64, Arc<Entry<T>>>,
    next_id: u64,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    hook: OnceLock<Arc<dyn ObserverHook>>,
}

impl<T> Inner<T> {
    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, id: u64) {
        let removed = self.state().observers.remove(&id).is_some();
        if removed {
            if let Some(hook) = self.hook.get() {
                hook.observers_changed();
            }
        }
    }
}

/// Shared, cloneable handle to an observable value
pub struct Observable<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    value: initial,
                    version: 1,
                    observers: BTreeMap::new(),
                    next_id: 0,
                }),
                hook: OnceLock::new(),
            }),
        }
    }

    /// Install the observer-count hook. Only the first call has an effect.
    pub(crate) fn set_hook(&self, hook: Arc<dyn ObserverHook>) {
        let _ = self.inner.hook.set(hook);
    }

    /// Current value
    pub fn get(&self) -> T {
        self.inner.state().value.clone()
    }

    /// Replace the value, notifying observers if it changed
    ///
    /// Returns whether the value changed.
    pub fn set(&self, value: T) -> bool {
        let (version, observers) = {
            let mut state = self.inner.state();
            if state.value == value {
                return false;
            }
            state.value = value.clone();
            state.version += 1;
            let observers: Vec<_> = state.observers.values().cloned().collect();
            (state.version, observers)
        };

        for observer in observers {
            observer.deliver(version, &value);
        }
        true
    }

    /// Register an observer. It is called with the current value before
    /// this returns, then on every change until the [`Subscription`] drops.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let entry = Arc::new(Entry {
            callback: Box::new(callback),
            last_version: AtomicU64::new(0),
        });

        let (id, version, current) = {
            let mut state = self.inner.state();
            let id = state.next_id;
            state.next_id += 1;
            state.observers.insert(id, entry.clone());
            (id, state.version, state.value.clone())
        };

        entry.deliver(version, &current);
        if let Some(hook) = self.inner.hook.get() {
            hook.observers_changed();
        }

        let inner = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.remove(id);
            }
        })
    }

    /// Subscribe and receive values through a channel
    pub fn stream(&self) -> ObservableStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |value: &T| {
            let _ = tx.send(value.clone());
        });
        ObservableStream {
            rx,
            _subscription: subscription,
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.state().observers.len()
    }

    pub fn downgrade(&self) -> WeakObservable<T> {
        WeakObservable {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state();
        f.debug_struct("Observable")
            .field("value", &state.value)
            .field("observers", &state.observers.len())
            .finish()
    }
}

/// Non-owning handle; does not keep the value alive
pub struct WeakObservable<T> {
    inner: Weak<Inner<T>>,
}

impl<T> Clone for WeakObservable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> WeakObservable<T> {
    pub fn upgrade(&self) -> Option<Observable<T>> {
        self.inner.upgrade().map(|inner| Observable { inner })
    }
}

/// Disposer returned by [`Observable::subscribe`]
///
/// Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    fn new(dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// Unsubscribe now
    #[allow(dead_code)] // Same as dropping, spelled out at call sites
    pub fn unsubscribe(mut self) {
        self.dispose();
    }

    fn dispose(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Values of an observable as an async sequence
///
/// The first value received is the one current at subscription time.
pub struct ObservableStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
    _subscription: Subscription,
}

impl<T> ObservableStream<T> {
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Skip values until one satisfies `predicate`
    #[allow(dead_code)] // Used in tests
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        while let Some(value) = self.rx.recv().await {
            if predicate(&value) {
                return Some(value);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscribe_delivers_current_value() {
        let observable = Observable::new(5);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = observable.subscribe(move |v| sink.lock().unwrap().push(*v));

        assert_eq!(*seen.lock().unwrap(), vec![5]);
    }

    #[test]
    fn test_set_notifies_only_on_change() {
        let observable = Observable::new("a".to_string());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _subscription = observable.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!observable.set("a".to_string()));
        assert!(observable.set("b".to_string()));
        assert!(!observable.set("b".to_string()));

        // initial delivery + one change
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(observable.get(), "b");
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let observable = Observable::new(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscription = observable.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(observable.observer_count(), 1);

        drop(subscription);
        assert_eq!(observable.observer_count(), 0);

        observable.set(1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hook_sees_subscribe_and_unsubscribe() {
        struct CountingHook(AtomicUsize);
        impl ObserverHook for CountingHook {
            fn observers_changed(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let observable = Observable::new(0);
        let hook = Arc::new(CountingHook(AtomicUsize::new(0)));
        observable.set_hook(hook.clone());

        let subscription = observable.subscribe(|_| {});
        subscription.unsubscribe();

        assert_eq!(hook.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_weak_handle_does_not_keep_value_alive() {
        let observable = Observable::new(1);
        let weak = observable.downgrade();
        assert!(weak.upgrade().is_some());

        drop(observable);
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_stream_yields_current_then_changes() {
        let observable = Observable::new(1);
        let mut stream = observable.stream();

        observable.set(2);
        observable.set(3);

        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.wait_for(|v| *v == 3).await, Some(3));
    }
}
