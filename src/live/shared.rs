//! Observable values backed by an upstream producer
//!
//! A [`LiveValue`] runs its upstream task only while somebody is watching.
//! The first observer starts the task. When the last observer leaves, the
//! task keeps running for the policy's stop timeout and is then aborted. An
//! observer arriving inside that window keeps the running task. The last
//! published value survives a stop and is what new observers see first.

use super::observable::{Observable, ObservableStream, ObserverHook, Subscription, WeakObservable};
use anyhow::Context;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Builds the upstream task for one activation
pub type Upstream<T> = Arc<dyn Fn(Publisher<T>) -> BoxFuture<'static, ()> + Send + Sync>;

/// When a live value stops its upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharingPolicy {
    /// Grace period between the last observer leaving and the upstream stopping
    pub stop_timeout: Duration,
}

impl SharingPolicy {
    pub fn while_subscribed(stop_timeout: Duration) -> Self {
        Self { stop_timeout }
    }
}

impl Default for SharingPolicy {
    fn default() -> Self {
        Self::while_subscribed(Duration::from_secs(5))
    }
}

/// Write side handed to an upstream task
pub struct Publisher<T> {
    target: WeakObservable<T>,
    emissions: Arc<watch::Sender<u64>>,
}

impl<T> Publisher<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Publish a full snapshot. Returns false once the live value is gone.
    pub fn publish(&self, value: T) -> bool {
        let Some(observable) = self.target.upgrade() else {
            return false;
        };
        observable.set(value);
        self.emissions.send_modify(|count| *count += 1);
        true
    }
}

#[derive(Default)]
struct RunState {
    task: Option<JoinHandle<()>>,
    stop_timer: Option<JoinHandle<()>>,
    /// Bumped whenever a stop timer is scheduled or cancelled
    timer_epoch: u64,
}

struct Lifecycle<T> {
    name: &'static str,
    me: Weak<Lifecycle<T>>,
    target: WeakObservable<T>,
    upstream: Upstream<T>,
    policy: SharingPolicy,
    runtime: Handle,
    /// Upstream publishes since the current activation started
    emissions: Arc<watch::Sender<u64>>,
    run: Mutex<RunState>,
}

impl<T> Lifecycle<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn run_state(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn observers(&self) -> usize {
        self.target
            .upgrade()
            .map(|observable| observable.observer_count())
            .unwrap_or(0)
    }

    /// Bring the upstream in line with the current observer count
    fn reconcile(&self) {
        let mut run = self.run_state();
        let observers = self.observers();

        if observers > 0 {
            if let Some(timer) = run.stop_timer.take() {
                timer.abort();
                run.timer_epoch += 1;
                tracing::trace!("{}: observer returned within grace period", self.name);
            }
            let running = run.task.as_ref().is_some_and(|task| !task.is_finished());
            if !running {
                run.task = Some(self.start());
            }
        } else if run.task.is_some() && run.stop_timer.is_none() {
            if self.policy.stop_timeout.is_zero() {
                self.stop(&mut run);
                return;
            }
            run.timer_epoch += 1;
            let epoch = run.timer_epoch;
            let lifecycle = self.me.clone();
            let timeout = self.policy.stop_timeout;
            run.stop_timer = Some(self.runtime.spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(lifecycle) = lifecycle.upgrade() {
                    lifecycle.stop_if_idle(epoch);
                }
            }));
        }
    }

    fn stop_if_idle(&self, epoch: u64) {
        let mut run = self.run_state();
        if run.timer_epoch != epoch {
            return;
        }
        run.stop_timer = None;
        if self.observers() == 0 {
            self.stop(&mut run);
        }
    }

    fn start(&self) -> JoinHandle<()> {
        self.emissions.send_replace(0);
        let publisher = Publisher {
            target: self.target.clone(),
            emissions: self.emissions.clone(),
        };
        tracing::debug!("{}: starting upstream", self.name);
        self.runtime.spawn((self.upstream)(publisher))
    }

    fn stop(&self, run: &mut RunState) {
        if let Some(task) = run.task.take() {
            task.abort();
            tracing::debug!("{}: upstream stopped, no observers", self.name);
        }
    }
}

impl<T> ObserverHook for Lifecycle<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn observers_changed(&self) {
        self.reconcile();
    }
}

impl<T> Drop for Lifecycle<T> {
    fn drop(&mut self) {
        let run = self.run.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(task) = run.task.take() {
            task.abort();
        }
        if let Some(timer) = run.stop_timer.take() {
            timer.abort();
        }
    }
}

/// An observable whose content comes from an upstream task that only runs
/// while observed
pub struct LiveValue<T> {
    observable: Observable<T>,
    lifecycle: Arc<Lifecycle<T>>,
}

impl<T> LiveValue<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a live value. Must be called from within a tokio runtime.
    pub fn new(
        name: &'static str,
        initial: T,
        policy: SharingPolicy,
        upstream: Upstream<T>,
    ) -> anyhow::Result<Self> {
        let runtime = Handle::try_current().context("Live values need a tokio runtime")?;
        let observable = Observable::new(initial);
        let (emissions, _) = watch::channel(0u64);

        let lifecycle = Arc::new_cyclic(|me| Lifecycle {
            name,
            me: me.clone(),
            target: observable.downgrade(),
            upstream,
            policy,
            runtime,
            emissions: Arc::new(emissions),
            run: Mutex::new(RunState::default()),
        });
        observable.set_hook(lifecycle.clone());

        Ok(Self {
            observable,
            lifecycle,
        })
    }

    /// Last published value (or the initial one)
    pub fn get(&self) -> T {
        self.observable.get()
    }

    #[allow(dead_code)] // Front ends use `stream`; callbacks are exercised in tests
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.observable.subscribe(callback)
    }

    pub fn stream(&self) -> ObservableStream<T> {
        self.observable.stream()
    }

    /// Whether the upstream task is currently alive
    #[allow(dead_code)] // Reserved for diagnostics
    pub fn is_running(&self) -> bool {
        self.lifecycle
            .run_state()
            .task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Observe until the upstream has published at least once in its current
    /// activation, then return the value
    ///
    /// Waits forever if the upstream never publishes; wrap in a timeout when
    /// that matters.
    pub async fn settled(&self) -> T {
        let _subscription = self.observable.subscribe(|_| {});
        let mut emissions = self.lifecycle.emissions.subscribe();
        let _ = emissions.wait_for(|count| *count > 0).await;
        self.observable.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Upstream that publishes the activation number once, then idles
    fn counting_upstream(starts: Arc<AtomicUsize>) -> Upstream<usize> {
        Arc::new(move |publisher: Publisher<usize>| {
            let starts = starts.clone();
            async move {
                let n = starts.fetch_add(1, Ordering::SeqCst) + 1;
                publisher.publish(n);
                std::future::pending::<()>().await;
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_upstream_starts_on_first_observer() {
        let starts = Arc::new(AtomicUsize::new(0));
        let live = LiveValue::new(
            "test",
            0,
            SharingPolicy::default(),
            counting_upstream(starts.clone()),
        )
        .unwrap();
        assert!(!live.is_running());

        assert_eq!(live.settled().await, 1);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resubscribe_within_grace_keeps_upstream() {
        let starts = Arc::new(AtomicUsize::new(0));
        let live = LiveValue::new(
            "test",
            0,
            SharingPolicy::while_subscribed(Duration::from_millis(200)),
            counting_upstream(starts.clone()),
        )
        .unwrap();

        let mut stream = live.stream();
        assert_eq!(stream.wait_for(|v| *v == 1).await, Some(1));
        drop(stream);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let _subscription = live.subscribe(|_| {});
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(live.is_running());
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upstream_stops_after_grace_and_restarts_with_last_value() {
        let starts = Arc::new(AtomicUsize::new(0));
        let live = LiveValue::new(
            "test",
            0,
            SharingPolicy::while_subscribed(Duration::from_millis(30)),
            counting_upstream(starts.clone()),
        )
        .unwrap();

        assert_eq!(live.settled().await, 1);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!live.is_running());

        // Last value is retained while stopped
        assert_eq!(live.get(), 1);

        assert_eq!(live.settled().await, 2);
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_timeout_stops_immediately() {
        let starts = Arc::new(AtomicUsize::new(0));
        let live = LiveValue::new(
            "test",
            0,
            SharingPolicy::while_subscribed(Duration::ZERO),
            counting_upstream(starts),
        )
        .unwrap();

        let subscription = live.subscribe(|_| {});
        assert!(live.is_running());
        drop(subscription);
        assert!(!live.is_running());
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let starts = Arc::new(AtomicUsize::new(0));
        let result = LiveValue::new(
            "test",
            0,
            SharingPolicy::default(),
            counting_upstream(starts),
        );
        assert!(result.is_err());
    }
}
