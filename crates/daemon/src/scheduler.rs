//! Periodic background tasks.
//!
//! Each [`PeriodicTask`] runs on its own tokio task, driven by an interval
//! timer. Missed ticks are delayed rather than bursted, so a slow run never
//! causes a pile-up of catch-up runs. All loops share one stop signal,
//! exposed through the [`ShutdownHandle`] returned by [`Scheduler::start`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Work run on a fixed interval.
#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// Whether the first run happens at start instead of one interval later.
    fn run_immediately(&self) -> bool {
        true
    }

    async fn tick(&self);
}

#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<Arc<dyn PeriodicTask>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(mut self, task: Arc<dyn PeriodicTask>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Spawn every task loop.
    pub fn start(self) -> ShutdownHandle {
        let (stop_tx, stop_rx) = watch::channel(false);

        let tasks = self
            .tasks
            .into_iter()
            .map(|task| {
                let name = task.name();
                let handle = tokio::spawn(run_task(task, stop_rx.clone()));
                (name, handle)
            })
            .collect();

        ShutdownHandle { stop_tx, tasks }
    }
}

async fn run_task(task: Arc<dyn PeriodicTask>, mut stop: watch::Receiver<bool>) {
    let period = task.interval();
    let start = if task.run_immediately() {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(task = task.name(), period = ?period, "periodic task started");

    loop {
        if *stop.borrow() {
            break;
        }

        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    biased;
                    _ = stop.changed() => break,
                    _ = task.tick() => {}
                }
            }
        }
    }

    tracing::info!(task = task.name(), "periodic task stopped");
}

/// Stops the scheduler's task loops.
pub struct ShutdownHandle {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl ShutdownHandle {
    /// Ask every loop to stop at its next await point.
    pub fn signal(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Wait for every loop to finish.
    pub async fn join(self) {
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                tracing::warn!(task = name, error = %e, "periodic task ended abnormally");
            }
        }
    }

    /// Signal, then wait.
    pub async fn shutdown(self) {
        self.signal();
        self.join().await;
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Counter {
        runs: AtomicUsize,
        immediate: bool,
        work: Duration,
    }

    impl Counter {
        fn new(immediate: bool, work: Duration) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
                immediate,
                work,
            })
        }
    }

    #[async_trait]
    impl PeriodicTask for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn interval(&self) -> Duration {
            Duration::from_secs(10)
        }

        fn run_immediately(&self) -> bool {
            self.immediate
        }

        async fn tick(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.work).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_first_run_then_interval() {
        let counter = Counter::new(true, Duration::ZERO);
        let handle = Scheduler::new().with_task(counter.clone()).start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(counter.runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.runs.load(Ordering::SeqCst), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_first_run() {
        let counter = Counter::new(false, Duration::ZERO);
        let handle = Scheduler::new().with_task(counter.clone()).start();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(counter.runs.load(Ordering::SeqCst), 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_running_tick() {
        let counter = Counter::new(true, Duration::from_secs(3600));
        let handle = Scheduler::new().with_task(counter.clone()).start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(counter.runs.load(Ordering::SeqCst), 1);

        assert_eq!(handle.task_names(), vec!["counter"]);
        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .unwrap();
    }
}
