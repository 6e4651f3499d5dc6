use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// A recurring background job with an explicit stop hook.
///
/// The first run happens one `period` after spawning, not immediately.
pub struct PeriodicTask {
    name: &'static str,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(task = name, period_secs = period.as_secs_f64(), "periodic task started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => job().await,
                    _ = &mut shutdown_rx => break,
                }
            }

            info!(task = name, "periodic task stopped");
        });

        Self {
            name,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Signals the loop to exit and waits for the in-progress run to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!(task = self.name, error = %err, "periodic task ended abnormally");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::PeriodicTask;

    #[tokio::test]
    async fn runs_repeatedly_until_stopped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let task = PeriodicTask::spawn("test", Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(80)).await;
        task.stop().await;

        let seen = runs.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several runs, saw {seen}");

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(runs.load(Ordering::SeqCst), seen);
    }
}
