//! Process runner for the IoT service: long-running processes, periodic jobs
//! and closers under one cancellation token.
//!
//! - processes and jobs run concurrently until one fails or SIGINT/SIGTERM arrives
//! - closers always run afterwards, bounded by a timeout
//!
//! # Example
//!
//! ```no_run
//! use iot_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Runner::new()
//!         .with_app_process("heartbeat", |ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_periodic_job("sweep", Duration::from_secs(3600), || async move {
//!             tracing::info!("sweeping");
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .run()
//!         .await
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

type BoxedResultFuture = Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>;

/// A long-running process; must return once the token is cancelled
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxedResultFuture + Send>;

/// Cleanup run after all processes stopped
pub type Closer = Box<dyn FnOnce() -> BoxedResultFuture + Send>;

/// A unit of work repeated on a fixed interval
pub type PeriodicJob = Arc<dyn Fn() -> BoxedResultFuture + Send + Sync>;

struct NamedProcess {
    name: String,
    process: AppProcess,
}

pub struct Runner {
    app_processes: Vec<NamedProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Closer timeout defaults to 10 seconds
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Add a process; an error from it cancels every other process
    pub fn with_app_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.app_processes.push(NamedProcess {
            name: name.into(),
            process: Box::new(|token| -> BoxedResultFuture { Box::pin(process(token)) }),
        });
        self
    }

    /// Run `job` immediately and then every `interval` until shutdown
    ///
    /// A failing run is logged and does not stop the schedule. A zero
    /// interval fails the process when the runner starts.
    pub fn with_periodic_job<F, Fut>(self, name: impl Into<String>, interval: Duration, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let name = name.into();
        let job: PeriodicJob = Arc::new(move || -> BoxedResultFuture { Box::pin(job()) });
        let job_name = name.clone();
        self.with_app_process(name, move |ctx| run_periodic(job_name, interval, job, ctx))
    }

    /// Closers run after every process stopped, whatever the outcome
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| -> BoxedResultFuture { Box::pin(closer()) }));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally owned token, e.g. to stop the runner from a test
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run until a signal, cancellation or the first process error
    ///
    /// Returns the first process error after closers have run.
    pub async fn run(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for NamedProcess { name, process } in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                tracing::info!(process = %name, "starting process");
                (name, process(process_token).await)
            });
        }

        spawn_signal_handlers(token.clone());

        let mut first_error = None;
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((name, Ok(()))) => {
                    tracing::debug!(process = %name, "process completed");
                }
                Ok((name, Err(err))) => {
                    if !token.is_cancelled() {
                        tracing::error!(process = %name, "process failed: {:#}", err);
                        first_error = Some(err.context(format!("process {} failed", name)));
                        token.cancel();
                    }
                }
                Err(err) => {
                    tracing::error!("process panicked: {}", err);
                    if first_error.is_none() {
                        first_error = Some(anyhow::anyhow!("process panicked: {}", err));
                    }
                    token.cancel();
                }
            }

            if token.is_cancelled() {
                break;
            }
        }

        join_set.shutdown().await;

        if !self.closers.is_empty() {
            tracing::info!("running closers with timeout of {:?}", self.closer_timeout);
            if tokio::time::timeout(self.closer_timeout, run_closers(self.closers))
                .await
                .is_err()
            {
                tracing::error!("closers timed out after {:?}", self.closer_timeout);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                tracing::info!("runner stopped");
                Ok(())
            }
        }
    }
}

async fn run_periodic(
    name: String,
    interval: Duration,
    job: PeriodicJob,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    if interval.is_zero() {
        anyhow::bail!("periodic job {} has a zero interval", name);
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                tracing::info!(job = %name, "periodic job stopping");
                return Ok(());
            }
            _ = ticker.tick() => {
                if let Err(err) = job().await {
                    tracing::warn!(job = %name, "periodic job run failed: {:#}", err);
                }
            }
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => {
                tracing::error!("error setting up signal handler: {}", err);
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("received SIGTERM signal");
                token.cancel();
            }
            Err(err) => {
                tracing::error!("error setting up SIGTERM handler: {}", err);
            }
        }
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(closer());
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => tracing::debug!("closer completed"),
            Ok(Err(err)) => tracing::error!("closer error: {:#}", err),
            Err(err) => tracing::error!("closer panicked: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_cancellation_stops_processes_and_runs_closers() {
        let closed = Arc::new(AtomicBool::new(false));
        let closed_flag = closed.clone();
        let token = CancellationToken::new();
        let cancel = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let result = Runner::new()
            .with_app_process("waiter", |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .with_closer(move || async move {
                closed_flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_cancellation_token(token)
            .with_closer_timeout(Duration::from_secs(1))
            .run()
            .await;

        assert!(result.is_ok());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failing_process_cancels_the_rest() {
        let result = Runner::new()
            .with_app_process("waiter", |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .with_app_process("broken", |_ctx| async move {
                Err(anyhow::anyhow!("database unreachable"))
            })
            .run()
            .await;

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("broken"));
        assert!(format!("{:#}", err).contains("database unreachable"));
    }

    #[tokio::test]
    async fn test_periodic_job_repeats_and_survives_errors() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let token = CancellationToken::new();
        let cancel = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            cancel.cancel();
        });

        Runner::new()
            .with_periodic_job("sweep", Duration::from_millis(20), move || {
                let counter = counter.clone();
                async move {
                    let run = counter.fetch_add(1, Ordering::SeqCst);
                    if run == 0 {
                        anyhow::bail!("first run fails");
                    }
                    Ok(())
                }
            })
            .with_cancellation_token(token)
            .run()
            .await
            .unwrap();

        assert!(runs.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_closers_run_even_when_one_fails() {
        let ran = Arc::new(AtomicUsize::new(0));
        let first = ran.clone();
        let second = ran.clone();

        let closers: Vec<Closer> = vec![
            Box::new(move || -> BoxedResultFuture {
                Box::pin(async move {
                    first.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::anyhow!("flush failed"))
                })
            }),
            Box::new(move || -> BoxedResultFuture {
                Box::pin(async move {
                    second.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), anyhow::Error>(())
                })
            }),
        ];
        run_closers(closers).await;

        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_interval_periodic_job_fails_without_panicking() {
        let result = Runner::new()
            .with_app_process("waiter", |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .with_periodic_job("sweep", Duration::ZERO, || async move { Ok(()) })
            .run()
            .await;

        let err = format!("{:#}", result.unwrap_err());
        assert!(err.contains("zero interval"));
        assert!(!err.contains("panicked"));
    }
}
