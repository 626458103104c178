use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::monitor::{Display, Monitor, MonitorStats};
use crate::probe::UsageProbe;
use crate::shutdown::{Shutdown, ShutdownReason, ShutdownSignal};
use crate::worker::{Worker, WorkerReport};

/// How long to give the monitor to wind down once the workers are gone.
const MONITOR_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Running,
    Draining,
    Done,
}

/// A worker owns a dedicated OS thread for its whole life. The blocking pool
/// is left to the probe, which needs it on every tick.
struct WorkerHandle {
    id: usize,
    done: oneshot::Receiver<WorkerReport>,
}

impl WorkerHandle {
    fn spawn(id: usize, batch_size: u64, signal: ShutdownSignal) -> std::io::Result<Self> {
        let (tx, done) = oneshot::channel();
        thread::Builder::new()
            .name(format!("worker-{id}"))
            .spawn(move || {
                let report = Worker::new(id, batch_size).run(signal);
                let _ = tx.send(report);
            })?;
        Ok(Self { id, done })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub workers_started: usize,
    pub workers_finished: usize,
    pub batches: u64,
    pub reason: Option<ShutdownReason>,
    pub elapsed: Duration,
    pub monitor: Option<MonitorStats>,
}

/// Owns one stress run from start to clean shutdown.
pub struct Coordinator<W> {
    config: RunConfig,
    probe: Arc<dyn UsageProbe>,
    display: Display<W>,
}

impl<W> Coordinator<W>
where
    W: Write + Send + 'static,
{
    pub fn new(config: RunConfig, probe: Arc<dyn UsageProbe>, display: Display<W>) -> Self {
        Self {
            config,
            probe,
            display,
        }
    }

    /// Runs until the deadline passes or `interrupt` resolves, whichever is
    /// first, and returns once every worker has exited.
    pub async fn run<F>(self, interrupt: F) -> RunSummary
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let started = Instant::now();
        let Coordinator {
            config,
            probe,
            display,
        } = self;

        enter(Phase::Init);
        let shutdown = Shutdown::new();

        let deadline = config
            .duration
            .map(|after| tokio::spawn(deadline(after, shutdown.clone())));

        let listener = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                interrupt.await;
                if shutdown.trigger(ShutdownReason::Interrupt) {
                    println!("\nReceived interrupt signal. Shutting down...");
                    info!("interrupt received");
                }
            })
        };

        let mut monitor = tokio::spawn(
            Monitor::new(probe, display, config.interval).run(shutdown.signal()),
        );

        enter(Phase::Running);
        let workers: Vec<WorkerHandle> = (0..config.workers)
            .filter_map(|id| {
                match WorkerHandle::spawn(id, config.batch_size, shutdown.signal()) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        error!(worker = id, error = %e, "failed to start worker thread");
                        None
                    }
                }
            })
            .collect();
        info!(workers = workers.len(), "workers spawned");

        // Workers only ever stop on the signal, so wait for it first. With no
        // workers this is what keeps the monitor reporting.
        shutdown.signal().cancelled().await;
        enter(Phase::Draining);

        let workers_started = workers.len();
        let mut workers_finished = 0;
        let mut batches = 0;
        for worker in workers {
            match worker.done.await {
                Ok(report) => {
                    debug!(worker = report.id, batches = report.batches, "worker joined");
                    workers_finished += 1;
                    batches += report.batches;
                }
                Err(e) => error!(worker = worker.id, error = %e, "worker did not exit cleanly"),
            }
        }

        let monitor = match time::timeout(MONITOR_GRACE, &mut monitor).await {
            Ok(Ok(stats)) => {
                info!(
                    samples = stats.ticks,
                    successes = stats.successes,
                    failures = stats.failures,
                    "cpu monitor summary"
                );
                Some(stats)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "monitor task failed");
                None
            }
            Err(_) => {
                warn!("monitor did not stop in time");
                monitor.abort();
                None
            }
        };

        listener.abort();
        if let Some(deadline) = deadline {
            // Already fired or disarmed by the signal, so this returns promptly.
            let _ = deadline.await;
        }

        enter(Phase::Done);
        let summary = RunSummary {
            workers_started,
            workers_finished,
            batches,
            reason: shutdown.reason(),
            elapsed: started.elapsed(),
            monitor,
        };
        debug!(?summary, "run finished");
        summary
    }
}

fn enter(phase: Phase) {
    debug!(?phase, "coordinator phase");
}

async fn deadline(after: Duration, shutdown: Shutdown) {
    let signal = shutdown.signal();
    tokio::select! {
        _ = time::sleep(after) => {
            if shutdown.trigger(ShutdownReason::Deadline) {
                println!("\nTest duration completed");
                info!("deadline reached");
            }
        }
        _ = signal.cancelled() => debug!("deadline disarmed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeResult;
    use crate::monitor::RenderMode;
    use crate::config::ProbeKind;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    struct CountingProbe(AtomicUsize);

    impl UsageProbe for CountingProbe {
        fn sample(&self) -> ProbeResult<f64> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(25.0)
        }
    }

    fn config(workers: usize, duration: Option<Duration>) -> RunConfig {
        RunConfig {
            workers,
            duration,
            interval: Duration::from_secs(2),
            batch_size: 10_000,
            probe: ProbeKind::Command,
        }
    }

    fn coordinator(config: RunConfig, probe: Arc<CountingProbe>) -> Coordinator<io::Sink> {
        Coordinator::new(config, probe, Display::new(io::sink(), RenderMode::Lines))
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_ends_the_run() {
        let probe = Arc::new(CountingProbe(AtomicUsize::new(0)));
        let summary = coordinator(config(0, Some(Duration::from_secs(60))), probe.clone())
            .run(std::future::pending())
            .await;

        assert_eq!(summary.reason, Some(ShutdownReason::Deadline));
        assert!(summary.elapsed >= Duration::from_secs(60));
        assert!(summary.elapsed < Duration::from_secs(61));
        assert!(probe.0.load(Ordering::SeqCst) >= 29);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deadline_stops_real_workers() {
        let probe = Arc::new(CountingProbe(AtomicUsize::new(0)));
        let summary = coordinator(config(3, Some(Duration::from_millis(300))), probe)
            .run(std::future::pending())
            .await;

        assert_eq!(summary.reason, Some(ShutdownReason::Deadline));
        assert_eq!(summary.workers_started, 3);
        assert_eq!(summary.workers_finished, 3);
        assert!(summary.batches > 0);
        assert!(summary.elapsed >= Duration::from_millis(300));
        assert!(summary.elapsed < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn interrupt_disarms_a_long_deadline() {
        let probe = Arc::new(CountingProbe(AtomicUsize::new(0)));
        let (tx, rx) = oneshot::channel::<()>();

        let run = tokio::spawn(
            coordinator(config(2, Some(Duration::from_secs(3600))), probe).run(async move {
                let _ = rx.await;
            }),
        );

        time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();

        let summary = time::timeout(Duration::from_secs(5), run)
            .await
            .expect("coordinator hung on the deadline timer")
            .unwrap();

        assert_eq!(summary.reason, Some(ShutdownReason::Interrupt));
        assert_eq!(summary.workers_finished, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_workers_still_monitor_until_cancelled() {
        let probe = Arc::new(CountingProbe(AtomicUsize::new(0)));
        let summary = coordinator(config(0, None), probe.clone())
            .run(async {
                time::sleep(Duration::from_secs(7)).await;
            })
            .await;

        assert_eq!(summary.reason, Some(ShutdownReason::Interrupt));
        assert_eq!(summary.workers_started, 0);
        assert_eq!(summary.workers_finished, 0);
        assert_eq!(summary.batches, 0);
        assert_eq!(probe.0.load(Ordering::SeqCst), 3);
        assert_eq!(summary.monitor.map(|m| m.successes), Some(3));
    }

    #[test]
    fn workers_do_not_starve_the_monitor() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .max_blocking_threads(1)
            .enable_all()
            .build()
            .unwrap();

        let probe = Arc::new(CountingProbe(AtomicUsize::new(0)));
        let mut config = config(4, Some(Duration::from_millis(1500)));
        config.interval = Duration::from_millis(200);

        let summary = runtime.block_on(coordinator(config, probe.clone()).run(std::future::pending()));

        assert_eq!(summary.workers_started, 4);
        assert_eq!(summary.workers_finished, 4);
        let stats = summary.monitor.expect("monitor stats");
        assert!(stats.successes >= 3, "monitor starved: {stats:?}");
        assert!(probe.0.load(Ordering::SeqCst) as u64 >= stats.ticks);
    }
}
