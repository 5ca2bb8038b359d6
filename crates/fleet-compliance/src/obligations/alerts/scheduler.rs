use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::scanner::{ScanError, ScanReport};

/// Cooperative stop flag shared between an owner and its background tasks.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// A periodic job the scheduler can drive.
pub trait ScanJob: Send + Sync + 'static {
    fn run_scan(&self, today: NaiveDate, shutdown: &ShutdownSignal) -> Result<ScanReport, ScanError>;
}

/// Owns the single periodic scan task. Ticks that arrive while a scan is
/// still running are skipped rather than queued.
pub struct ScanScheduler;

impl ScanScheduler {
    pub fn start<J: ScanJob>(job: Arc<J>, interval: Duration) -> SchedulerHandle {
        Self::start_with_clock(job, interval, || Local::now().date_naive())
    }

    pub fn start_with_clock<J, C>(job: Arc<J>, interval: Duration, today: C) -> SchedulerHandle
    where
        J: ScanJob,
        C: Fn() -> NaiveDate + Send + Sync + 'static,
    {
        let shutdown = ShutdownSignal::new();
        let signal = shutdown.clone();
        let period = interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = period.as_secs(), "alert scan scheduler started");

            loop {
                tokio::select! {
                    _ = signal.wait() => break,
                    _ = ticker.tick() => {}
                }

                let job = job.clone();
                let scan_signal = signal.clone();
                let date = today();
                let outcome =
                    tokio::task::spawn_blocking(move || job.run_scan(date, &scan_signal)).await;
                match outcome {
                    Ok(Ok(report)) => info!(
                        today = %date,
                        examined = report.examined,
                        due = report.due,
                        created = report.alerts_created,
                        skipped = report.alerts_skipped,
                        failures = report.failures,
                        interrupted = report.interrupted,
                        "alert scan finished"
                    ),
                    Ok(Err(ScanError::AlreadyRunning)) => {
                        warn!(today = %date, "alert scan skipped: previous run still active")
                    }
                    Ok(Err(err)) => error!(today = %date, error = %err, "alert scan failed"),
                    Err(err) => error!(error = %err, "alert scan task panicked"),
                }

                if signal.is_triggered() {
                    break;
                }
            }
            info!("alert scan scheduler stopped");
        });

        SchedulerHandle { shutdown, task }
    }
}

pub struct SchedulerHandle {
    shutdown: ShutdownSignal,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Requests shutdown and waits for an in-flight scan to finish its
    /// current record.
    pub async fn stop(self) {
        self.shutdown.trigger();
        if let Err(err) = self.task.await {
            error!(error = %err, "alert scan scheduler terminated abnormally");
        }
    }
}
