use crate::cli::ServeArgs;
use crate::infra::{default_directory, AppState, LogNotifier};
use crate::routes::operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use fleet_compliance::config::AppConfig;
use fleet_compliance::error::AppError;
use fleet_compliance::obligations::alerts::{
    AlertScanner, DeliveryQueue, MemoryAlertStore, ScanScheduler, ShutdownSignal,
};
use fleet_compliance::obligations::store::MemoryObligationStore;
use fleet_compliance::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

const DELIVERY_CAPACITY: usize = 1024;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;
    std::fs::create_dir_all(&config.archive.root)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(MemoryObligationStore::new());
    let alerts = Arc::new(MemoryAlertStore::new());
    let directory = Arc::new(default_directory());

    let delivery_signal = ShutdownSignal::new();
    let (delivery, worker) = DeliveryQueue::channel(DELIVERY_CAPACITY, Arc::new(LogNotifier));
    let worker_task = tokio::spawn(worker.run(delivery_signal.clone()));
    let retry_task = spawn_retry(
        delivery.clone(),
        config.compliance.scan_interval,
        delivery_signal.clone(),
    );

    let scanner = Arc::new(
        AlertScanner::new(store, alerts, directory, config.compliance.clone())
            .with_delivery(delivery),
    );
    let scheduler = ScanScheduler::start(scanner, config.compliance.scan_interval);

    let app = operational_routes()
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        archive_root = %config.archive.root.display(),
        scan_interval_secs = config.compliance.scan_interval.as_secs(),
        "compliance engine ready"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_requested())
        .await;

    readiness_flag.store(false, Ordering::Release);
    scheduler.stop().await;
    delivery_signal.trigger();
    for (name, task) in [("delivery worker", worker_task), ("delivery retry", retry_task)] {
        if let Err(err) = task.await {
            error!(task = name, error = %err, "background task terminated abnormally");
        }
    }
    info!("compliance engine stopped");

    served?;
    Ok(())
}

/// Periodically moves failed notices back onto the delivery queue.
fn spawn_retry(queue: DeliveryQueue, period: Duration, shutdown: ShutdownSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    let requeued = queue.requeue_failed();
                    if requeued > 0 {
                        info!(requeued, "retrying failed notices");
                    }
                }
            }
        }
    })
}

async fn shutdown_requested() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable; serving until the process is killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
