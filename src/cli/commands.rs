use crate::config::Config;
use crate::k8s::{K8sClient, KubeDirectory};
use crate::metrics::{HealthRegistry, PrometheusExporter, ScrapeStats};
use crate::scheduler::{ScheduleSettings, Scheduler};
use crate::targets::HttpTargetFetcher;
use crate::{Result, TargetwatchError};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wire the pipeline together and run until a shutdown signal arrives.
pub async fn run(config: Config) -> Result<()> {
    info!(
        "Watching pods matching {:?} in namespace {} (agent port {}, every {:?})",
        config.name_match,
        config.namespace,
        config.agent_port,
        config.scrape_interval()
    );
    if let Some(selector) = &config.label_selector {
        info!("Label selector: {}", selector);
    }

    let client = K8sClient::try_default().await?;
    let directory = KubeDirectory::new(client, &config);
    let fetcher = HttpTargetFetcher::new(config.request_timeout())?;

    let stats = ScrapeStats::new()?;
    let registry = HealthRegistry::new();
    let exporter = PrometheusExporter::new(registry.reader(), &stats)?;

    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|source| TargetwatchError::BindFailed {
            addr: config.listen.to_string(),
            source,
        })?;

    let scheduler = Scheduler::new(
        directory,
        fetcher,
        registry,
        stats,
        ScheduleSettings::from_config(&config),
    );

    let shutdown = CancellationToken::new();
    let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let server_token = shutdown.clone();
    let served = exporter
        .serve(listener, async move { server_token.cancelled().await })
        .await;

    shutdown.cancel();
    if let Err(e) = scheduler_task.await {
        warn!("Scheduler task ended abnormally: {}", e);
    }

    served
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
