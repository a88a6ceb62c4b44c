use crate::metrics::collector::{HealthCollector, ScrapeStats};
use crate::metrics::registry::RegistryReader;
use crate::{Result, TargetwatchError};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Serves the health snapshot and the scrape loop's own metrics.
///
/// Requests only read the latest published snapshot; they never wait for or
/// start a scrape cycle.
pub struct PrometheusExporter {
    registry: Registry,
}

impl PrometheusExporter {
    pub fn new(reader: RegistryReader, stats: &ScrapeStats) -> Result<Self> {
        let registry = Registry::new();
        registry.register(Box::new(HealthCollector::new(reader)?))?;
        stats.register(&registry)?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self { registry })
    }

    pub fn render(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;
        String::from_utf8(buf).map_err(|e| TargetwatchError::MetricsError(e.to_string()))
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(healthz_handler))
            .with_state(Arc::new(self))
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            info!("Serving metrics on http://{}/metrics", addr);
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

async fn metrics_handler(State(exporter): State<Arc<PrometheusExporter>>) -> Response {
    match exporter.render() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}

async fn healthz_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::registry::{HealthRegistry, SeriesKey, StalenessPolicy};

    #[test]
    fn test_render_contains_series_and_stats() {
        let mut health = HealthRegistry::new();
        let stats = ScrapeStats::new().unwrap();
        let exporter = PrometheusExporter::new(health.reader(), &stats).unwrap();

        let mut builder = health.begin_cycle();
        builder.upsert(SeriesKey::new("10.0.0.7", "node-1:9100"), 1.0);
        health.publish(builder.finish(StalenessPolicy::default()).0);
        stats.cycles.inc();

        let text = exporter.render().unwrap();
        assert!(text.contains(r#"agent_target_health{agent="10.0.0.7",instance="node-1:9100"} 1"#));
        assert!(text.contains("targetwatch_cycles_total 1"));
    }

    #[tokio::test]
    async fn test_http_endpoints() {
        let health = HealthRegistry::new();
        let stats = ScrapeStats::new().unwrap();
        let exporter = PrometheusExporter::new(health.reader(), &stats).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(exporter.serve(listener, async move {
            let _ = rx.await;
        }));

        let client = reqwest::Client::new();
        let resp = client
            .get(format!("http://{}/metrics", addr))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert!(resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        let body = resp.text().await.unwrap();
        assert!(body.contains("targetwatch_cycles_total 0"));

        let resp = client
            .get(format!("http://{}/healthz", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.text().await.unwrap(), "ok");

        drop(client);
        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
