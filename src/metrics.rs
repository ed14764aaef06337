//! Request counters and latency histogram, exposed over HTTP in the
//! Prometheus text format.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use tracing::info;

/// Histogram bucket upper bounds in seconds, with their label text.
const BUCKETS: [(&str, f64); 11] = [
    ("0.005", 0.005),
    ("0.01", 0.01),
    ("0.025", 0.025),
    ("0.05", 0.05),
    ("0.1", 0.1),
    ("0.25", 0.25),
    ("0.5", 0.5),
    ("1", 1.0),
    ("2.5", 2.5),
    ("5", 5.0),
    ("10", 10.0),
];

#[derive(Default)]
pub struct Metrics {
    inbound: AtomicU64,
    served: AtomicU64,
    erred: AtomicU64,
    duration_buckets: [AtomicU64; BUCKETS.len()],
    duration_count: AtomicU64,
    duration_sum_micros: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// One datagram arrived on the listener.
    pub fn inc_inbound(&self) {
        self.inbound.fetch_add(1, Ordering::Relaxed);
    }

    /// One request was handled to completion (whatever the rcode).
    pub fn inc_served(&self) {
        self.served.fetch_add(1, Ordering::Relaxed);
    }

    /// One request failed: undecodable inbound or a non-NOERROR response.
    pub fn inc_erred(&self) {
        self.erred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_duration(&self, seconds: f64) {
        for (i, (_, bound)) in BUCKETS.iter().enumerate() {
            if seconds <= *bound {
                self.duration_buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        self.duration_count.fetch_add(1, Ordering::Relaxed);
        self.duration_sum_micros
            .fetch_add((seconds * 1_000_000.0) as u64, Ordering::Relaxed);
    }

    /// Renders every series in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(1024);

        for (name, help, value) in [
            (
                "inbound_dns_requests",
                "Total requests received",
                self.inbound.load(Ordering::Relaxed),
            ),
            (
                "served_dns_requests",
                "Total requests processed",
                self.served.load(Ordering::Relaxed),
            ),
            (
                "erred_dns_requests",
                "Total requests failed",
                self.erred.load(Ordering::Relaxed),
            ),
        ] {
            out.push_str(&format!("# HELP {name} {help}\n"));
            out.push_str(&format!("# TYPE {name} counter\n"));
            out.push_str(&format!("{name} {value}\n"));
        }

        let count = self.duration_count.load(Ordering::Relaxed);
        let sum_secs = self.duration_sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        out.push_str("# HELP duration_dns_request Time spent serving one request\n");
        out.push_str("# TYPE duration_dns_request histogram\n");
        for (i, (label, _)) in BUCKETS.iter().enumerate() {
            let bucket = self.duration_buckets[i].load(Ordering::Relaxed);
            out.push_str(&format!(
                "duration_dns_request_bucket{{le=\"{label}\"}} {bucket}\n"
            ));
        }
        out.push_str(&format!(
            "duration_dns_request_bucket{{le=\"+Inf\"}} {count}\n"
        ));
        out.push_str(&format!("duration_dns_request_sum {sum_secs}\n"));
        out.push_str(&format!("duration_dns_request_count {count}\n"));
        out
    }
}

async fn metrics_endpoint(State(metrics): State<Arc<Metrics>>) -> String {
    metrics.render()
}

/// Serves `GET /metrics` until the process exits.
pub async fn run_metrics_server(port: u16, metrics: Arc<Metrics>) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_endpoint))
        .with_state(metrics);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics endpoint on {addr}"))?;
    info!("Started metrics server on port {port}");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        let metrics = Metrics::new();
        metrics.inc_inbound();
        metrics.inc_inbound();
        metrics.inc_served();
        metrics.inc_erred();

        let text = metrics.render();
        assert!(text.contains("inbound_dns_requests 2\n"));
        assert!(text.contains("served_dns_requests 1\n"));
        assert!(text.contains("erred_dns_requests 1\n"));
        assert!(text.contains("# TYPE inbound_dns_requests counter\n"));
    }

    #[test]
    fn test_histogram_buckets_are_cumulative() {
        let metrics = Metrics::new();
        metrics.observe_duration(0.03);
        metrics.observe_duration(0.2);

        let text = metrics.render();
        assert!(text.contains("duration_dns_request_bucket{le=\"0.025\"} 0\n"));
        assert!(text.contains("duration_dns_request_bucket{le=\"0.05\"} 1\n"));
        assert!(text.contains("duration_dns_request_bucket{le=\"0.25\"} 2\n"));
        assert!(text.contains("duration_dns_request_bucket{le=\"+Inf\"} 2\n"));
        assert!(text.contains("duration_dns_request_count 2\n"));
    }
}
