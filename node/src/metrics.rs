//! # Prometheus Metrics
//!
//! Exposes sale metrics at the `/metrics` HTTP endpoint on the configured
//! metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct SaleMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Purchases that settled.
    pub purchases_total: IntCounter,
    /// Purchases rejected for any reason.
    pub purchase_rejections_total: IntCounter,
    /// Holder-to-holder token transfers.
    pub transfers_total: IntCounter,
    /// Successful finalizations (0 or 1).
    pub finalizations_total: IntCounter,
    /// Current value of the block counter.
    pub block_counter: IntGauge,
    /// Buyer-side tokens issued. Float because issuance outgrows `i64`.
    pub tokens_sold: Gauge,
    /// Value forwarded to the fund recipient.
    pub value_raised: Gauge,
}

impl SaleMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tokensale".into()), None)?;

        let purchases_total = IntCounter::new("purchases_total", "Total number of settled purchases")?;
        registry.register(Box::new(purchases_total.clone()))?;

        let purchase_rejections_total = IntCounter::new(
            "purchase_rejections_total",
            "Total number of rejected purchase attempts",
        )?;
        registry.register(Box::new(purchase_rejections_total.clone()))?;

        let transfers_total = IntCounter::new("transfers_total", "Total number of token transfers")?;
        registry.register(Box::new(transfers_total.clone()))?;

        let finalizations_total =
            IntCounter::new("finalizations_total", "Number of successful finalizations")?;
        registry.register(Box::new(finalizations_total.clone()))?;

        let block_counter = IntGauge::new("block_counter", "Current value of the block counter")?;
        registry.register(Box::new(block_counter.clone()))?;

        let tokens_sold = Gauge::new("tokens_sold", "Buyer-side tokens issued, in base units")?;
        registry.register(Box::new(tokens_sold.clone()))?;

        let value_raised = Gauge::new(
            "value_raised",
            "Value forwarded to the fund recipient, in base units",
        )?;
        registry.register(Box::new(value_raised.clone()))?;

        Ok(Self {
            registry,
            purchases_total,
            purchase_rejections_total,
            transfers_total,
            finalizations_total,
            block_counter,
            tokens_sold,
            value_raised,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<SaleMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
