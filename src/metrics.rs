//! Prometheus metrics and tracing span helpers.
//!
//! Metrics live in a private registry behind [`METRICS`] and are only
//! compiled with the `metrics` feature; span helpers are always available.

#[cfg(feature = "metrics")]
pub use prom::{CatalogMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prom {
    use once_cell::sync::Lazy;
    use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<CatalogMetrics> = Lazy::new(CatalogMetrics::init);

    pub struct CatalogMetrics {
        registry: Registry,
        pub queries_total: IntCounter,
        pub query_errors_total: IntCounter,
        pub query_duration: Histogram,
        pub pool_wait_duration: Histogram,
        pub operations_total: IntCounterVec,
    }

    impl CatalogMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();

            let queries_total = IntCounter::new("stockroom_queries_total", "Total queries executed")
                .expect("valid metric definition");
            let query_errors_total =
                IntCounter::new("stockroom_query_errors_total", "Queries that returned an error")
                    .expect("valid metric definition");
            let query_duration = Histogram::with_opts(HistogramOpts::new(
                "stockroom_query_duration_seconds",
                "Duration of queries",
            ))
            .expect("valid metric definition");
            let pool_wait_duration = Histogram::with_opts(HistogramOpts::new(
                "stockroom_pool_wait_seconds",
                "Time spent waiting for a pooled connection",
            ))
            .expect("valid metric definition");
            let operations_total = IntCounterVec::new(
                Opts::new("stockroom_catalog_operations_total", "Catalog operations by outcome"),
                &["operation", "outcome"],
            )
            .expect("valid metric definition");

            for collector in [
                Box::new(queries_total.clone()) as Box<dyn prometheus::core::Collector>,
                Box::new(query_errors_total.clone()),
                Box::new(query_duration.clone()),
                Box::new(pool_wait_duration.clone()),
                Box::new(operations_total.clone()),
            ] {
                registry.register(collector).expect("metric registered once");
            }

            Self {
                registry,
                queries_total,
                query_errors_total,
                query_duration,
                pool_wait_duration,
                operations_total,
            }
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.queries_total.inc();
            self.query_duration.observe(elapsed.as_secs_f64());
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.inc();
        }

        pub fn observe_pool_wait(&self, elapsed: Duration) {
            self.pool_wait_duration.observe(elapsed.as_secs_f64());
        }

        pub fn record_operation(&self, operation: &str, outcome: &str) {
            self.operations_total.with_label_values(&[operation, outcome]).inc();
        }

        /// Text exposition of every registered metric.
        pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
            let mut buffer = Vec::new();
            TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
            Ok(buffer)
        }
    }
}

pub mod tracing_helpers {
    use tracing::Span;

    pub fn execute_query_span(query: &str) -> Span {
        tracing::debug_span!("stockroom.query", sql = %query)
    }

    pub fn acquire_connection_span() -> Span {
        tracing::debug_span!("stockroom.connect")
    }

    pub fn begin_transaction_span() -> Span {
        tracing::debug_span!("stockroom.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        tracing::debug_span!("stockroom.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        tracing::debug_span!("stockroom.transaction.rollback")
    }

    pub fn catalog_operation_span(operation: &'static str) -> Span {
        tracing::info_span!("stockroom.catalog", operation)
    }
}
