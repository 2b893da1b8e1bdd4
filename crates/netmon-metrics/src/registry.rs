//! Exporter registry wrapper and Prometheus text exposition.

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::debug;

use crate::error::{MetricsError, MetricsResult};
use crate::record::PeerMetrics;

/// Content type of the text exposition format.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// The registry scraped by the exporter endpoint.
///
/// `Clone` shares the underlying registry, so the probe loop and the HTTP
/// handler see the same set of records.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    namespace: String,
}

impl MetricsRegistry {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            registry: Registry::new(),
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Build a fresh, unregistered record in this registry's namespace.
    pub fn new_record(&self, source: &str, target: &str) -> MetricsResult<PeerMetrics> {
        PeerMetrics::new(&self.namespace, source, target)
    }

    /// Export a record. All five series are registered as one collector,
    /// so a failure leaves nothing half-registered.
    pub fn register(&self, record: &PeerMetrics) -> MetricsResult<()> {
        match self.registry.register(Box::new(record.clone())) {
            Ok(()) => {
                debug!(peer = %record.target(), "metrics registered");
                Ok(())
            }
            Err(prometheus::Error::AlreadyReg) => {
                Err(MetricsError::Duplicate(record.target().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stop exporting a record. Returns false if it was not registered.
    pub fn unregister(&self, record: &PeerMetrics) -> bool {
        let removed = self.registry.unregister(Box::new(record.clone())).is_ok();
        if removed {
            debug!(peer = %record.target(), "metrics unregistered");
        }
        removed
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Render everything currently registered in the text exposition format.
    pub fn render(&self) -> MetricsResult<String> {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
