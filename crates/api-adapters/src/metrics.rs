//! Prometheus counters, rendered in the text exposition format at `/metrics`.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OperationLabels {
    op: String,
}

pub struct Metrics {
    registry: Registry,
    submissions: Family<OutcomeLabels, Counter>,
    media_operations: Family<OperationLabels, Counter>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("portfolio");
        let submissions = Family::<OutcomeLabels, Counter>::default();
        let media_operations = Family::<OperationLabels, Counter>::default();
        registry.register(
            "messages_submitted",
            "Contact form submissions by outcome",
            submissions.clone(),
        );
        registry.register(
            "media_operations",
            "Successful gallery operations by kind",
            media_operations.clone(),
        );
        Self {
            registry,
            submissions,
            media_operations,
        }
    }

    pub fn record_submission(&self, outcome: &str) {
        self.submissions
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn record_media(&self, op: &str) {
        self.media_operations
            .get_or_create(&OperationLabels { op: op.to_string() })
            .inc();
    }

    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        encode(&mut out, &self.registry)?;
        Ok(out)
    }
}
