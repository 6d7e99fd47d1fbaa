use metrics_exporter_prometheus::PrometheusHandle;
use retenza::loyalty::{NotificationPublisher, PublishError, PushMessage, Tier};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Push adapter that records each message in the service log instead of a device gateway.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LogNotificationPublisher;

impl NotificationPublisher for LogNotificationPublisher {
    fn publish(&self, message: PushMessage) -> Result<(), PublishError> {
        info!(
            business_id = %message.business_id,
            customer_id = %message.customer_id,
            title = %message.title,
            "push notification dispatched"
        );
        Ok(())
    }
}

/// Tier list given on the command line as a JSON array.
#[derive(Debug, Clone)]
pub(crate) struct TierList(pub(crate) Vec<Tier>);

pub(crate) fn parse_tiers(raw: &str) -> Result<TierList, String> {
    serde_json::from_str(raw.trim())
        .map(TierList)
        .map_err(|err| format!("failed to parse tiers as a JSON array ({err})"))
}
