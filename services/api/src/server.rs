use crate::cli::ServeArgs;
use crate::infra::{AppState, LogNotificationPublisher};
use crate::routes::with_loyalty_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use retenza::config::AppConfig;
use retenza::error::AppError;
use retenza::loyalty::{InMemoryLoyaltyStore, LoyaltyService};
use retenza::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryLoyaltyStore::default());
    let loyalty_service = Arc::new(LoyaltyService::new(
        store.clone(),
        store,
        Arc::new(LogNotificationPublisher),
        config.loyalty.clone(),
    ));

    let app = with_loyalty_routes(loyalty_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        default_tier = %config.loyalty.default_tier_name,
        "retenza loyalty service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
