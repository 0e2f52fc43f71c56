use crate::cli::ServeArgs;
use crate::infra::{AppState, Console};
use crate::routes::router;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use device_wizard::config::AppConfig;
use device_wizard::error::AppError;
use device_wizard::telemetry;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut config: AppConfig, mut args: ServeArgs) -> Result<(), AppError> {
    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let console = Console::from_platform(&config.platform)?;
    info!(
        device_types = console.datamodel.device_types().len(),
        iot_device_types = console.datamodel.iotdevice_types().len(),
        classes = console.datamodel.class_files().len(),
        platform_file = %config.platform_file.display(),
        "data model loaded"
    );

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let metrics: Arc<PrometheusHandle> = Arc::new(prometheus_handle);
    let state = AppState::new(console);
    let readiness_flag = state.readiness.clone();

    let app = router(state)
        .route(
            "/metrics",
            get(move || {
                let metrics = metrics.clone();
                async move {
                    (
                        StatusCode::OK,
                        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                        metrics.render(),
                    )
                        .into_response()
                }
            }),
        )
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "device wizard console ready");

    axum::serve(listener, app).await?;
    Ok(())
}
