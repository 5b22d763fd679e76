//! Service entry point.

use api::config::{Config, LogFormat};
use api::runtime::Runtime;
use api::state::{Components, Simulation};
use consumer::ShutdownSignal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    init_tracing(&config);

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    let shutdown = ShutdownSignal::new();
    let runtime = Runtime::start(&config, Components::new(Simulation::default()), shutdown.clone()).await?;
    let app = api::create_app(runtime.states(), metrics_handle);
    let supervisor = tokio::spawn(runtime.wait());

    let signals = shutdown.clone();
    tokio::spawn(async move { signals.trigger_on_os_signal().await });

    let addr = config.addr();
    tracing::info!(%addr, service = %config.service, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await?;

    shutdown.trigger();
    supervisor.await??;
    tracing::info!("shut down gracefully");
    Ok(())
}
