use noted_server::config::AppConfig;
use noted_server::error::AppError;
use noted_server::routes;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "noted_server=info,tower_http=info".into()),
        )
        .init();

    if let Err(error) = run().await {
        tracing::error!(%error, "Server failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    tracing::info!(?config, "Starting noted-server");

    let state = routes::AppState::from_config(&config)?;
    let router = routes::app_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| AppError::internal(format!("cannot bind {}: {e}", config.bind_addr)))?;
    tracing::info!(addr = %config.bind_addr, "Listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| AppError::internal(format!("server error: {e}")))
}
