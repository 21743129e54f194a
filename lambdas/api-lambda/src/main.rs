mod http_handler;

use std::sync::Arc;

use lambda_http::{run, service_fn, Error, Request};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wastelens_shared::{AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .without_time()
                .with_target(false),
        )
        .init();

    let config = AppConfig::from_env()?;
    let state = Arc::new(AppState::from_config(config).await);

    run(service_fn(move |event: Request| {
        let state = state.clone();
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
