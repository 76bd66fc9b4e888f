use tile_relay::{AppError, AppState, app, config::Config};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tile_relay=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env().map_err(|AppError(err)| err)?;
    tracing::info!(
        addr = %config.addr,
        outbound_capacity = config.relay.outbound_capacity,
        host_leave = %config.relay.host_leave,
        reject_invalid = config.relay.reject_invalid,
        "starting tile relay"
    );

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app(AppState::new(config.relay)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("tile relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
