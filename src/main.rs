use anyhow::{bail, Result};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sse_gateway_client::config::Settings;
use sse_gateway_client::connection::{ConnectionContext, ConnectionOptions, SseConnection};
use sse_gateway_client::metrics::encode_metrics;
use sse_gateway_client::subscription::{SubscribeOptions, Subscriber};
use sse_gateway_client::transport::Collaborators;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    let settings = Settings::new()?;
    tracing::info!("Configuration loaded");

    if settings.client.channels.is_empty() {
        bail!("no channels configured, set SSE_GATEWAY_CLIENT__CHANNELS (comma separated)");
    }

    let context = ConnectionContext::new();
    let options = ConnectionOptions::from_settings(&settings)
        .on_config_error(|payload, failure| {
            tracing::error!(
                batch_id = failure.batch_id,
                status = ?failure.status,
                subscribe = payload.subscribe.len(),
                unsubscribe = payload.unsubscribe.len(),
                "Gateway rejected configuration"
            );
        })
        .on_reload(|| tracing::warn!("Gateway requested a reload"));

    let connection = SseConnection::new(&context, options, Collaborators::http_defaults()?)?;

    connection.on_error(|fault| {
        tracing::error!(
            error = %fault.message,
            occurred_at = %fault.occurred_at,
            "Push channel error"
        );
    })?;

    connection
        .connect_with(|session| {
            tracing::info!(dispatcher_id = %session.dispatcher_id, "Connected to gateway");
        })
        .await?;

    connection
        .wait_connection_ok(|status| {
            if status.connect_error {
                tracing::warn!(
                    status = status.status_code,
                    attempts = status.connect_error_count,
                    "Gateway unreachable, retrying"
                );
            } else {
                tracing::info!(status = status.status_code, "Gateway reachable");
            }
        })
        .await?;

    let printer = Subscriber::new(|event| {
        println!("{}", event);
    });
    for channel in &settings.client.channels {
        let name = channel.clone();
        connection.subscribe(
            SubscribeOptions::new(channel.clone())
                .callback(printer.clone())
                .on_subscribed(move || tracing::info!(channel = %name, "Subscribed")),
        )?;
    }

    shutdown_signal().await;

    connection.disconnect();
    let stats = connection.stats().await?;
    tracing::info!(
        subscriptions = stats.subscriptions,
        batches = stats.current_batch_id - 1,
        "Client stopped"
    );
    if let Ok(metrics) = encode_metrics() {
        tracing::debug!(metrics = %metrics, "Final metrics");
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, disconnecting");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, disconnecting");
        }
    }
}
