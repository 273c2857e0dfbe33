//! Tenant Operator
//!
//! Main entry point for the operator. Sets up the Kubernetes client, starts
//! the metrics server and runs the Tenant controller until a shutdown signal.

use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tenant_operator::{
    config::Config,
    controllers::{tenant_controller, Context},
    leader::LeaderElector,
    metrics,
    store::KubeStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    info!("Starting Tenant Operator");

    let config = Config::from_env().context("Invalid operator configuration")?;
    info!(?config, "Loaded configuration");

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    info!("Connected to Kubernetes API server");

    let shutdown = CancellationToken::new();
    let signal = shutdown_signal();
    tokio::pin!(signal);

    // Start metrics server; standby replicas serve health checks too
    let mut metrics_handle = tokio::spawn(metrics::serve(config.metrics_port, shutdown.clone()));

    let elector = if config.leader_elect {
        let elector = Arc::new(LeaderElector::new(client.clone(), &config));
        tokio::select! {
            _ = elector.acquire() => {}
            _ = &mut signal => {
                info!("Received shutdown signal before acquiring leadership");
                shutdown.cancel();
                return Ok(());
            }
        }
        Some(elector)
    } else {
        None
    };

    let mut leadership = {
        let elector = elector.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            match elector {
                Some(elector) => elector.hold(token).await,
                None => {
                    token.cancelled().await;
                    Ok(())
                }
            }
        })
    };

    // Run the Tenant controller
    let context = Context::new(Arc::new(KubeStore::new(client.clone())), config.clone());
    let mut controller_handle = tokio::spawn(tenant_controller::run(
        client,
        context,
        shutdown.clone(),
    ));

    // Handle graceful shutdown
    let failure = tokio::select! {
        _ = &mut controller_handle => Some(anyhow!("Tenant controller exited unexpectedly")),
        result = &mut metrics_handle => Some(match result {
            Ok(Err(e)) => e.context("Metrics server failed"),
            _ => anyhow!("Metrics server exited unexpectedly"),
        }),
        result = &mut leadership => Some(match result {
            Ok(Err(e)) => anyhow::Error::new(e).context("Lost leadership"),
            _ => anyhow!("Leader election stopped unexpectedly"),
        }),
        _ = &mut signal => {
            info!("Received shutdown signal, stopping operator");
            None
        }
    };

    shutdown.cancel();
    if !controller_handle.is_finished() {
        if let Err(e) = controller_handle.await {
            error!("Tenant controller task failed: {}", e);
        }
    }

    if let Some(elector) = elector {
        if let Err(e) = elector.release().await {
            warn!("Failed to release leader lease: {}", e);
        }
    }

    match failure {
        Some(e) => {
            error!("Tenant Operator stopped: {:#}", e);
            Err(e)
        }
        None => {
            info!("Tenant Operator stopped");
            Ok(())
        }
    }
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tenant_operator=debug,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install CTRL+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
