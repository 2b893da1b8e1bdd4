//! Agent wiring — builds the subsystems, runs both loops and the exporter,
//! and tears everything down on a signal or a fatal error.
//!
//! 1. Connects to the Kubernetes API and opens ICMP sockets
//! 2. Binds the exporter listener
//! 3. Spawns the discovery loop, the probe loop and the HTTP server
//! 4. Waits for SIGINT/SIGTERM, an exporter failure or a probe loop error

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use netmon_cluster::{DiscoveryLoop, KubeMembership, MembershipSource};
use netmon_core::MonitorConfig;
use netmon_health::{IcmpProber, ProbeLoop, Prober};
use netmon_metrics::MetricsRegistry;
use netmon_state::MonitorState;

/// Run the agent until a shutdown signal. Errors are startup failures or
/// fatal runtime failures.
pub async fn run(config: MonitorConfig) -> anyhow::Result<()> {
    info!(node = %config.self_node_name, "netmond starting");

    let membership = KubeMembership::try_default()
        .await
        .context("unable to create kubernetes client")?;
    info!("kubernetes client ready");

    let prober = IcmpProber::new().context("unable to open icmp sockets")?;
    info!("icmp prober ready");

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("unable to bind {}", config.listen_addr))?;

    let state = MonitorState::new(
        config.self_node_name.clone(),
        MetricsRegistry::new(config.namespace.clone()),
    );

    supervise(
        &config,
        state,
        Arc::new(membership),
        Arc::new(prober),
        listener,
        shutdown_signal(),
    )
    .await
}

/// Run the loops and the exporter on already-built parts until `signal`
/// resolves or something fatal happens.
pub async fn supervise<S>(
    config: &MonitorConfig,
    state: MonitorState,
    membership: Arc<dyn MembershipSource>,
    prober: Arc<dyn Prober>,
    listener: TcpListener,
    signal: S,
) -> anyhow::Result<()>
where
    S: Future<Output = ()>,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (fatal_tx, mut fatal_rx) = mpsc::channel::<anyhow::Error>(2);

    // ── Discovery loop ─────────────────────────────────────────
    let discovery = DiscoveryLoop::new(membership, state.clone(), config);
    let discovery_shutdown = shutdown_rx.clone();
    let discovery_handle = tokio::spawn(async move {
        discovery.run(discovery_shutdown).await;
    });

    // ── Probe loop ─────────────────────────────────────────────
    let probes = ProbeLoop::new(prober, state.clone(), config);
    let probe_shutdown = shutdown_rx.clone();
    let probe_fatal = fatal_tx.clone();
    let probe_handle = tokio::spawn(async move {
        if let Err(e) = probes.run(probe_shutdown).await {
            error!(error = %e, "probe loop stopped");
            let _ = probe_fatal
                .send(anyhow::Error::new(e).context("probe loop stopped"))
                .await;
        }
    });

    // ── Exporter ───────────────────────────────────────────────
    let router = netmon_api::build_router(state, &config.metrics_path);
    match listener.local_addr() {
        Ok(addr) => info!(%addr, path = %config.metrics_path, "exporter listening"),
        Err(e) => warn!(error = %e, "exporter listening on unknown address"),
    }

    let mut server_shutdown = shutdown_rx.clone();
    let server_fatal = fatal_tx;
    let server_handle = tokio::spawn(async move {
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await;
        if let Err(e) = served {
            error!(error = %e, "exporter failed");
            let _ = server_fatal
                .send(anyhow::Error::new(e).context("exporter failed"))
                .await;
        }
    });

    // ── Wait for shutdown ──────────────────────────────────────
    let outcome = tokio::select! {
        _ = signal => {
            info!("shutdown signal received");
            None
        }
        Some(e) = fatal_rx.recv() => Some(e),
    };

    let _ = shutdown_tx.send(true);

    let _ = discovery_handle.await;
    let _ = probe_handle.await;
    let _ = server_handle.await;

    match outcome {
        Some(e) => Err(e),
        None => {
            info!("netmond stopped");
            Ok(())
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "unable to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}
