//! `concierge serve`: wire the transport, relay pipeline and status server
//! together and run until a shutdown signal.

use std::{future, path::PathBuf, sync::Arc, time::Duration};

use {
    anyhow::{Context, bail},
    concierge_auto_reply::{
        Dispatcher, DispatcherLimits, PumpExit, RelayPipeline, run_event_pump,
    },
    concierge_channels::Transport,
    concierge_config::{ConciergeConfig, Severity, discover_and_load, validate},
    concierge_functions::BackendFunctions,
    concierge_gateway::{GatewayState, start_gateway},
    concierge_sessions::{ConnectionState, SessionLifecycle, StatusSurface},
    concierge_whatsapp::WhatsAppTransport,
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

/// Upper bound for each shutdown step: closing the WhatsApp session and
/// draining the event pump.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ServeArgs {
    pub config: Option<PathBuf>,
    pub bind: Option<String>,
    pub port: Option<u16>,
}

enum ExitReason {
    Signal,
    TransportFailed,
    GatewayStopped(anyhow::Result<()>),
}

pub async fn handle_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = load_checked_config(&args)?;

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let port = args.port.unwrap_or(config.server.port);

    let lifecycle = Arc::new(SessionLifecycle::new());
    let backend = Arc::new(BackendFunctions::from_config(&config.backend));
    let transport = Arc::new(WhatsAppTransport::from_config(&config));
    let pipeline = Arc::new(RelayPipeline::new(
        &config,
        Arc::clone(&backend) as _,
        backend,
        Arc::clone(&transport) as _,
    ));
    let dispatcher = Dispatcher::new(pipeline, DispatcherLimits::default());

    let shutdown = CancellationToken::new();

    let state = Arc::new(GatewayState::new(
        StatusSurface::new(Arc::clone(&lifecycle)),
        config.business.phone.clone(),
    ));
    let gateway_shutdown = shutdown.clone();
    let mut gateway =
        tokio::spawn(async move { start_gateway(&bind, port, state, gateway_shutdown).await });

    info!(
        transport = transport.id(),
        business_phone = %config.business.phone,
        session = %config.session.name,
        "starting WhatsApp session"
    );
    let pump = match transport.start().await {
        Ok(events) => Some(tokio::spawn(run_event_pump(
            events,
            Arc::clone(&lifecycle),
            dispatcher,
            shutdown.clone(),
        ))),
        Err(e) => {
            error!(error = %e, "WhatsApp session failed to initialize");
            lifecycle.on_init_failed(e.to_string());
            None
        },
    };

    let reason = tokio::select! {
        () = shutdown_signal() => ExitReason::Signal,
        () = transport_failed(&lifecycle, config.server.exit_on_transport_failure) => {
            ExitReason::TransportFailed
        },
        res = &mut gateway => ExitReason::GatewayStopped(
            res.context("status server task panicked").and_then(|r| r),
        ),
    };

    info!("shutting down");
    shutdown.cancel();

    match tokio::time::timeout(CLOSE_TIMEOUT, transport.close()).await {
        Ok(Ok(())) => debug!("WhatsApp session closed"),
        Ok(Err(e)) => warn!(error = %e, "failed to close WhatsApp session"),
        Err(_) => warn!("timed out closing WhatsApp session"),
    }

    if let Some(pump) = pump {
        join_pump(pump, CLOSE_TIMEOUT).await;
    }

    let failed = match reason {
        ExitReason::GatewayStopped(Err(e)) => return Err(e.context("status server stopped")),
        ExitReason::GatewayStopped(Ok(())) => bail!("status server stopped unexpectedly"),
        ExitReason::Signal => false,
        ExitReason::TransportFailed => true,
    };

    match gateway.await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => warn!(error = %e, "status server error"),
        Err(e) => warn!(error = %e, "status server task failed"),
    }

    if failed {
        let detail = lifecycle.snapshot().reason.unwrap_or_default();
        bail!("WhatsApp session failed: {detail}");
    }
    info!("concierge stopped");
    Ok(())
}

/// Wait for the event pump to finish, abandoning it after `limit`.
async fn join_pump(pump: JoinHandle<PumpExit>, limit: Duration) {
    let abort = pump.abort_handle();
    match tokio::time::timeout(limit, pump).await {
        Ok(Ok(exit)) => debug!(?exit, "event pump finished"),
        Ok(Err(e)) => warn!(error = %e, "event pump task failed"),
        Err(_) => {
            warn!("timed out waiting for the event pump, aborting it");
            abort.abort();
        },
    }
}

/// Load config and refuse to start when any setting is missing or invalid.
fn load_checked_config(args: &ServeArgs) -> anyhow::Result<ConciergeConfig> {
    let (config, path) = discover_and_load(args.config.as_deref())?;
    if let Some(path) = &path {
        debug!(path = %path.display(), "config loaded");
    }

    let result = validate(&config);
    for diagnostic in &result.diagnostics {
        match diagnostic.severity {
            Severity::Error => error!("{diagnostic}"),
            Severity::Warning => warn!("{diagnostic}"),
        }
    }
    if result.has_errors() {
        bail!(
            "invalid configuration: {} error(s), run `concierge doctor` for details",
            result.count(Severity::Error)
        );
    }
    Ok(config)
}

/// Resolves once the session enters the failed state, if configured to exit.
async fn transport_failed(lifecycle: &SessionLifecycle, exit_on_failure: bool) {
    if !exit_on_failure {
        return future::pending().await;
    }
    let mut states = lifecycle.subscribe();
    if states
        .wait_for(|s| *s == ConnectionState::Failed)
        .await
        .is_err()
    {
        future::pending::<()>().await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c"),
        () = terminate => info!("received SIGTERM"),
    }
}
