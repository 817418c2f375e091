//! Binds the two listeners (documents + dashboard), optionally over TLS,
//! and ties them to the shutdown token with a bounded grace period.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;

use crate::api;
use crate::state::AppState;

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let server = &state.config.server;
    let docs_addr = SocketAddr::from(([0, 0, 0, 0], server.port));
    let dash_addr = SocketAddr::from(([0, 0, 0, 0], server.effective_dashboard_port()));
    let grace = Duration::from_secs(server.shutdown_grace_seconds);

    let docs_app = api::docs_router().with_state(state.clone());
    let dash_app = api::dashboard_router().with_state(state.clone());

    let handle = Handle::new();
    {
        // In-flight requests get the grace period once shutdown starts.
        let handle = handle.clone();
        let cancel = state.shutdown.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            tracing::info!(grace_seconds = grace.as_secs(), "stopping HTTP listeners");
            handle.graceful_shutdown(Some(grace));
        });
    }

    if server.secure {
        let cert = server
            .tls_certificate
            .clone()
            .context("server.secure without server.tls_certificate")?;
        let key = server
            .tls_private_key
            .clone()
            .context("server.secure without server.tls_private_key")?;
        let tls = RustlsConfig::from_pem_file(cert, key)
            .await
            .context("loading TLS material")?;

        tracing::info!(%docs_addr, %dash_addr, "serving HTTPS");
        let docs = axum_server::bind_rustls(docs_addr, tls.clone())
            .handle(handle.clone())
            .serve(docs_app.into_make_service_with_connect_info::<SocketAddr>());
        let dash = axum_server::bind_rustls(dash_addr, tls)
            .handle(handle)
            .serve(dash_app.into_make_service_with_connect_info::<SocketAddr>());
        tokio::try_join!(docs, dash).context("HTTPS server error")?;
    } else {
        tracing::info!(%docs_addr, %dash_addr, "serving HTTP");
        let docs = axum_server::bind(docs_addr)
            .handle(handle.clone())
            .serve(docs_app.into_make_service_with_connect_info::<SocketAddr>());
        let dash = axum_server::bind(dash_addr)
            .handle(handle)
            .serve(dash_app.into_make_service_with_connect_info::<SocketAddr>());
        tokio::try_join!(docs, dash).context("HTTP server error")?;
    }

    Ok(())
}
