//! TCP accept loop, grounded on `kumod::smtp_server::EsmtpListenerParams::run`:
//! bind once, then loop `accept()` against a shutdown subscription, spawning
//! one `handle_connection` task per accepted socket. A transient accept
//! error is logged and the loop continues.

use crate::connection::{handle_connection, AppState};
use crate::shutdown::ShutdownSubscription;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Bind the listening socket. Split out from `serve` so that a bind
/// failure can be propagated to the caller (and a non-zero exit code)
/// before anything is spawned, since a bind error is fatal at startup.
pub async fn bind(host: &str, port: u16) -> anyhow::Result<TcpListener> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|err| anyhow::anyhow!("failed to bind to {addr}: {err}"))?;
    tracing::info!(%addr, "sts-resolverd listening");
    Ok(listener)
}

pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    let mut shutting_down = ShutdownSubscription::get();

    loop {
        tokio::select! {
            _ = shutting_down.shutting_down() => {
                tracing::info!("listener on {addr} stopping");
                return Ok(());
            }
            result = listener.accept() => {
                match result {
                    Ok((socket, peer)) => {
                        let state = state.clone();
                        let conn_shutdown = ShutdownSubscription::get();
                        tokio::spawn(async move {
                            tracing::debug!(%peer, "accepted connection");
                            handle_connection(socket, state, conn_shutdown).await;
                            tracing::debug!(%peer, "connection closed");
                        });
                    }
                    Err(err) => {
                        tracing::error!(%err, "transient accept error");
                    }
                }
            }
        }
    }
}
