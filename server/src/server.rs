//! Connection accept loop with graceful shutdown.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::api::ApiServer;

/// Accept connections on `listener` until `shutdown` resolves.
///
/// On shutdown, stops accepting, asks open connections to finish their
/// current request, and aborts whatever is still running after
/// `shutdown_timeout`.
pub async fn serve(
    listener: TcpListener,
    api: Arc<ApiServer>,
    shutdown: impl Future<Output = ()>,
    shutdown_timeout: Duration,
) -> std::io::Result<()> {
    let (closing_tx, closing_rx) = watch::channel(false);
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    info!(addr = %listener.local_addr()?, "Listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };
                debug!(%peer, "Accepted connection");
                connections.spawn(serve_connection(stream, api.clone(), closing_rx.clone()));
            }
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    error!(error = %e, "Connection task panicked");
                }
            }
            _ = &mut shutdown => {
                info!(open_connections = connections.len(), "Shutdown signal received, draining");
                break;
            }
        }
    }

    drop(listener);
    let _ = closing_tx.send(true);

    let drained = tokio::time::timeout(shutdown_timeout, async {
        while connections.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = connections.len(),
            "Shutdown timeout elapsed, aborting open connections"
        );
        connections.abort_all();
    }

    info!("Server stopped");
    Ok(())
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    api: Arc<ApiServer>,
    mut closing: watch::Receiver<bool>,
) {
    let service = service_fn(move |req: Request<Incoming>| {
        let api = api.clone();
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "request",
            %request_id,
            method = %req.method(),
            path = %req.uri().path()
        );
        async move {
            let response = api.handle(req.method(), req.uri()).await;
            info!(status = response.status().as_u16(), "Request completed");
            Ok::<_, Infallible>(response)
        }
        .instrument(span)
    });

    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = closing.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        debug!(error = %e, "Connection closed with error");
    }
}
