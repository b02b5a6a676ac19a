use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Binds `host:port` and serves `service` on it until the listener fails.
pub async fn run_http_service<S, E>(host: &str, port: u16, service: S) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<BoxBody<Bytes, E>>, Error = E>
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    E: From<io::Error> + std::error::Error + Send + Sync + 'static,
{
    let listener = TcpListener::bind((host, port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "admin listening");
    serve_connections(listener, service).await
}

/// Accept loop for an already bound listener. Each connection gets its own
/// task speaking HTTP/1 or HTTP/2, whichever the client opens with.
///
/// A connection that dies between the handshake and `accept` is logged and
/// skipped; any other accept error stops the loop.
pub async fn serve_connections<S, E>(listener: TcpListener, service: S) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<BoxBody<Bytes, E>>, Error = E>
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    E: From<io::Error> + std::error::Error + Send + Sync + 'static,
{
    let service = Arc::new(service);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) if is_transient(&err) => {
                tracing::warn!(error = %err, "dropped connection before accept");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %err, "could not disable nagle");
        }

        let service = service.clone();
        tokio::spawn(async move {
            let conn = Builder::new(TokioExecutor::new());
            if let Err(err) = conn.serve_connection(TokioIo::new(stream), service).await {
                tracing::debug!(%peer, error = %err, "connection ended with error");
            }
        });
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

/// Plain-text body for `status`, using its canonical reason phrase.
pub fn make_boxed_error_response<E>(status: StatusCode) -> Response<BoxBody<Bytes, E>>
where
    E: 'static,
{
    let message = status.canonical_reason().unwrap_or("an error occurred");

    let mut response = Response::new(text_body(format!("{message}\n")));
    *response.status_mut() = status;
    response
}

pub fn text_body<E>(text: impl Into<Bytes>) -> BoxBody<Bytes, E>
where
    E: 'static,
{
    Full::new(text.into()).map_err(|e| match e {}).boxed()
}
