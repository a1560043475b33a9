//! HTTP/1.1 host for a [`Web`] instance.

use crate::error::ServerError;
use crate::shutdown::ShutdownSignal;
use crate::web::Web;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use keel_core::{PeerAddr, Response};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

impl Web {
    /// Binds the configured listen address and serves until SIGINT or
    /// SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.listen_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let signal = ShutdownSignal::with_os_signals();
        self.serve(listener, async move { signal.recv().await }).await
    }

    /// Serves connections from `listener` until `shutdown` completes, then
    /// drains open connections for up to the shutdown timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let local = listener.local_addr()?;
        tracing::info!(addr = %local, "keel listening");

        let web = Arc::new(self);
        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let web = Arc::clone(&web);
                        let service = service_fn(move |request: http::Request<Incoming>| {
                            let web = Arc::clone(&web);
                            async move {
                                Ok::<_, Infallible>(web.handle_incoming(request, peer).await)
                            }
                        });
                        let conn = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service);
                        let conn = graceful.watch(conn);
                        tokio::spawn(async move {
                            if let Err(e) = conn.await {
                                tracing::debug!(%peer, error = %e, "connection error");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to accept connection"),
                },
                () = &mut shutdown => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }
        drop(listener);

        let timeout = web.shutdown_timeout;
        tokio::select! {
            () = graceful.shutdown() => tracing::info!("all connections closed"),
            () = tokio::time::sleep(timeout) => {
                tracing::warn!(?timeout, "shutdown timeout reached with open connections");
            }
        }
        Ok(())
    }

    async fn handle_incoming(
        &self,
        request: http::Request<Incoming>,
        peer: SocketAddr,
    ) -> Response {
        let (mut parts, body) = request.into_parts();
        parts.extensions.insert(PeerAddr(peer));
        let collected = Limited::new(body, self.body_limit).collect().await;
        let status = match collected {
            Ok(collected) => {
                let request = http::Request::from_parts(parts, Full::new(collected.to_bytes()));
                return self.call(request).await;
            }
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            Err(e) => {
                tracing::debug!(%peer, error = %e, "failed to read request body");
                StatusCode::BAD_REQUEST
            }
        };
        self.reject(http::Request::from_parts(parts, Full::new(Bytes::new())), status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::WebError;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn pong() -> Result<&'static str, WebError> {
        Ok("pong")
    }

    async fn exchange(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    type ServeHandle = tokio::task::JoinHandle<Result<(), ServerError>>;

    async fn start(web: Web) -> (SocketAddr, ShutdownSignal, ServeHandle) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownSignal::new();
        let signal = shutdown.clone();
        let handle = tokio::spawn(web.serve(listener, async move { signal.recv().await }));
        (addr, shutdown, handle)
    }

    #[tokio::test]
    async fn test_serves_envelope_over_tcp() {
        let web = Web::builder().get("/ping", pong).build().unwrap();
        let (addr, shutdown, handle) = start(web).await;

        let response = exchange(
            addr,
            "GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.to_ascii_lowercase().contains("x-request-id:"));
        assert!(response.ends_with(r#"{"code":0,"msg":"Success","data":"pong"}"#));

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit() {
        let web = Web::builder().body_limit(8).post("/ping", pong).build().unwrap();
        let (addr, shutdown, _handle) = start(web).await;

        let response = exchange(
            addr,
            "POST /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nx-request-id: abc\r\nTransfer-Encoding: chunked\r\n\r\n10\r\n0123456789abcdef\r\n0\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 413"));
        assert!(response.to_ascii_lowercase().contains("x-request-id: abc\r\n"));
        assert!(response.contains(r#""code":4413"#));
        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_shutdown_before_first_connection() {
        let web = Web::builder().build().unwrap();
        let (_addr, shutdown, handle) = start(web).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
