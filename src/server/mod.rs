//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler function.
//! Supports HTTP/1.1 persistent connections (keep-alive) and stops accepting
//! when a shutdown future resolves.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

const TOO_LARGE: &str = "Request entity too large";

/// The proxy's HTTP server.
///
/// Binds to a TCP address and dispatches incoming HTTP/1.1 requests to a
/// handler function.
///
/// # Examples
///
/// ```rust,no_run
/// use geocache::server::Server;
/// use geocache::http::{Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server
///         .run_until(
///             |_req| async { Response::new(StatusCode::Ok).body("Hello!") },
///             async {
///                 let _ = tokio::signal::ctrl_c().await;
///             },
///         )
///         .await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting connections and dispatching requests to `handler`.
    ///
    /// The handler receives a [`Request`] and must return a [`Future`] that
    /// resolves to a [`Response`]. The handler is wrapped in an [`Arc`] and
    /// shared across all spawned Tokio tasks, so it must be `Send + Sync + 'static`.
    ///
    /// Runs until the process is terminated.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.run_until(handler, std::future::pending()).await
    }

    /// Like [`run`](Self::run), but stops accepting once `shutdown` resolves.
    ///
    /// Connections already accepted keep running on their own tasks until the
    /// peer closes them or the runtime shuts down.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "geocache listening");

        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                () = &mut shutdown => {
                    info!(address = %self.local_addr, "shutting down listener");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, serving every
/// complete request already buffered before reading more, until the peer
/// closes the connection or signals `Connection: close`.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        // Pipelined requests may already be sitting in the buffer.
        if !buf.is_empty() {
            match Request::parse(&buf) {
                Ok((request, body_offset)) => {
                    let content_length = request.content_length().unwrap_or(0);
                    let total_needed = match body_offset.checked_add(content_length) {
                        Some(total) if total <= MAX_REQUEST_SIZE => total,
                        _ => {
                            warn!(
                                peer = %peer_addr,
                                content_length,
                                "declared body too large, sending 413"
                            );
                            reject(&mut stream, StatusCode::PayloadTooLarge, TOO_LARGE).await?;
                            break;
                        }
                    };

                    // Full body received: serve it, otherwise fall through and read.
                    if buf.len() >= total_needed {
                        let keep_alive = request.is_keep_alive();

                        debug!(
                            peer = %peer_addr,
                            method = %request.method(),
                            path = %request.path(),
                            "dispatching request"
                        );

                        let response = handler(request.with_peer_addr(peer_addr)).await;
                        stream.write_all(&response.into_bytes()).await?;
                        stream.flush().await?;

                        // Drop the consumed request bytes from the buffer.
                        let _ = buf.split_to(total_needed);

                        if !keep_alive {
                            debug!(peer = %peer_addr, "closing connection");
                            break;
                        }
                        continue;
                    }
                }
                // Headers not yet fully received.
                Err(RequestError::Incomplete) => {}
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                    let body = format!("Bad Request: {e}");
                    reject(&mut stream, StatusCode::BadRequest, body).await?;
                    break;
                }
            }
        }

        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        // Guard against excessively large requests.
        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large, sending 413");
            reject(&mut stream, StatusCode::PayloadTooLarge, TOO_LARGE).await?;
            break;
        }
    }

    Ok(())
}

/// Writes an error response that closes the connection.
async fn reject(
    stream: &mut TcpStream,
    status: StatusCode,
    body: impl Into<String>,
) -> Result<(), std::io::Error> {
    let response = Response::new(status).body(body).keep_alive(false);
    stream.write_all(&response.into_bytes()).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    use super::*;

    async fn roundtrip(addr: SocketAddr, raw: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn serves_requests_until_shutdown() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        let (stop, stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(server.run_until(
            |req: Request| async move {
                Response::new(StatusCode::Ok).body(req.path().to_owned())
            },
            async {
                let _ = stopped.await;
            },
        ));

        let reply = roundtrip(addr, b"GET /ping HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(reply.ends_with("\r\n\r\n/ping"));

        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn malformed_request_gets_400_and_close() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.run(|_req: Request| async { Response::new(StatusCode::Ok) }));

        let reply = roundtrip(addr, b"\x01\x02 nonsense\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(reply.contains("Connection: close\r\n"));
    }

    // ── Framing ───────────────────────────────────────────────────────────────

    async fn echo_path_server() -> SocketAddr {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.run(|req: Request| async move {
            Response::new(StatusCode::Ok).body(req.path().to_owned())
        }));
        addr
    }

    #[tokio::test]
    async fn overflowing_content_length_gets_413() {
        let addr = echo_path_server().await;
        let raw = b"GET /x HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n";

        let reply = tokio::time::timeout(Duration::from_secs(5), roundtrip(addr, raw))
            .await
            .expect("server should answer without waiting for the body");
        assert!(reply.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        assert!(reply.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn body_over_the_limit_is_rejected_before_it_arrives() {
        let addr = echo_path_server().await;
        let raw = format!(
            "POST /x HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            MAX_REQUEST_SIZE
        );

        let reply = tokio::time::timeout(Duration::from_secs(5), roundtrip(addr, raw.as_bytes()))
            .await
            .unwrap();
        assert!(reply.starts_with("HTTP/1.1 413 "));
    }

    #[tokio::test]
    async fn pipelined_requests_in_one_write_are_all_served() {
        let addr = echo_path_server().await;
        let raw = b"GET /first HTTP/1.1\r\n\r\nGET /second HTTP/1.1\r\nConnection: close\r\n\r\n";

        let reply = tokio::time::timeout(Duration::from_secs(5), roundtrip(addr, raw))
            .await
            .expect("both buffered requests should be answered");
        assert_eq!(reply.matches("HTTP/1.1 200 OK\r\n").count(), 2);
        assert!(reply.contains("\r\n\r\n/first"));
        assert!(reply.ends_with("\r\n\r\n/second"));
    }

    #[tokio::test]
    async fn handler_sees_the_peer_address() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.run(|req: Request| async move {
            let peer = req.peer_addr().map(|a| a.ip().to_string()).unwrap_or_default();
            Response::new(StatusCode::Ok).body(peer)
        }));

        let reply = roundtrip(addr, b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(reply.ends_with("\r\n\r\n127.0.0.1"));
    }

    #[tokio::test]
    async fn bind_failure_names_the_address() {
        let err = Server::bind("not-an-address").await.err().unwrap();
        assert!(err.to_string().starts_with("failed to bind to not-an-address"));
    }
}
