//! Local HTTP server exposing the record store to viewers
//!
//! | Method | Path | Response |
//! |---|---|---|
//! | GET | `/requests` | JSON array of records, newest first |
//! | GET | `/request/{id}` | JSON record, or 404 `Request not found` |
//! | GET | `/events` | `text/event-stream`: snapshot, then live records |
//! | POST | `/clear` | `{"success": true}` |
//! | OPTIONS | any | 204 |

mod connection_pool;
mod routes;
mod sse;

use connection_pool::ConnectionPool;
pub use sse::{encode_frame, event_stream, KEEP_ALIVE_FRAME};

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::{Config, StreamConfig};
use crate::store::RecordStore;
use crate::{NetscopeError, Result};

/// Body type of every viewer API response
pub type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

/// State shared by all connection handlers
pub(crate) struct AppState {
    pub(crate) store: Arc<RecordStore>,
    pub(crate) stream: StreamConfig,
}

/// Viewer API server bound to a local port
pub struct ViewerServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: Connections,
    shutdown_rx: broadcast::Receiver<()>,
}

/// Spawns one task per accepted viewer connection
struct Connections {
    state: Arc<AppState>,
    pool: ConnectionPool,
    shutdown_tx: broadcast::Sender<()>,
}

impl ViewerServer {
    /// Bind the server's listening socket
    ///
    /// # Errors
    ///
    /// Returns [`NetscopeError::Bind`] if the address is unavailable
    pub async fn bind(config: &Config, store: Arc<RecordStore>) -> Result<Self> {
        let addr = config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NetscopeError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        info!("Viewer server listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            connections: Connections {
                state: Arc::new(AppState {
                    store,
                    stream: config.stream.clone(),
                }),
                pool: ConnectionPool::new(config.limits.max_connections),
                shutdown_tx,
            },
            shutdown_rx,
        })
    }

    /// Address the server is listening on
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sender that stops the server and closes every connection
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.connections.shutdown_tx.clone()
    }

    /// Accept and serve viewer connections until shutdown
    ///
    /// The listening socket is released when this returns.
    pub async fn run(self) {
        let Self {
            listener,
            local_addr,
            connections,
            mut shutdown_rx,
        } = self;

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => connections.spawn(stream, peer_addr),
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Viewer server {} shutting down", local_addr);
                    break;
                }
            }
        }
    }
}

impl Connections {
    fn spawn(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let Some(guard) = self.pool.try_acquire() else {
            warn!("Connection limit reached, rejecting {}", peer_addr);
            drop(stream);
            return;
        };

        debug!(
            "Accepted {} ({} active)",
            peer_addr,
            self.pool.active_connections()
        );

        let state = Arc::clone(&self.state);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _guard = guard;
            let service = service_fn(move |request: Request<Incoming>| {
                let response = routes::handle(&request, &state);
                async move { Ok::<_, Infallible>(response) }
            });

            let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);

            tokio::select! {
                result = connection => {
                    if let Err(e) = result {
                        debug!("Connection {} ended with error: {}", peer_addr, e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("Closing connection {}", peer_addr);
                }
            }
        });
    }
}
