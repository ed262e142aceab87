//! Inspector lifecycle: debug gate, start/stop, and wiring
//!
//! The host owns an [`Inspector`] and hands its [`Interceptor`] (or a
//! [`CapturingClient`]) to whatever issues network calls. Capture only
//! records while the inspector is running.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::capture::{CaptureClock, CapturingClient, Interceptor};
use crate::config::Config;
use crate::server::ViewerServer;
use crate::store::RecordStore;
use crate::Result;

/// Outcome of [`Inspector::init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    /// Server bound and capture enabled
    Started(SocketAddr),
    /// Already running; nothing changed
    AlreadyRunning(SocketAddr),
    /// Host is not a debuggable build; capture stays off
    NotEnabled,
}

struct RunningServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Traffic inspector owned by the host application
///
/// Dropping a running inspector shuts its server down and disables
/// capture, as `stop` does, without waiting for the server task.
pub struct Inspector {
    config: Config,
    store: Arc<RecordStore>,
    active: Arc<AtomicBool>,
    clock: Arc<CaptureClock>,
    running: Mutex<Option<RunningServer>>,
}

impl Inspector {
    /// Create a stopped inspector
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store: Arc::new(RecordStore::new(config.store.max_requests)),
            config,
            active: Arc::new(AtomicBool::new(false)),
            clock: Arc::new(CaptureClock::default()),
            running: Mutex::new(None),
        })
    }

    /// Start the viewer server and enable capture
    ///
    /// Does nothing on non-debuggable builds. Calling it while running
    /// returns the current address.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NetscopeError::Bind`] if the port is unavailable;
    /// the inspector then stays stopped.
    pub async fn init(&self) -> Result<InitStatus> {
        let mut running = self.running.lock().await;

        if let Some(server) = running.as_ref() {
            return Ok(InitStatus::AlreadyRunning(server.addr));
        }

        if !self.config.debuggable {
            info!("Inspector not enabled: host is not a debuggable build");
            return Ok(InitStatus::NotEnabled);
        }

        let server = ViewerServer::bind(&self.config, Arc::clone(&self.store)).await?;
        let addr = server.local_addr();
        let shutdown_tx = server.shutdown_handle();
        let handle = tokio::spawn(server.run());

        *running = Some(RunningServer {
            addr,
            shutdown_tx,
            handle,
        });
        self.active.store(true, Ordering::Release);

        info!("Inspector started on {}", addr);
        Ok(InitStatus::Started(addr))
    }

    /// Stop the server, release its port and disable capture
    ///
    /// Stored records are kept; a later `init` serves them again.
    pub async fn stop(&self) {
        let Some(server) = self.running.lock().await.take() else {
            return;
        };

        self.active.store(false, Ordering::Release);
        server.shutdown_tx.send(()).ok();

        let timeout = Duration::from_millis(self.config.limits.shutdown_timeout_ms);
        let mut handle = server.handle;
        if tokio::time::timeout(timeout, &mut handle).await.is_err() {
            warn!("Viewer server did not stop within {:?}, aborting", timeout);
            handle.abort();
        }

        info!("Inspector stopped");
    }

    /// Whether capture is enabled
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Address of the running server
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|server| server.addr)
    }

    /// Interceptor feeding this inspector's store
    #[must_use]
    pub fn interceptor(&self) -> Interceptor {
        Interceptor::with_gate(
            Arc::clone(&self.store),
            Arc::clone(&self.active),
            Arc::clone(&self.clock),
            self.config.store.body_preview_limit,
        )
    }

    /// HTTP client whose traffic this inspector records
    #[must_use]
    pub fn client(&self) -> CapturingClient {
        CapturingClient::new(self.interceptor())
    }

    /// The record store
    #[must_use]
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }
}

impl Drop for Inspector {
    fn drop(&mut self) {
        let Some(server) = self.running.get_mut().take() else {
            return;
        };

        self.active.store(false, Ordering::Release);
        server.shutdown_tx.send(()).ok();
        server.handle.abort();
        info!("Inspector dropped, viewer server on {} closed", server.addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Headers;
    use crate::NetscopeError;

    fn debug_config() -> Config {
        Config {
            port: 0,
            debuggable: true,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_not_enabled_in_release_builds() {
        let inspector = Inspector::new(Config {
            debuggable: false,
            ..debug_config()
        })
        .unwrap();

        assert_eq!(inspector.init().await.unwrap(), InitStatus::NotEnabled);
        assert!(!inspector.is_running());

        let capture = inspector
            .interceptor()
            .begin("GET", "http://x", Headers::new(), None);
        assert!(capture.id().is_none());
        assert!(inspector.store().is_empty());
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let inspector = Inspector::new(debug_config()).unwrap();

        let InitStatus::Started(addr) = inspector.init().await.unwrap() else {
            panic!("expected Started");
        };
        assert_eq!(
            inspector.init().await.unwrap(),
            InitStatus::AlreadyRunning(addr)
        );

        inspector.stop().await;
    }

    #[tokio::test]
    async fn test_stop_disables_capture_and_reinit_rebinds() {
        let inspector = Inspector::new(debug_config()).unwrap();
        let interceptor = inspector.interceptor();

        inspector.init().await.unwrap();
        assert!(interceptor.is_active());

        inspector.stop().await;
        assert!(!inspector.is_running());
        assert_eq!(inspector.local_addr().await, None);

        let capture = interceptor.begin("GET", "http://x", Headers::new(), None);
        assert!(capture.id().is_none());

        assert!(matches!(
            inspector.init().await.unwrap(),
            InitStatus::Started(_)
        ));
        assert!(interceptor.is_active());
        inspector.stop().await;
    }

    #[tokio::test]
    async fn test_port_in_use_leaves_inspector_inert() {
        let holder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let inspector = Inspector::new(Config {
            port: holder.local_addr().unwrap().port(),
            ..debug_config()
        })
        .unwrap();

        let result = inspector.init().await;
        assert!(matches!(result, Err(NetscopeError::Bind { .. })));
        assert!(!inspector.is_running());
        assert_eq!(inspector.local_addr().await, None);
    }

    #[tokio::test]
    async fn test_drop_releases_port_and_disables_capture() {
        let inspector = Inspector::new(debug_config()).unwrap();
        let interceptor = inspector.interceptor();
        let InitStatus::Started(addr) = inspector.init().await.unwrap() else {
            panic!("expected Started");
        };

        drop(inspector);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!interceptor.is_active());
        assert!(tokio::net::TcpListener::bind(addr).await.is_ok());
    }

    #[tokio::test]
    async fn test_interceptors_share_capture_clock() {
        let inspector = Inspector::new(debug_config()).unwrap();
        inspector.init().await.unwrap();
        let first = inspector.interceptor();

        let ahead = inspector.clock.now_millis() + 100_000;
        inspector.clock.advance_to(ahead);
        let a = first.begin("GET", "http://x/a", Headers::new(), None);
        let b = inspector
            .interceptor()
            .begin("GET", "http://x/b", Headers::new(), None);

        let a = inspector.store().get(a.id().unwrap()).unwrap();
        let b = inspector.store().get(b.id().unwrap()).unwrap();
        assert_eq!(a.created_at, ahead);
        assert!(b.created_at >= a.created_at);

        inspector.stop().await;
    }

    #[tokio::test]
    async fn test_capture_in_flight_across_stop_completes() {
        let inspector = Inspector::new(debug_config()).unwrap();
        inspector.init().await.unwrap();

        let capture = inspector
            .interceptor()
            .begin("GET", "http://x/slow", Headers::new(), None);
        let id = capture.id().unwrap().to_string();
        inspector.stop().await;
        capture.complete(200, Headers::new(), None);
        inspector.init().await.unwrap();

        assert!(inspector.store().get(&id).unwrap().completed);
        inspector.stop().await;
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = debug_config();
        config.store.max_requests = 0;

        assert!(Inspector::new(config).is_err());
    }
}
