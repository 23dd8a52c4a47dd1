//! Lifecycle of the native tracking server
//!
//! ```text
//! NotStarted -> Starting -> Running -> Stopping -> Stopped
//!          \-> FailedToStart
//! ```

use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ConfigBlob;
use crate::error::{BridgeError, Result};
use crate::interop::NativeLibrary;

pub const LAUNCH_SERVER: &str = "LaunchServer";
pub const LAUNCH_SERVER_ASYNC: &str = "LaunchServerAsync";
pub const STOP_SERVER: &str = "StopServer";

/// Deadline used by [`with_server`] for the server to accept connections
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    FailedToStart,
}

impl ServerState {
    fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::FailedToStart => "failed to start",
        };
        f.write_str(name)
    }
}

/// Run the server on the calling thread until it exits
pub fn run_blocking(library: &NativeLibrary, config: &ConfigBlob) -> Result<()> {
    let launch = library.bindings().constructor(LAUNCH_SERVER)?;
    let bytes = config.to_bytes()?;
    let size = config_size(&bytes)?;

    info!(address = config.address.as_deref().unwrap_or(""), "Starting server");
    // SAFETY: signature checked by the binding table; the buffer outlives the call.
    let code = unsafe { launch(bytes.as_ptr().cast(), size) };
    if code != 0 {
        return Err(BridgeError::Launch {
            operation: LAUNCH_SERVER.to_string(),
            code,
        });
    }
    Ok(())
}

#[derive(Debug)]
struct Inner {
    state: ServerState,
    id: i64,
}

/// A server launched in the background of the native library
///
/// A server that is still starting or running when dropped is stopped; a failure to stop is
/// logged.
pub struct Server {
    library: Arc<NativeLibrary>,
    config: ConfigBlob,
    inner: Mutex<Inner>,
}

impl Server {
    pub fn new(library: Arc<NativeLibrary>, config: ConfigBlob) -> Self {
        Self {
            library,
            config,
            inner: Mutex::new(Inner {
                state: ServerState::NotStarted,
                id: -1,
            }),
        }
    }

    /// Launch a server in the background
    pub fn start(library: Arc<NativeLibrary>, config: ConfigBlob) -> Result<Self> {
        let server = Self::new(library, config);
        server.launch()?;
        Ok(server)
    }

    /// Launch this server; only valid before the first launch
    pub fn launch(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != ServerState::NotStarted {
            return Err(BridgeError::Config(format!(
                "server is {}, it cannot be launched again",
                inner.state
            )));
        }

        let launch = self.library.bindings().constructor(LAUNCH_SERVER_ASYNC)?;
        // Resolve before launching so a running server can always be stopped.
        self.library.bindings().stop(STOP_SERVER)?;
        let bytes = self.config.to_bytes()?;
        let size = config_size(&bytes)?;

        // SAFETY: signature checked by the binding table; the buffer outlives the call.
        let id = unsafe { launch(bytes.as_ptr().cast(), size) };
        if id < 0 {
            inner.state = ServerState::FailedToStart;
            error!(code = id, "Server failed to start");
            return Err(BridgeError::Launch {
                operation: LAUNCH_SERVER_ASYNC.to_string(),
                code: id,
            });
        }

        inner.state = ServerState::Starting;
        inner.id = id;
        info!(
            id,
            address = self.config.address.as_deref().unwrap_or(""),
            "Server starting"
        );
        Ok(())
    }

    pub fn state(&self) -> ServerState {
        self.inner.lock().state
    }

    /// Handle returned by the launch, `None` before a successful launch
    pub fn id(&self) -> Option<i64> {
        let inner = self.inner.lock();
        (inner.id >= 0).then_some(inner.id)
    }

    pub fn config(&self) -> &ConfigBlob {
        &self.config
    }

    /// Poll the configured address until it accepts TCP connections
    pub fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let state = self.state();
        if state == ServerState::Running {
            return Ok(());
        }
        if state != ServerState::Starting {
            return Err(BridgeError::Config(format!(
                "server is {}, readiness cannot be awaited",
                state
            )));
        }

        let address = self
            .config
            .address
            .clone()
            .ok_or_else(|| BridgeError::Config("server configuration has no address".into()))?;

        let deadline = Instant::now() + timeout;
        loop {
            if probe(&address) {
                let mut inner = self.inner.lock();
                if inner.state == ServerState::Starting {
                    inner.state = ServerState::Running;
                }
                info!(address = %address, "Server is accepting connections");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(address = %address, ?timeout, "Server did not become ready");
                return Err(BridgeError::NotReady { address, timeout });
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Stop the server
    ///
    /// Stopping a server that is not live is a no-op. A failed stop is reported once and not
    /// retried; the server counts as stopped either way.
    pub fn stop(&self) -> Result<()> {
        let id = {
            let mut inner = self.inner.lock();
            if !inner.state.is_live() {
                return Ok(());
            }
            inner.state = ServerState::Stopping;
            inner.id
        };

        let result = self.library.bindings().stop(STOP_SERVER).and_then(|stop| {
            // SAFETY: signature checked; the id came from a successful launch.
            let code = unsafe { stop(id) };
            if code != 0 {
                Err(BridgeError::Shutdown { code })
            } else {
                Ok(())
            }
        });

        self.inner.lock().state = ServerState::Stopped;
        match &result {
            Ok(()) => info!(id, "Server stopped"),
            Err(e) => error!(id, error = %e, "Server did not stop cleanly"),
        }
        result
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.state().is_live() {
            debug!("Stopping server on drop");
            // failure already logged by stop
            let _ = self.stop();
        }
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Server")
            .field("state", &inner.state)
            .field("id", &inner.id)
            .field("address", &self.config.address)
            .finish()
    }
}

/// Run `f` against a started, ready server and stop it afterwards
///
/// The server is stopped on every exit path, including a panic in `f`. A stop failure after
/// `f` returned is reported as the error.
pub fn with_server<T, F>(library: Arc<NativeLibrary>, config: ConfigBlob, f: F) -> Result<T>
where
    F: FnOnce(&Server) -> T,
{
    with_server_timeout(library, config, DEFAULT_READY_TIMEOUT, f)
}

/// [`with_server`] with an explicit readiness deadline, such as `Settings::ready_timeout`
pub fn with_server_timeout<T, F>(
    library: Arc<NativeLibrary>,
    config: ConfigBlob,
    ready_timeout: Duration,
    f: F,
) -> Result<T>
where
    F: FnOnce(&Server) -> T,
{
    let server = Server::start(library, config)?;
    server.wait_until_ready(ready_timeout)?;
    let value = f(&server);
    server.stop()?;
    Ok(value)
}

fn config_size(bytes: &[u8]) -> Result<std::ffi::c_int> {
    std::ffi::c_int::try_from(bytes.len())
        .map_err(|_| BridgeError::Config(format!("configuration of {} bytes is too large", bytes.len())))
}

fn probe(address: &str) -> bool {
    let addrs = match address.to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!(address, error = %e, "Cannot resolve server address");
            return false;
        }
    };
    addrs
        .into_iter()
        .any(|addr| TcpStream::connect_timeout(&addr, POLL_INTERVAL).is_ok())
}
