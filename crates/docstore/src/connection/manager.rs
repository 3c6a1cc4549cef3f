use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
        PoisonError,
        RwLock,
        Weak,
    },
};

use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::{
    backend::{redact, Backend, BackendResult, Connector, DefaultConnector},
    config::Config,
    connection::shutdown::shutdown_signal,
};

/// Lifecycle state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No usable connection is held.
    Disconnected,
    /// A connect attempt over the candidate list is in progress.
    Connecting,
    /// A connection passed its liveness check and is held.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// A handle on the currently held connection.
///
/// Operations run against the backend without holding any manager lock. The
/// generation ties a failure report back to the exact connection it came from, so
/// a late report cannot tear down a newer connection.
#[derive(Debug, Clone)]
pub struct ActiveConnection {
    /// The live backend.
    pub backend:    Arc<dyn Backend>,
    /// Redacted URI of the endpoint that accepted the connection.
    pub endpoint:   String,
    /// Identifies this connection among all connections made by the manager.
    pub generation: u64,
}

/// Mutable connection state, only ever written by the manager.
#[derive(Debug)]
struct Inner {
    /// Current lifecycle state.
    state:       ConnectionState,
    /// The held connection, present iff `state` is `Connected`.
    active:      Option<ActiveConnection>,
    /// Collections that existed when the connection was established.
    collections: Vec<String>,
}

/// Owns the lifecycle of a single connection to a document store.
///
/// The manager tries an ordered list of candidate URIs, keeps the first one that
/// answers its liveness check and exposes the resulting state. It is explicitly
/// constructed and shared (usually behind an `Arc`) by whoever needs it; there is
/// no process-wide instance.
///
/// # Examples
///
/// ```rust
/// use docstore::{ConnectionManager, ConnectionState};
///
/// # async fn example() {
/// let manager = ConnectionManager::with_default_connector(vec!["memory://".to_owned()]);
/// assert_eq!(manager.connect_default().await, ConnectionState::Connected);
/// assert_eq!(manager.endpoint().as_deref(), Some("memory://"));
/// manager.disconnect().await;
/// assert_eq!(manager.state(), ConnectionState::Disconnected);
/// # }
/// ```
///
/// # Release
///
/// `disconnect` is idempotent. When the manager is dropped while still connected
/// the connection is released from `Drop`; `disconnect_on_shutdown` additionally
/// releases it when the process receives a termination signal.
pub struct ConnectionManager {
    /// Opens backends for candidate URIs.
    connector:      Arc<dyn Connector>,
    /// Candidates used for lazy (re)connection.
    candidates:     Vec<String>,
    /// Connection state.
    inner:          RwLock<Inner>,
    /// Serializes connect attempts.
    connect_lock:   Mutex<()>,
    /// Number of real open attempts made so far.
    attempts:       AtomicUsize,
    /// Source of connection generations.
    generations:    AtomicU64,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("candidates", &self.candidates.iter().map(|c| redact(c)).collect::<Vec<_>>())
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a disconnected manager.
    ///
    /// `candidates` are the defaults used by [`ConnectionManager::connect_default`] and by
    /// lazy reconnection; empty entries stand for unset URIs and are skipped.
    pub fn new(connector: Arc<dyn Connector>, candidates: Vec<String>) -> Self {
        Self {
            connector,
            candidates,
            inner: RwLock::new(Inner {
                state:       ConnectionState::Disconnected,
                active:      None,
                collections: Vec::new(),
            }),
            connect_lock: Mutex::new(()),
            attempts: AtomicUsize::new(0),
            generations: AtomicU64::new(0),
        }
    }

    /// Creates a disconnected manager using the built-in backends.
    pub fn with_default_connector(candidates: Vec<String>) -> Self {
        Self::new(Arc::new(DefaultConnector::default()), candidates)
    }

    /// Creates a disconnected manager from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(DefaultConnector::new(
                config.database.clone(),
                config.connect_timeout,
            )),
            config.candidates(),
        )
    }

    /// Returns the configured default candidates.
    pub fn candidates(&self) -> &[String] { &self.candidates }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState { self.read_inner(|inner| inner.state) }

    /// Returns `true` when a connection is held.
    pub fn is_connected(&self) -> bool { self.state() == ConnectionState::Connected }

    /// Returns the redacted URI of the endpoint in use, if connected.
    pub fn endpoint(&self) -> Option<String> {
        self.read_inner(|inner| {
            inner
                .active
                .as_ref()
                .map(|active| active.endpoint.clone())
        })
    }

    /// Returns the collections that existed when the connection was established.
    pub fn collections(&self) -> Vec<String> { self.read_inner(|inner| inner.collections.clone()) }

    /// Returns how many real connection attempts have been made.
    ///
    /// Skipped empty candidates and idempotent calls while connected are not counted.
    pub fn attempts(&self) -> usize { self.attempts.load(Ordering::Relaxed) }

    /// Returns the held connection, if any.
    pub fn active(&self) -> Option<ActiveConnection> { self.read_inner(|inner| inner.active.clone()) }

    /// Connects using the configured default candidates.
    pub async fn connect_default(&self) -> ConnectionState { self.connect(&self.candidates).await }

    /// Tries `candidates` in order until one answers its liveness check.
    ///
    /// Empty entries are skipped without counting as an attempt. Each remaining
    /// candidate is opened and pinged; the first success is kept together with the
    /// names of the collections that exist at that point. Failures are logged and the
    /// next candidate is tried. Exhausting the list leaves the manager
    /// `Disconnected`, which is reported through the return value rather than an error.
    ///
    /// Calling this while already connected returns immediately without a new attempt.
    pub async fn connect(&self, candidates: &[String]) -> ConnectionState {
        if self.is_connected() {
            trace!("Already connected, skipping connect");
            return ConnectionState::Connected;
        }

        let _attempt = self.connect_lock.lock().await;
        // Another caller may have connected while this one waited for the lock.
        if self.is_connected() {
            return ConnectionState::Connected;
        }

        let mut reset = ResetOnDrop {
            manager: self,
            armed:   true,
        };
        self.write_inner(|inner| inner.state = ConnectionState::Connecting);

        for uri in candidates {
            if uri.trim().is_empty() {
                warn!("No URI set for this candidate, trying the next option");
                continue;
            }
            self.attempts.fetch_add(1, Ordering::Relaxed);
            let endpoint = redact(uri.trim());
            debug!("Attempting connection to {}", endpoint);

            match self.open_candidate(uri.trim()).await {
                Ok((backend, collections)) => {
                    let generation = self
                        .generations
                        .fetch_add(1, Ordering::Relaxed)
                        .wrapping_add(1);
                    self.write_inner(|inner| {
                        inner.state = ConnectionState::Connected;
                        inner.collections = collections;
                        inner.active = Some(ActiveConnection {
                            backend,
                            endpoint: endpoint.clone(),
                            generation,
                        });
                    });
                    reset.armed = false;
                    info!("Connected to document store using URI: {}", endpoint);
                    return ConnectionState::Connected;
                },
                Err(e) => {
                    error!(
                        "Failed to connect using URI: {}, trying the next option: {}",
                        endpoint, e
                    );
                },
            }
        }

        reset.armed = false;
        self.write_inner(|inner| inner.state = ConnectionState::Disconnected);
        warn!("No candidate endpoint could be reached; staying disconnected");
        ConnectionState::Disconnected
    }

    /// Returns the held connection, connecting with the default candidates first if needed.
    pub async fn ensure_connected(&self) -> Option<ActiveConnection> {
        if let Some(active) = self.active() {
            return Some(active);
        }
        debug!("Not connected, attempting lazy connection");
        self.connect_default().await;
        self.active()
    }

    /// Releases the held connection, if any, and becomes `Disconnected`.
    ///
    /// Safe to call any number of times; only the first call after a successful
    /// connect does anything. A connect attempt in flight finishes first and its
    /// connection is then released, so a disconnect is never undone by it.
    pub async fn disconnect(&self) {
        let _attempt = self.connect_lock.lock().await;
        let released = self.write_inner(|inner| {
            inner.state = ConnectionState::Disconnected;
            inner.collections.clear();
            inner.active.take()
        });
        if let Some(active) = released {
            active.backend.close().await;
            info!("Document store connection to {} closed", active.endpoint);
        }
    }

    /// Drops the connection identified by `generation` after a connectivity failure.
    ///
    /// Reports about an older connection than the one currently held are ignored.
    pub async fn report_connectivity_failure(&self, generation: u64) {
        let released = self.write_inner(|inner| {
            match inner.active {
                Some(ref active) if active.generation == generation => {
                    inner.state = ConnectionState::Disconnected;
                    inner.collections.clear();
                    inner.active.take()
                },
                _ => None,
            }
        });
        if let Some(active) = released {
            warn!(
                "Lost connection to {}; the next operation will reconnect",
                active.endpoint
            );
            active.backend.close().await;
        }
    }

    /// Spawns a task that disconnects when the process receives a termination signal.
    ///
    /// See [`ConnectionManager::disconnect_when`].
    pub fn disconnect_on_shutdown(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.disconnect_when(shutdown_signal())
    }

    /// Spawns a task that disconnects once `signal` completes.
    ///
    /// The task only holds a weak reference, so it never keeps the manager alive; if
    /// the manager is gone by then, the task ends without doing anything.
    pub fn disconnect_when<F>(self: &Arc<Self>, signal: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            signal.await;
            if let Some(manager) = manager.upgrade() {
                info!("Shutdown signal received, closing document store connection");
                manager.disconnect().await;
            }
            else {
                trace!("Shutdown signal received after the connection manager was dropped");
            }
        })
    }

    /// Opens and pings one candidate, returning the backend and its collections.
    async fn open_candidate(&self, uri: &str) -> BackendResult<(Arc<dyn Backend>, Vec<String>)> {
        let backend = self.connector.open(uri).await?;
        if let Err(e) = backend.ping().await {
            backend.close().await;
            return Err(e);
        }
        let collections = match backend.list_collection_names().await {
            Ok(collections) => collections,
            Err(e) => {
                warn!("Connected but could not list collections: {}", e);
                Vec::new()
            },
        };
        Ok((backend, collections))
    }

    /// Runs `f` with shared access to the state.
    fn read_inner<T>(&self, f: impl FnOnce(&Inner) -> T) -> T {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&inner)
    }

    /// Runs `f` with exclusive access to the state.
    fn write_inner<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let released = self.write_inner(|inner| {
            inner.state = ConnectionState::Disconnected;
            inner.active.take()
        });
        let Some(active) = released
        else {
            return;
        };
        info!("Releasing document store connection to {}", active.endpoint);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { active.backend.close().await });
        }
    }
}

/// Puts the manager back to `Disconnected` if a connect attempt is abandoned midway.
struct ResetOnDrop<'a> {
    /// The manager being connected.
    manager: &'a ConnectionManager,
    /// Cleared once the attempt reached a final state.
    armed:   bool,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.manager
                .write_inner(|inner| inner.state = ConnectionState::Disconnected);
        }
    }
}
