//! Connectors with scripted behaviour for exercising fallback and failure paths.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::backend::{Backend, BackendError, BackendResult, Connector, MemoryBackend};

/// How a scripted endpoint answers.
#[derive(Debug, Clone)]
pub enum Script {
    /// Opens a fresh in-memory backend on every attempt.
    Reachable,
    /// Opens the same backend on every attempt.
    Shared(Arc<MemoryBackend>),
    /// Fails to open.
    Unreachable,
    /// Opens, then fails the liveness check.
    PingFails,
}

/// Connector answering each URI according to a script and recording every open.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    scripts:  HashMap<String, Script>,
    opened:   Mutex<Vec<String>>,
    backends: Mutex<Vec<Arc<MemoryBackend>>>,
}

impl ScriptedConnector {
    pub fn new() -> Self { Self::default() }

    pub fn reachable(self, uri: &str) -> Self { self.script(uri, Script::Reachable) }

    pub fn shared(self, uri: &str, backend: Arc<MemoryBackend>) -> Self { self.script(uri, Script::Shared(backend)) }

    pub fn unreachable(self, uri: &str) -> Self { self.script(uri, Script::Unreachable) }

    pub fn ping_fails(self, uri: &str) -> Self { self.script(uri, Script::PingFails) }

    fn script(mut self, uri: &str, script: Script) -> Self {
        self.scripts.insert(uri.to_owned(), script);
        self
    }

    /// URIs opened so far, in order.
    pub fn opened(&self) -> Vec<String> { self.opened.lock().unwrap().clone() }

    /// Backends handed out so far, in order.
    pub fn backends(&self) -> Vec<Arc<MemoryBackend>> { self.backends.lock().unwrap().clone() }
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, uri: &str) -> BackendResult<Arc<dyn Backend>> {
        self.opened.lock().unwrap().push(uri.to_owned());
        let backend = match self.scripts.get(uri) {
            Some(Script::Reachable) => Arc::new(MemoryBackend::new()),
            Some(Script::Shared(backend)) => backend.clone(),
            Some(Script::PingFails) => {
                let backend = Arc::new(MemoryBackend::new());
                backend.close().await;
                backend
            },
            Some(Script::Unreachable) | None => {
                return Err(BackendError::Connectivity {
                    reason: format!("{} is unreachable", uri),
                });
            },
        };
        self.backends.lock().unwrap().push(backend.clone());
        Ok(backend)
    }
}
