//! Connection registry and idle sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::session::Session;

use super::WriterCommand;

/// Everything the supervisor needs to reach one live connection.
#[derive(Clone)]
pub struct ConnectionEntry {
    pub session: Arc<Mutex<Session>>,
    pub writer: mpsc::Sender<WriterCommand>,
    pub last_activity: Arc<Mutex<Instant>>,
}

/// Registry of live connections, guarded by one lock taken briefly in
/// accept, close and sweep paths.
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<u64, ConnectionEntry>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity,
        }
    }

    /// Register a connection, enforcing the concurrent-connection cap.
    /// Returns `None` when the server is full.
    pub fn try_register(
        &self,
        session: Arc<Mutex<Session>>,
        writer: mpsc::Sender<WriterCommand>,
    ) -> Option<u64> {
        let mut connections = self.connections.lock();
        if connections.len() >= self.capacity {
            warn!(
                active = connections.len(),
                "connection rejected: too many connections"
            );
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        connections.insert(
            id,
            ConnectionEntry {
                session,
                writer,
                last_activity: Arc::new(Mutex::new(Instant::now())),
            },
        );
        info!(conn_id = id, active = connections.len(), "connection registered");
        Some(id)
    }

    /// Record inbound activity on a connection.
    pub fn touch(&self, id: u64) {
        if let Some(entry) = self.connections.lock().get(&id) {
            *entry.last_activity.lock() = Instant::now();
        }
    }

    pub fn remove(&self, id: u64) -> Option<ConnectionEntry> {
        let removed = self.connections.lock().remove(&id);
        if removed.is_some() {
            debug!(conn_id = id, "connection removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Collect and remove connections idle past `timeout`.
    fn take_idle(&self, timeout: Duration) -> Vec<(u64, ConnectionEntry)> {
        let mut connections = self.connections.lock();
        let idle_ids: Vec<u64> = connections
            .iter()
            .filter(|(_, entry)| entry.last_activity.lock().elapsed() > timeout)
            .map(|(id, _)| *id)
            .collect();
        idle_ids
            .into_iter()
            .filter_map(|id| connections.remove(&id).map(|entry| (id, entry)))
            .collect()
    }

    /// Remove and return every live connection (shutdown path).
    pub fn drain(&self) -> Vec<(u64, ConnectionEntry)> {
        self.connections.lock().drain().collect()
    }

    /// Run the periodic idle sweep until the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, timeout: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                let idle = registry.take_idle(timeout);
                for (id, entry) in idle {
                    warn!(conn_id = id, "closing idle connection");
                    close_entry(&entry, "Connection timeout").await;
                }
            }
        })
    }
}

/// Close one connection: emit the session's terminal events best-effort,
/// then close the channel with the given reason.
pub async fn close_entry(entry: &ConnectionEntry, reason: &str) {
    let outputs = entry.session.lock().close();
    for output in outputs {
        if let crate::session::SessionOutput::Frame(frame) = output {
            if entry.writer.send(WriterCommand::Frame(frame)).await.is_err() {
                break;
            }
        }
    }
    let _ = entry
        .writer
        .send(WriterCommand::Close {
            reason: reason.to_string(),
        })
        .await;
}
