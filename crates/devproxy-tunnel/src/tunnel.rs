//! Per-peer tunnel state

use crate::event::ConnectionId;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Observable state of a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// Entry exists but no connection is live; the next message reconnects
    Idle,
    /// A connection attempt is in flight
    Connecting,
    /// TCP connect completed, writes go straight out
    Ready,
}

/// Owning handle to the task running one TCP connection
#[derive(Debug)]
pub(crate) struct ConnectionHandle {
    pub(crate) id: ConnectionId,
    pub(crate) writer: mpsc::UnboundedSender<Bytes>,
    pub(crate) task: JoinHandle<()>,
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One peer's association with a TCP connection plus its outbound queue
#[derive(Debug, Default)]
pub struct Tunnel {
    connection: Option<ConnectionHandle>,
    ready: bool,
    pending_output: Vec<String>,
    pending_bytes: usize,
}

impl Tunnel {
    pub fn state(&self) -> TunnelState {
        match (&self.connection, self.ready) {
            (None, _) => TunnelState::Idle,
            (Some(_), false) => TunnelState::Connecting,
            (Some(_), true) => TunnelState::Ready,
        }
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Number of queued chunks
    pub fn pending_len(&self) -> usize {
        self.pending_output.len()
    }

    /// Number of queued bytes
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    pub(crate) fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(|c| c.id)
    }

    pub(crate) fn is_current(&self, id: ConnectionId) -> bool {
        self.connection_id() == Some(id)
    }

    pub(crate) fn attach(&mut self, handle: ConnectionHandle) {
        self.connection = Some(handle);
        self.ready = false;
    }

    pub(crate) fn mark_ready(&mut self) {
        if self.connection.is_some() {
            self.ready = true;
        }
    }

    pub(crate) fn push(&mut self, chunk: String) {
        self.pending_bytes += chunk.len();
        self.pending_output.push(chunk);
    }

    /// Drain the queue into one payload, only when ready and non-empty
    pub(crate) fn take_pending(&mut self) -> Option<String> {
        if self.connection.is_none() || !self.ready || self.pending_output.is_empty() {
            return None;
        }

        let payload = self.pending_output.concat();
        self.pending_output.clear();
        self.pending_bytes = 0;
        Some(payload)
    }

    /// Hand bytes to the connection task. Returns false if there is no live writer.
    pub(crate) fn write(&self, data: Bytes) -> bool {
        match &self.connection {
            Some(conn) => conn.writer.send(data).is_ok(),
            None => false,
        }
    }

    /// Back to the idle baseline: no connection, not ready, queue discarded
    pub(crate) fn reset(&mut self) {
        self.connection = None;
        self.ready = false;
        self.pending_output.clear();
        self.pending_bytes = 0;
    }
}
