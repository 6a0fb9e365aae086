//! Events driving the tunnel manager

use bytes::Bytes;
use devproxy_proto::PeerId;
use std::fmt;
use std::time::Duration;

/// Identifies one connection attempt; never reused within a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Why a connection went away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// TCP connect failed
    ConnectFailed(String),
    /// TCP connect did not finish in time
    ConnectTimedOut(Duration),
    /// The target closed the connection
    Remote,
    /// Read or write failed on an established connection
    Error(String),
    /// The manager dropped the connection
    Local,
}

impl CloseReason {
    /// Whether the connection never became ready
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            CloseReason::ConnectFailed(_) | CloseReason::ConnectTimedOut(_)
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ConnectFailed(e) => write!(f, "connect failed: {}", e),
            CloseReason::ConnectTimedOut(t) => write!(f, "connect timed out after {:?}", t),
            CloseReason::Remote => f.write_str("closed by remote"),
            CloseReason::Error(e) => write!(f, "socket error: {}", e),
            CloseReason::Local => f.write_str("closed locally"),
        }
    }
}

/// Everything the manager reacts to, funnelled through one channel
#[derive(Debug)]
pub enum TunnelEvent {
    /// A peer became reachable
    Paired { peer: PeerId },
    /// A peer sent text to forward to its TCP target
    TextReceived { peer: PeerId, text: String },
    /// TCP connect completed
    SocketReady { peer: PeerId, id: ConnectionId },
    /// The TCP target sent bytes
    SocketData {
        peer: PeerId,
        id: ConnectionId,
        data: Bytes,
    },
    /// The connection is gone, or never came up
    SocketClosed {
        peer: PeerId,
        id: ConnectionId,
        reason: CloseReason,
    },
    /// Stop the manager and drop every connection
    Shutdown,
}
