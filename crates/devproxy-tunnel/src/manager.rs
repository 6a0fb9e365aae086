//! Tunnel Manager - one TCP tunnel per peer
//!
//! The manager is an actor: every state change happens inside [`TunnelManager::step`],
//! driven by [`TunnelEvent`]s arriving on a single channel. Peer events come in
//! through a [`TunnelHandle`]; socket events come from the connection tasks the
//! manager spawns. Because only the actor touches the tunnel map, no locking is
//! needed and events for one peer are handled in arrival order.

use crate::config::TunnelConfig;
use crate::connection::ConnectionTask;
use crate::endpoint::PeerEndpoint;
use crate::event::{CloseReason, ConnectionId, TunnelEvent};
use crate::tunnel::{ConnectionHandle, Tunnel, TunnelState};
use bytes::Bytes;
use devproxy_proto::{PeerId, CONNECTION_LOST_NOTICE};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Errors returned by [`TunnelHandle`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    #[error("Tunnel manager has stopped")]
    ManagerStopped,
}

/// Cloneable sender for peer events
#[derive(Debug, Clone)]
pub struct TunnelHandle {
    events: mpsc::UnboundedSender<TunnelEvent>,
}

impl TunnelHandle {
    /// Report that a peer became reachable
    pub fn paired(&self, peer: impl Into<PeerId>) -> Result<(), TunnelError> {
        self.send(TunnelEvent::Paired { peer: peer.into() })
    }

    /// Report a text message from a peer
    pub fn text_received(
        &self,
        peer: impl Into<PeerId>,
        text: impl Into<String>,
    ) -> Result<(), TunnelError> {
        self.send(TunnelEvent::TextReceived {
            peer: peer.into(),
            text: text.into(),
        })
    }

    /// Ask the manager to drop all connections and stop
    pub fn shutdown(&self) -> Result<(), TunnelError> {
        self.send(TunnelEvent::Shutdown)
    }

    fn send(&self, event: TunnelEvent) -> Result<(), TunnelError> {
        self.events
            .send(event)
            .map_err(|_| TunnelError::ManagerStopped)
    }
}

/// Owns the peer -> tunnel map and every TCP connection
pub struct TunnelManager {
    config: Arc<TunnelConfig>,
    endpoint: Arc<dyn PeerEndpoint>,
    tunnels: HashMap<PeerId, Tunnel>,
    next_connection_id: u64,
    events_tx: mpsc::UnboundedSender<TunnelEvent>,
    events_rx: mpsc::UnboundedReceiver<TunnelEvent>,
}

impl TunnelManager {
    /// Create a manager and the handle used to feed it peer events
    pub fn new(config: TunnelConfig, endpoint: Arc<dyn PeerEndpoint>) -> (Self, TunnelHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = TunnelHandle {
            events: events_tx.clone(),
        };

        info!(target = %config.target_addr(), "Creating tunnel manager");

        let manager = Self {
            config: Arc::new(config),
            endpoint,
            tunnels: HashMap::new(),
            next_connection_id: 1,
            events_tx,
            events_rx,
        };

        (manager, handle)
    }

    /// Another handle to this manager
    pub fn handle(&self) -> TunnelHandle {
        TunnelHandle {
            events: self.events_tx.clone(),
        }
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Process events until shut down
    pub async fn run(mut self) {
        while self.step().await {}
        info!("Tunnel manager stopped");
    }

    /// Wait for the next event and apply it. Returns false once shut down.
    pub async fn step(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => self.handle_event(event).await,
            None => false,
        }
    }

    /// Apply one event. Returns false for [`TunnelEvent::Shutdown`].
    pub async fn handle_event(&mut self, event: TunnelEvent) -> bool {
        match event {
            TunnelEvent::Paired { peer } => self.on_pairing(peer).await,
            TunnelEvent::TextReceived { peer, text } => self.enqueue_outbound(peer, text),
            TunnelEvent::SocketReady { peer, id } => self.on_socket_ready(&peer, id),
            TunnelEvent::SocketData { peer, id, data } => {
                self.on_socket_data(&peer, id, data).await
            }
            TunnelEvent::SocketClosed { peer, id, reason } => {
                self.on_socket_closed(&peer, id, reason).await
            }
            TunnelEvent::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    /// State of a peer's tunnel, `None` if the peer has never been seen
    pub fn tunnel_state(&self, peer: &PeerId) -> Option<TunnelState> {
        self.tunnels.get(peer).map(Tunnel::state)
    }

    pub fn tunnel(&self, peer: &PeerId) -> Option<&Tunnel> {
        self.tunnels.get(peer)
    }

    /// Number of peers with a tunnel entry
    pub fn tunnel_count(&self) -> usize {
        self.tunnels.len()
    }

    /// Open a connection for `peer` unless one is already connecting or ready.
    /// Never touches an existing queue.
    pub fn ensure_tunnel(&mut self, peer: &PeerId) {
        let tunnel = self.tunnels.entry(peer.clone()).or_default();
        if tunnel.has_connection() {
            return;
        }

        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;

        let (writer, writes) = mpsc::unbounded_channel();
        let task = ConnectionTask {
            peer: peer.clone(),
            id,
            target: self.config.target_addr(),
            connect_timeout: self.config.connect_timeout,
            events: self.events_tx.clone(),
            writes,
        };

        debug!(peer_id = %peer, connection = %id, target = %task.target, "Opening tunnel");

        let task = tokio::spawn(task.run());
        tunnel.attach(ConnectionHandle { id, writer, task });
    }

    /// Queue `text` plus a newline for the peer's TCP target, then flush
    pub fn enqueue_outbound(&mut self, peer: PeerId, text: String) {
        info!(peer_id = %peer, bytes = text.len(), "Received {} bytes from {} device", text.len(), peer);

        self.ensure_tunnel(&peer);

        let limit = self.config.max_pending_bytes;
        let Some(tunnel) = self.tunnels.get_mut(&peer) else {
            return;
        };

        let mut chunk = text;
        chunk.push('\n');

        if tunnel.pending_bytes() + chunk.len() > limit {
            warn!(
                peer_id = %peer,
                pending_bytes = tunnel.pending_bytes(),
                limit = limit,
                "Pending output limit reached, dropping message"
            );
            return;
        }

        tunnel.push(chunk);
        self.flush(&peer);
    }

    /// Write all queued text in one write if the tunnel is ready.
    /// Returns whether anything was written.
    pub fn flush(&mut self, peer: &PeerId) -> bool {
        let Some(tunnel) = self.tunnels.get_mut(peer) else {
            return false;
        };
        let Some(payload) = tunnel.take_pending() else {
            return false;
        };

        debug!(peer_id = %peer, bytes = payload.len(), "Flushing pending output");

        if !tunnel.write(Bytes::from(payload)) {
            debug!(peer_id = %peer, "Connection task already gone, output dropped");
            return false;
        }
        true
    }

    async fn on_pairing(&mut self, peer: PeerId) {
        info!(peer_id = %peer, "Device paired");

        if let Some(greeting) = self.config.greeting_text() {
            self.send_to_peer(&peer, greeting).await;
        }

        self.ensure_tunnel(&peer);
    }

    fn on_socket_ready(&mut self, peer: &PeerId, id: ConnectionId) {
        let Some(tunnel) = self.tunnels.get_mut(peer) else {
            return;
        };
        if !tunnel.is_current(id) {
            debug!(peer_id = %peer, connection = %id, "Ignoring ready event from stale connection");
            return;
        }

        tunnel.mark_ready();
        info!(
            peer_id = %peer,
            target = %self.config.target_addr(),
            "Device {} connected to {}",
            peer,
            self.config.target_addr()
        );

        if let Some(banner) = self.config.render_open_banner(peer) {
            tunnel.write(Bytes::from(banner));
        }

        self.flush(peer);
    }

    async fn on_socket_data(&mut self, peer: &PeerId, id: ConnectionId, data: Bytes) {
        let current = self
            .tunnels
            .get(peer)
            .is_some_and(|tunnel| tunnel.is_current(id));
        if !current {
            debug!(peer_id = %peer, connection = %id, "Ignoring data from stale connection");
            return;
        }

        info!(peer_id = %peer, bytes = data.len(), "Sent {} bytes to {} device", data.len(), peer);

        let text = String::from_utf8_lossy(&data).into_owned();
        self.send_to_peer(peer, text).await;
    }

    async fn on_socket_closed(&mut self, peer: &PeerId, id: ConnectionId, reason: CloseReason) {
        let Some(tunnel) = self.tunnels.get_mut(peer) else {
            return;
        };
        if !tunnel.is_current(id) {
            debug!(peer_id = %peer, connection = %id, "Ignoring close event from stale connection");
            return;
        }

        let discarded = tunnel.pending_len();
        tunnel.reset();

        let target = self.config.target_addr();
        match &reason {
            r if r.is_connect_failure() => {
                warn!(peer_id = %peer, target = %target, reason = %r, "Failed to connect to {}", target);
            }
            CloseReason::Error(e) => {
                warn!(peer_id = %peer, target = %target, error = %e, "Tunnel connection error");
            }
            _ => {}
        }
        info!(
            peer_id = %peer,
            target = %target,
            discarded_chunks = discarded,
            "Device {} disconnected from {}",
            peer,
            target
        );

        self.send_to_peer(peer, CONNECTION_LOST_NOTICE.to_string())
            .await;
    }

    async fn send_to_peer(&self, peer: &PeerId, text: String) {
        if let Err(e) = self.endpoint.send_text(peer, text).await {
            warn!(peer_id = %peer, error = %e, "Failed to send text to peer");
        }
    }

    fn shutdown(&mut self) {
        info!(tunnels = self.tunnels.len(), "Shutting down tunnel manager");
        // Dropping the handles aborts every connection task
        self.tunnels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Greeting;
    use crate::endpoint::ChannelEndpoint;
    use crate::testing::saturated_listener;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const STEP_TIMEOUT: Duration = Duration::from_secs(5);

    fn test_config(port: u16) -> TunnelConfig {
        TunnelConfig::builder()
            .target_host("127.0.0.1")
            .target_port(port)
            .greeting(Greeting::Disabled)
            .build()
            .unwrap()
    }

    fn create_test_manager(
        config: TunnelConfig,
    ) -> (
        TunnelManager,
        TunnelHandle,
        mpsc::UnboundedReceiver<(PeerId, String)>,
    ) {
        let (endpoint, sent) = ChannelEndpoint::new();
        let (manager, handle) = TunnelManager::new(config, Arc::new(endpoint));
        (manager, handle, sent)
    }

    async fn step(manager: &mut TunnelManager) {
        let running = tokio::time::timeout(STEP_TIMEOUT, manager.step())
            .await
            .expect("manager step timed out");
        assert!(running);
    }

    async fn accept(listener: &TcpListener) -> TcpStream {
        let (socket, _) = tokio::time::timeout(STEP_TIMEOUT, listener.accept())
            .await
            .expect("accept timed out")
            .unwrap();
        socket
    }

    async fn read_exact_string(socket: &mut TcpStream, len: usize) -> String {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(STEP_TIMEOUT, socket.read_exact(&mut buf))
            .await
            .expect("read timed out")
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_text_opens_tunnel_and_delivers_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (mut manager, handle, _sent) = create_test_manager(test_config(port));
        let peer = PeerId::from("P1");

        handle.text_received("P1", "hello").unwrap();
        step(&mut manager).await; // TextReceived
        assert_eq!(manager.tunnel_state(&peer), Some(TunnelState::Connecting));
        assert_eq!(manager.tunnel(&peer).unwrap().pending_len(), 1);

        step(&mut manager).await; // SocketReady
        assert_eq!(manager.tunnel_state(&peer), Some(TunnelState::Ready));
        assert_eq!(manager.tunnel(&peer).unwrap().pending_len(), 0);

        let mut socket = accept(&listener).await;
        assert_eq!(read_exact_string(&mut socket, 6).await, "hello\n");
    }

    #[tokio::test]
    async fn test_messages_before_ready_flush_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (mut manager, handle, _sent) = create_test_manager(test_config(port));
        let peer = PeerId::from("P1");

        handle.text_received("P1", "one").unwrap();
        handle.text_received("P1", "two").unwrap();
        handle.text_received("P1", "three").unwrap();

        step(&mut manager).await;
        step(&mut manager).await;
        step(&mut manager).await;
        assert_eq!(manager.tunnel(&peer).unwrap().pending_len(), 3);
        assert_eq!(manager.tunnel_count(), 1);

        step(&mut manager).await; // SocketReady
        assert_eq!(manager.tunnel(&peer).unwrap().pending_len(), 0);

        let mut socket = accept(&listener).await;
        assert_eq!(
            read_exact_string(&mut socket, 14).await,
            "one\ntwo\nthree\n"
        );
    }

    #[tokio::test]
    async fn test_flush_on_empty_queue_writes_nothing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (mut manager, handle, _sent) = create_test_manager(test_config(port));
        let peer = PeerId::from("P1");

        handle.paired("P1").unwrap();
        step(&mut manager).await; // Paired
        step(&mut manager).await; // SocketReady
        assert_eq!(manager.tunnel_state(&peer), Some(TunnelState::Ready));

        assert!(!manager.flush(&peer));
        assert!(!manager.flush(&peer));
        assert!(!manager.flush(&PeerId::from("unknown")));
    }

    #[tokio::test]
    async fn test_open_banner_precedes_queued_text() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = TunnelConfig::builder()
            .target_host("127.0.0.1")
            .target_port(port)
            .greeting(Greeting::Disabled)
            .open_banner(Some("welcome %s".to_string()))
            .build()
            .unwrap();
        let (mut manager, handle, _sent) = create_test_manager(config);

        handle.text_received("P2", "hi").unwrap();
        step(&mut manager).await;
        step(&mut manager).await;

        let mut socket = accept(&listener).await;
        assert_eq!(read_exact_string(&mut socket, 13).await, "welcome P2hi\n");
    }

    #[tokio::test]
    async fn test_socket_data_forwarded_to_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (mut manager, handle, mut sent) = create_test_manager(test_config(port));

        handle.text_received("P1", "ping").unwrap();
        step(&mut manager).await;
        step(&mut manager).await;

        let mut socket = accept(&listener).await;
        socket.write_all(b"pong").await.unwrap();

        step(&mut manager).await; // SocketData
        let (peer, text) = sent.try_recv().unwrap();
        assert_eq!(peer, PeerId::from("P1"));
        assert_eq!(text, "pong");
    }

    #[tokio::test]
    async fn test_remote_close_resets_and_notifies() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (mut manager, handle, mut sent) = create_test_manager(test_config(port));
        let peer = PeerId::from("P1");

        handle.text_received("P1", "hello").unwrap();
        step(&mut manager).await;
        step(&mut manager).await;

        let mut socket = accept(&listener).await;
        assert_eq!(read_exact_string(&mut socket, 6).await, "hello\n");
        drop(socket);

        step(&mut manager).await; // SocketClosed
        let tunnel = manager.tunnel(&peer).unwrap();
        assert_eq!(tunnel.state(), TunnelState::Idle);
        assert!(!tunnel.is_ready());
        assert_eq!(tunnel.pending_len(), 0);

        let (to, text) = sent.try_recv().unwrap();
        assert_eq!(to, peer);
        assert_eq!(text, CONNECTION_LOST_NOTICE);

        // Self-healing: the next message reconnects
        handle.text_received("P1", "again").unwrap();
        step(&mut manager).await;
        step(&mut manager).await;
        assert_eq!(manager.tunnel_state(&peer), Some(TunnelState::Ready));

        let mut socket = accept(&listener).await;
        assert_eq!(read_exact_string(&mut socket, 6).await, "again\n");
    }

    #[tokio::test]
    async fn test_refused_connection_then_retry() {
        let port = free_port().await;
        let (mut manager, handle, mut sent) = create_test_manager(test_config(port));
        let peer = PeerId::from("P1");

        handle.text_received("P1", "first").unwrap();
        step(&mut manager).await; // TextReceived
        step(&mut manager).await; // SocketClosed(ConnectFailed)

        let tunnel = manager.tunnel(&peer).unwrap();
        assert_eq!(tunnel.state(), TunnelState::Idle);
        assert_eq!(tunnel.pending_len(), 0);
        assert_eq!(sent.try_recv().unwrap().1, CONNECTION_LOST_NOTICE);

        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        handle.text_received("P1", "second").unwrap();
        step(&mut manager).await;
        step(&mut manager).await;
        assert_eq!(manager.tunnel_state(&peer), Some(TunnelState::Ready));

        let mut socket = accept(&listener).await;
        assert_eq!(read_exact_string(&mut socket, 7).await, "second\n");
    }

    #[tokio::test]
    async fn test_connect_timeout_resets_and_reconnects() {
        let (_listener, _held, port) = saturated_listener().await;
        let config = TunnelConfig::builder()
            .target_host("127.0.0.1")
            .target_port(port)
            .greeting(Greeting::Disabled)
            .connect_timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let (mut manager, handle, mut sent) = create_test_manager(config);
        let peer = PeerId::from("P1");

        handle.text_received("P1", "first").unwrap();
        step(&mut manager).await; // TextReceived
        let first = manager.tunnel(&peer).unwrap().connection_id();
        assert!(first.is_some());

        step(&mut manager).await; // SocketClosed(ConnectTimedOut)
        let tunnel = manager.tunnel(&peer).unwrap();
        assert_eq!(tunnel.state(), TunnelState::Idle);
        assert_eq!(tunnel.pending_len(), 0);
        assert_eq!(sent.try_recv().unwrap().1, CONNECTION_LOST_NOTICE);

        handle.text_received("P1", "second").unwrap();
        step(&mut manager).await;
        let second = manager.tunnel(&peer).unwrap().connection_id();
        assert!(second.is_some());
        assert_ne!(second, first);
        assert_eq!(manager.tunnel_state(&peer), Some(TunnelState::Connecting));
    }

    #[tokio::test]
    async fn test_large_write_to_echo_target_keeps_reading() {
        const LINE_LEN: usize = 8 * 1024 * 1024;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Echoes each chunk completely before reading the next one
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                if socket.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        });

        let config = TunnelConfig::builder()
            .target_host("127.0.0.1")
            .target_port(port)
            .greeting(Greeting::Disabled)
            .max_pending_bytes(2 * LINE_LEN)
            .build()
            .unwrap();
        let (manager, handle, mut sent) = create_test_manager(config);
        tokio::spawn(manager.run());

        handle.text_received("P1", "x".repeat(LINE_LEN)).unwrap();

        let mut echoed = 0;
        tokio::time::timeout(Duration::from_secs(20), async {
            while echoed < LINE_LEN + 1 {
                let (_, text) = sent.recv().await.unwrap();
                echoed += text.len();
            }
        })
        .await
        .expect("echo target stalled");
        assert_eq!(echoed, LINE_LEN + 1);
    }

    #[tokio::test]
    async fn test_peers_are_isolated() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (mut manager, handle, mut sent) = create_test_manager(test_config(port));
        let p1 = PeerId::from("P1");
        let p2 = PeerId::from("P2");

        handle.text_received("P1", "from-p1").unwrap();
        step(&mut manager).await;
        step(&mut manager).await;
        let mut socket1 = accept(&listener).await;
        assert_eq!(read_exact_string(&mut socket1, 8).await, "from-p1\n");

        handle.text_received("P2", "from-p2").unwrap();
        step(&mut manager).await;
        step(&mut manager).await;
        let mut socket2 = accept(&listener).await;
        assert_eq!(read_exact_string(&mut socket2, 8).await, "from-p2\n");

        assert_ne!(
            manager.tunnel(&p1).unwrap().connection_id(),
            manager.tunnel(&p2).unwrap().connection_id()
        );

        drop(socket1);
        step(&mut manager).await; // P1 SocketClosed

        assert_eq!(manager.tunnel_state(&p1), Some(TunnelState::Idle));
        assert_eq!(manager.tunnel_state(&p2), Some(TunnelState::Ready));
        assert_eq!(sent.try_recv().unwrap().0, p1);

        handle.text_received("P2", "still-here").unwrap();
        step(&mut manager).await;
        assert_eq!(read_exact_string(&mut socket2, 11).await, "still-here\n");
    }

    #[tokio::test]
    async fn test_pairing_sends_greeting_and_opens_tunnel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = TunnelConfig::builder()
            .target_host("127.0.0.1")
            .target_port(port)
            .greeting(Greeting::Custom("hello there".to_string()))
            .build()
            .unwrap();
        let (mut manager, handle, mut sent) = create_test_manager(config);
        let peer = PeerId::from("P3");

        // Both pairings are queued before the connection can report back
        handle.paired("P3").unwrap();
        handle.paired("P3").unwrap();
        step(&mut manager).await;

        assert_eq!(
            sent.try_recv().unwrap(),
            (peer.clone(), "hello there".to_string())
        );
        assert_eq!(manager.tunnel_state(&peer), Some(TunnelState::Connecting));

        // A second pairing greets again but keeps the same connection
        let id = manager.tunnel(&peer).unwrap().connection_id();
        step(&mut manager).await;
        assert_eq!(sent.try_recv().unwrap().1, "hello there");
        assert_eq!(manager.tunnel(&peer).unwrap().connection_id(), id);
    }

    #[tokio::test]
    async fn test_pending_limit_drops_overflow() {
        let port = free_port().await;
        let config = TunnelConfig::builder()
            .target_host("127.0.0.1")
            .target_port(port)
            .greeting(Greeting::Disabled)
            .max_pending_bytes(8)
            .build()
            .unwrap();
        let (mut manager, handle, _sent) = create_test_manager(config);
        let peer = PeerId::from("P1");

        handle.text_received("P1", "1234").unwrap();
        handle.text_received("P1", "5678").unwrap();
        step(&mut manager).await;
        step(&mut manager).await;

        let tunnel = manager.tunnel(&peer).unwrap();
        assert_eq!(tunnel.pending_len(), 1);
        assert_eq!(tunnel.pending_bytes(), 5);
    }

    #[tokio::test]
    async fn test_stale_events_are_ignored() {
        let port = free_port().await;
        let (mut manager, _handle, mut sent) = create_test_manager(test_config(port));
        let peer = PeerId::from("P1");

        manager.ensure_tunnel(&peer);
        let stale = ConnectionId(999);

        manager
            .handle_event(TunnelEvent::SocketReady {
                peer: peer.clone(),
                id: stale,
            })
            .await;
        assert_eq!(manager.tunnel_state(&peer), Some(TunnelState::Connecting));

        manager
            .handle_event(TunnelEvent::SocketClosed {
                peer: peer.clone(),
                id: stale,
                reason: CloseReason::Remote,
            })
            .await;
        assert_eq!(manager.tunnel_state(&peer), Some(TunnelState::Connecting));
        assert!(sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_stops_manager() {
        let (mut manager, handle, _sent) = create_test_manager(test_config(9));
        manager.ensure_tunnel(&PeerId::from("P1"));

        handle.shutdown().unwrap();
        let running = manager.step().await;

        assert!(!running);
        assert_eq!(manager.tunnel_count(), 0);
    }
}
