//! TCP connection task
//!
//! One task per connection attempt. It owns the socket, performs the connect,
//! writes whatever the manager hands it, and reports readiness, inbound data
//! and closure back to the manager as events. The manager never touches the
//! socket itself.

use crate::event::{CloseReason, ConnectionId, TunnelEvent};
use bytes::Bytes;
use devproxy_proto::PeerId;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Everything a connection task needs to run
pub(crate) struct ConnectionTask {
    pub(crate) peer: PeerId,
    pub(crate) id: ConnectionId,
    pub(crate) target: String,
    pub(crate) connect_timeout: Duration,
    pub(crate) events: mpsc::UnboundedSender<TunnelEvent>,
    pub(crate) writes: mpsc::UnboundedReceiver<Bytes>,
}

impl ConnectionTask {
    pub(crate) async fn run(self) {
        let ConnectionTask {
            peer,
            id,
            target,
            connect_timeout,
            events,
            mut writes,
        } = self;

        let connect = tokio::time::timeout(connect_timeout, TcpStream::connect(&target)).await;
        let stream = match connect {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                let _ = events.send(TunnelEvent::SocketClosed {
                    peer,
                    id,
                    reason: CloseReason::ConnectFailed(e.to_string()),
                });
                return;
            }
            Err(_) => {
                let _ = events.send(TunnelEvent::SocketClosed {
                    peer,
                    id,
                    reason: CloseReason::ConnectTimedOut(connect_timeout),
                });
                return;
            }
        };

        debug!(peer_id = %peer, connection = %id, target = %target, "TCP connect completed");

        if events
            .send(TunnelEvent::SocketReady {
                peer: peer.clone(),
                id,
            })
            .is_err()
        {
            // Manager is gone
            return;
        }

        let (mut reader, mut writer) = stream.into_split();

        // Both directions run concurrently; a stalled write never stops reads
        let outbound = async {
            while let Some(data) = writes.recv().await {
                if let Err(e) = writer.write_all(&data).await {
                    return CloseReason::Error(e.to_string());
                }
            }
            let _ = writer.shutdown().await;
            CloseReason::Local
        };

        let inbound = async {
            let mut buffer = vec![0u8; READ_BUFFER_SIZE];
            loop {
                match reader.read(&mut buffer).await {
                    Ok(0) => return CloseReason::Remote,
                    Ok(n) => {
                        let event = TunnelEvent::SocketData {
                            peer: peer.clone(),
                            id,
                            data: Bytes::copy_from_slice(&buffer[..n]),
                        };
                        if events.send(event).is_err() {
                            return CloseReason::Local;
                        }
                    }
                    Err(e) => return CloseReason::Error(e.to_string()),
                }
            }
        };

        let reason = tokio::select! {
            reason = outbound => reason,
            reason = inbound => reason,
        };

        debug!(peer_id = %peer, connection = %id, reason = %reason, "TCP connection task ending");

        let _ = events.send(TunnelEvent::SocketClosed { peer, id, reason });
    }
}
