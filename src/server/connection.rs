//! Per-connection service task
//!
//! Drives one WebSocket client on the I/O thread. Three events are handled:
//! a writable notification (write one queued message), inbound frames (only
//! close and errors matter, data is discarded), and a close request from the
//! producer or from server shutdown.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::queue::{Delivery, FailureKind, OutboundMessage};
use crate::registry::Connection;

use super::lifecycle::RelayContext;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Why a connection's service loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseCause {
    /// The relay is stopping
    Shutdown,
    /// The producer gave up on this client
    Scheduled,
    /// A write to the client failed
    WriteFailed,
    /// The client closed or the stream ended
    Peer,
}

impl CloseCause {
    fn close_frame(self) -> Option<CloseFrame> {
        let (code, reason) = match self {
            CloseCause::Shutdown => (CloseCode::Away, "Server shutdown"),
            CloseCause::Scheduled => (CloseCode::Policy, "Send timeout"),
            CloseCause::WriteFailed => (CloseCode::Error, "Write failed"),
            CloseCause::Peer => return None,
        };
        Some(CloseFrame {
            code,
            reason: reason.into(),
        })
    }
}

/// Serve a registered connection until it closes, then tear it down
///
/// Teardown unregisters the connection before failing its pending messages,
/// so the producer never queues onto a connection that will not be drained.
pub(crate) async fn serve(
    conn: Arc<Connection>,
    ws: WebSocketStream<TcpStream>,
    context: &RelayContext,
    shutdown: &CancellationToken,
    poll_timeout: Duration,
) {
    let (mut sink, mut stream) = ws.split();

    let cause = loop {
        tokio::select! {
            biased;

            _ = conn.closed() => {
                break if shutdown.is_cancelled() {
                    CloseCause::Shutdown
                } else {
                    CloseCause::Scheduled
                };
            }

            _ = conn.writable() => {
                let Some(msg) = conn.next_message() else {
                    continue;
                };
                if !write(&conn, &mut sink, msg, context).await {
                    break if shutdown.is_cancelled() {
                        CloseCause::Shutdown
                    } else if conn.is_closing() {
                        CloseCause::Scheduled
                    } else {
                        CloseCause::WriteFailed
                    };
                }
                if conn.has_pending() {
                    conn.request_writable();
                }
            }

            frame = stream.next() => match frame {
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(connection_id = %conn.id(), frame = ?frame, "Client sent close");
                    break CloseCause::Peer;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %conn.id(), error = %e, "Read error");
                    break CloseCause::Peer;
                }
                None => break CloseCause::Peer,
            },
        }
    };

    context.registry.remove(conn.id());
    let failed = conn.teardown();
    context.stats.connection_closed();

    tracing::debug!(
        connection_id = %conn.id(),
        cause = ?cause,
        failed_pending = failed,
        messages_sent = conn.messages_sent(),
        bytes_sent = conn.bytes_sent(),
        messages_dropped = conn.messages_dropped(),
        connected_ms = conn.age().as_millis() as u64,
        "Connection torn down"
    );

    let closing = async {
        if let Some(frame) = cause.close_frame() {
            sink.send(Message::Close(Some(frame))).await?;
        }
        sink.close().await
    };
    if let Ok(Err(e)) = tokio::time::timeout(poll_timeout, closing).await {
        tracing::debug!(connection_id = %conn.id(), error = %e, "Close handshake failed");
    }
}

/// Write one message as a binary frame and signal its completion
///
/// Returns `false` if the connection must be closed.
async fn write(
    conn: &Connection,
    sink: &mut WsSink,
    msg: OutboundMessage,
    context: &RelayContext,
) -> bool {
    let len = msg.len();
    let frame = Message::Binary(msg.data().clone());

    let result = tokio::select! {
        biased;

        _ = conn.closed() => {
            msg.complete(Delivery::Failed(FailureKind::Closed));
            return false;
        }

        result = sink.send(frame) => result,
    };

    match result {
        Ok(()) => {
            conn.record_sent(len);
            context.stats.bytes_written(len);
            msg.complete(Delivery::Delivered);
            true
        }
        Err(e) => {
            tracing::warn!(connection_id = %conn.id(), error = %e, "Write failed");
            msg.complete(Delivery::Failed(FailureKind::Transport));
            false
        }
    }
}
