//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use chatgate_core::ChannelKey;
use chatgate_core::ids::ConnectionId;
use chatgate_core::wire::CONNECT_ACK;
use chatgate_settings::DispatchOrdering;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::lifecycle::LifecycleHook;
use super::registry::ConnectionRegistry;
use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Time the outbound forwarder gets to flush its close frame.
const FORWARDER_GRACE: Duration = Duration::from_secs(1);

/// Shared state every session needs.
#[derive(Clone)]
pub struct SessionContext {
    /// Connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Frame dispatcher.
    pub dispatcher: Arc<Dispatcher>,
    /// Disconnect hook.
    pub lifecycle: Arc<LifecycleHook>,
    /// Gateway-wide shutdown token.
    pub shutdown: CancellationToken,
    /// Runtime configuration.
    pub config: Arc<ServerConfig>,
}

/// Where inbound frames go once read.
enum Inbound {
    /// Per-connection FIFO worker.
    Serial(mpsc::Sender<String>),
    /// One task per frame.
    Concurrent,
}

/// Run a WebSocket session for a client connected on `channel`.
///
/// 1. Queues the connect acknowledgment, then registers the connection
/// 2. Forwards queued frames and sends periodic Ping frames
/// 3. Dispatches inbound text frames, serially or concurrently
/// 4. Runs the lifecycle hook on disconnect
#[instrument(skip_all, fields(conn_id = %conn_id, channel = %channel))]
pub async fn run_ws_session(ws: WebSocket, conn_id: ConnectionId, channel: ChannelKey, ctx: SessionContext) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(ctx.config.outbound_queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(conn_id.clone(), channel.clone(), send_tx));

    let connection_start = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // The acknowledgment must precede any broadcast the connection can receive.
    let _ = connection.send(Arc::new(CONNECT_ACK.to_owned()));
    let _ = ctx.registry.register(Arc::clone(&connection));

    let ping_every = ctx.config.heartbeat_interval().max(Duration::from_millis(1));
    let silence_limit = ctx.config.heartbeat_timeout();
    let outbound_conn = Arc::clone(&connection);
    let outbound_shutdown = ctx.shutdown.clone();
    let outbound = tokio::spawn(
        async move {
            let mut ping_interval = tokio::time::interval(ping_every);
            let _ = ping_interval.tick().await;

            loop {
                tokio::select! {
                    msg = send_rx.recv() => {
                        let Some(text) = msg else { break };
                        if ws_tx.send(Message::Text((*text).clone().into())).await.is_err() {
                            break;
                        }
                    }
                    _ = ping_interval.tick() => {
                        if !outbound_conn.check_alive() && outbound_conn.last_pong_elapsed() > silence_limit {
                            warn!(timeout = ?silence_limit, "client unresponsive, disconnecting");
                            break;
                        }
                        if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                            break;
                        }
                    }
                    () = outbound_conn.closed() => break,
                    () = outbound_shutdown.cancelled() => break,
                }
            }
            outbound_conn.close();
            let _ = ws_tx.send(Message::Close(None)).await;
        }
        .in_current_span(),
    );

    let inbound = match ctx.config.ordering {
        DispatchOrdering::Serial => {
            let (work_tx, work_rx) = mpsc::channel(ctx.config.outbound_queue_capacity.max(1));
            drop(tokio::spawn(
                serial_worker(
                    Arc::clone(&ctx.dispatcher),
                    channel.clone(),
                    conn_id.clone(),
                    work_rx,
                )
                .in_current_span(),
            ));
            Inbound::Serial(work_tx)
        }
        DispatchOrdering::Concurrent => Inbound::Concurrent,
    };

    loop {
        let frame = tokio::select! {
            () = ctx.shutdown.cancelled() => {
                info!("server shutting down, closing session");
                break;
            }
            () = connection.closed() => break,
            frame = ws_rx.next() => frame,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "websocket read error");
                break;
            }
            None => break,
        };
        connection.mark_alive();

        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => {
                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                    continue;
                }
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match &inbound {
            Inbound::Serial(work_tx) => {
                // A full queue parks here behind a slow handler; stay responsive to teardown.
                let queued = tokio::select! {
                    () = ctx.shutdown.cancelled() => {
                        info!("server shutting down, closing session");
                        false
                    }
                    () = connection.closed() => false,
                    sent = work_tx.send(text) => sent.is_ok(),
                };
                if !queued {
                    break;
                }
            }
            Inbound::Concurrent => {
                let dispatcher = Arc::clone(&ctx.dispatcher);
                let channel = channel.clone();
                let conn_id = conn_id.clone();
                drop(tokio::spawn(
                    async move {
                        let _ = dispatcher.handle_frame(&channel, &conn_id, &text).await;
                    }
                    .in_current_span(),
                ));
            }
        }
    }

    // Queued and in-flight frames still complete; their sends become no-ops.
    drop(inbound);
    connection.close();
    let sync = ctx.lifecycle.on_disconnect(&connection).await;

    info!(?sync, drops = connection.drop_count(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());

    let abort = outbound.abort_handle();
    if tokio::time::timeout(FORWARDER_GRACE, outbound).await.is_err() {
        abort.abort();
    }
}

/// Dispatch one connection's frames strictly in arrival order.
async fn serial_worker(
    dispatcher: Arc<Dispatcher>,
    channel: ChannelKey,
    conn_id: ConnectionId,
    mut frames: mpsc::Receiver<String>,
) {
    while let Some(text) = frames.recv().await {
        let _ = dispatcher.handle_frame(&channel, &conn_id, &text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Addressing, OperationError, OperationHandler, OperationTable, Outcome};
    use crate::websocket::broadcast::Broadcaster;
    use async_trait::async_trait;
    use chatgate_core::ids::ChatId;
    use chatgate_core::wire::{ChatOp, Envelope, OpCode};
    use parking_lot::Mutex;

    /// Records the `messageID` of every frame and sleeps a decreasing amount.
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl OperationHandler for Recorder {
        fn addressing(&self) -> Addressing {
            Addressing::None
        }

        fn acknowledges(&self) -> bool {
            false
        }

        async fn handle(&self, _channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
            let value: serde_json::Value = serde_json::from_str(envelope.raw())?;
            let n = value["n"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(50 - n * 10)).await;
            self.seen.lock().push(n.to_string());
            Ok(Outcome::silent())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn serial_worker_preserves_arrival_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut table = OperationTable::new();
        table.register(
            OpCode::Chat(ChatOp::AppendMessage),
            Recorder {
                seen: Arc::clone(&seen),
            },
        );
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry, 10));
        let dispatcher = Arc::new(Dispatcher::new(table, broadcaster, Duration::from_secs(5)));

        let (tx, rx) = mpsc::channel(8);
        let worker = tokio::spawn(serial_worker(
            dispatcher,
            ChannelKey::Chat(ChatId::from("c1")),
            ConnectionId::from("x"),
            rx,
        ));
        for n in 0..4 {
            tx.send(format!(r#"{{"TCM":"TCM01","n":{n}}}"#)).await.unwrap();
        }
        drop(tx);
        worker.await.unwrap();

        assert_eq!(*seen.lock(), ["0", "1", "2", "3"]);
    }
}
