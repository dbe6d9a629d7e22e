//! One client/backend pair: three pumps sharing a cancellation token.
//!
//! - client read pump: WebSocket frames → backend lines
//! - backend read pump: backend lines → client send queue
//! - client write pump: drains the send queue into the WebSocket
//!
//! Whichever pump stops first cancels the token, which stops the others and
//! closes both sockets.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::SEND_BUFFER_SIZE;
use crate::codec::JsonLinesCodec;
use crate::stats::BridgeStats;

/// Forwards traffic between a WebSocket client and its backend stream until
/// either side closes or `cancel` fires.
pub(crate) async fn run_pair<S>(
    ws: S,
    backend: TcpStream,
    peer: SocketAddr,
    max_message_size: usize,
    stats: Arc<BridgeStats>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<WsMessage, WsError>> + Sink<WsMessage, Error = WsError> + Send + 'static,
{
    let (backend_read, backend_write) = backend.into_split();
    let lines_in = FramedRead::new(backend_read, JsonLinesCodec::new(max_message_size));
    let lines_out = FramedWrite::new(backend_write, JsonLinesCodec::new(max_message_size));

    let (ws_sink, ws_stream) = ws.split();
    let (tx, rx) = mpsc::channel::<WsMessage>(SEND_BUFFER_SIZE);

    tokio::join!(
        client_write_pump(ws_sink, rx, cancel.clone()),
        backend_read_pump(lines_in, tx.clone(), &stats, cancel.clone()),
        client_read_pump(ws_stream, lines_out, tx, &stats, cancel.clone()),
    );

    tracing::debug!(%peer, "pair pumps stopped");
}

/// Drains the send queue into the WebSocket.
async fn client_write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<WsMessage>, cancel: CancellationToken)
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    loop {
        tokio::select! {
            // Queued frames go out before a pending cancellation is honoured.
            biased;

            msg = rx.recv() => {
                match msg {
                    Some(ws_msg) => {
                        if let Err(e) = sink.send(ws_msg).await {
                            tracing::debug!("client write error: {e}");
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = cancel.cancelled() => break,
        }
    }

    cancel.cancel();
    // Best-effort close frame.
    let _ = sink.close().await;
}

/// Splits the backend byte stream into lines and queues each as one text
/// frame.
async fn backend_read_pump(
    mut lines: FramedRead<OwnedReadHalf, JsonLinesCodec>,
    tx: mpsc::Sender<WsMessage>,
    stats: &BridgeStats,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            line = lines.next() => {
                match line {
                    Some(Ok(text)) => {
                        tracing::trace!(len = text.len(), "backend -> client");
                        if tx.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                        stats.frame_to_client();
                    }
                    Some(Err(e)) => {
                        tracing::warn!("backend read error: {e}");
                        break;
                    }
                    None => {
                        tracing::debug!("backend closed the stream");
                        break;
                    }
                }
            }
        }
    }

    cancel.cancel();
}

/// Forwards each client frame to the backend as one line.
async fn client_read_pump<S>(
    mut stream: S,
    mut lines: FramedWrite<OwnedWriteHalf, JsonLinesCodec>,
    tx: mpsc::Sender<WsMessage>,
    stats: &BridgeStats,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text.to_string(),
                    Some(Ok(WsMessage::Binary(data))) => {
                        String::from_utf8_lossy(&data).into_owned()
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = tx.try_send(WsMessage::Pong(data));
                        continue;
                    }
                    Some(Ok(WsMessage::Pong(_))) | Some(Ok(WsMessage::Frame(_))) => continue,
                    Some(Ok(WsMessage::Close(_))) => {
                        tracing::debug!("client sent close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!("client read error: {e}");
                        break;
                    }
                    None => break,
                };

                tracing::trace!(len = text.len(), "client -> backend");
                if let Err(e) = lines.send(text).await {
                    tracing::warn!("backend write error: {e}");
                    break;
                }
                stats.frame_to_backend();
            }
        }
    }

    cancel.cancel();
    // Half-close toward the backend so it sees EOF.
    let _ = lines.close().await;
}
