//! WebSocket read pump: forwards inbound frames as raw text.

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Reads frames from the WebSocket and queues each text payload on
/// `inbound_tx`.
///
/// Exits on close, error or cancellation. Dropping `inbound_tx` on exit is
/// what tells the connection manager the link is gone.
pub(crate) async fn read_pump<S>(
    mut read: S,
    inbound_tx: mpsc::Sender<String>,
    control_tx: mpsc::Sender<tungstenite::Message>,
    max_message_size: usize,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = read.next() => {
                let text = match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => text.to_string(),
                    Some(Ok(tungstenite::Message::Binary(data))) => {
                        String::from_utf8_lossy(&data).into_owned()
                    }
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        trace!("received ping, sending pong");
                        let _ = control_tx.try_send(tungstenite::Message::Pong(data));
                        continue;
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        debug!(?frame, "server sent close frame");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => break,
                };

                if let Some(text) = accept_frame(text, max_message_size) {
                    if inbound_tx.send(text).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    cancel.cancel();
}

/// Drops oversized and blank frames.
pub(crate) fn accept_frame(text: String, max_message_size: usize) -> Option<String> {
    if text.len() > max_message_size {
        warn!(
            len = text.len(),
            max = max_message_size,
            "dropping oversized inbound frame"
        );
        return None;
    }
    if text.trim().is_empty() {
        trace!("dropping blank inbound frame");
        return None;
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::time::Duration;

    #[test]
    fn oversized_frame_dropped() {
        assert!(accept_frame("x".repeat(11), 10).is_none());
        assert_eq!(accept_frame("x".repeat(10), 10).as_deref(), Some("xxxxxxxxxx"));
    }

    #[test]
    fn blank_frame_dropped() {
        assert!(accept_frame("  \n".into(), 100).is_none());
    }

    #[tokio::test]
    async fn forwards_text_and_binary_then_stops_on_close() {
        let frames = vec![
            Ok(tungstenite::Message::Text(r#"{"type":"a"}"#.into())),
            Ok(tungstenite::Message::Ping(vec![1u8].into())),
            Ok(tungstenite::Message::Binary(br#"{"type":"b"}"#.to_vec().into())),
            Ok(tungstenite::Message::Close(None)),
            Ok(tungstenite::Message::Text("never".into())),
        ];
        let (in_tx, mut in_rx) = mpsc::channel(16);
        let (ctrl_tx, mut ctrl_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        tokio::time::timeout(
            Duration::from_secs(2),
            read_pump(stream::iter(frames), in_tx, ctrl_tx, 1024, cancel.clone()),
        )
        .await
        .expect("should stop");

        assert_eq!(in_rx.recv().await.as_deref(), Some(r#"{"type":"a"}"#));
        assert_eq!(in_rx.recv().await.as_deref(), Some(r#"{"type":"b"}"#));
        assert!(in_rx.recv().await.is_none());
        assert!(matches!(ctrl_rx.try_recv(), Ok(tungstenite::Message::Pong(_))));
        assert!(cancel.is_cancelled());
    }
}
