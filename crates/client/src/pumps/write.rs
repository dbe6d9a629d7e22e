//! WebSocket write pump: serialises outbound frames.

use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Writes outbound envelopes and control frames to the WebSocket.
///
/// Stops when the outbound queue closes or `cancel` fires, then sends a
/// close frame.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut outbound_rx: mpsc::Receiver<String>,
    mut control_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            Some(ctrl) = control_rx.recv() => ctrl,
            text = outbound_rx.recv() => match text {
                Some(text) => tungstenite::Message::Text(text.into()),
                None => {
                    debug!("outbound queue closed");
                    break;
                }
            },
        };

        if let Err(e) = write.send(msg).await {
            error!("WebSocket write error: {e}");
            break;
        }
    }

    cancel.cancel();
    let _ = write.send(tungstenite::Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;
    use std::time::Duration;

    fn capture_sink(
        tx: mpsc::Sender<tungstenite::Message>,
    ) -> impl Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin {
        Box::pin(sink::unfold(tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg).await;
            Ok::<_, tungstenite::Error>(tx)
        }))
    }

    #[tokio::test]
    async fn writes_text_in_order_then_closes() {
        let (sink_tx, mut sink_rx) = mpsc::channel(16);
        let (out_tx, out_rx) = mpsc::channel(16);
        let (_ctrl_tx, ctrl_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(write_pump(capture_sink(sink_tx), out_rx, ctrl_rx, cancel));

        out_tx.send("first".to_string()).await.unwrap();
        out_tx.send("second".to_string()).await.unwrap();
        drop(out_tx);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");

        let mut texts = Vec::new();
        while let Ok(msg) = sink_rx.try_recv() {
            texts.push(msg);
        }
        assert_eq!(texts.len(), 3);
        assert_eq!(texts[0], tungstenite::Message::Text("first".into()));
        assert_eq!(texts[1], tungstenite::Message::Text("second".into()));
        assert!(matches!(texts[2], tungstenite::Message::Close(_)));
    }

    #[tokio::test]
    async fn stops_on_cancel() {
        let (sink_tx, mut sink_rx) = mpsc::channel(16);
        let (_out_tx, out_rx) = mpsc::channel::<String>(16);
        let (_ctrl_tx, ctrl_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let c = cancel.clone();
        let handle = tokio::spawn(write_pump(capture_sink(sink_tx), out_rx, ctrl_rx, c));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");

        let close_msg = sink_rx.recv().await;
        assert!(matches!(close_msg, Some(tungstenite::Message::Close(_))));
    }
}
