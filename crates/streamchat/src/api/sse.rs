//! Server-sent events transport for turn streams.

use std::convert::Infallible;

use async_trait::async_trait;
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use streamchat_protocol::StreamEvent;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::chat::{EventSink, TransportError};

/// A frame plus the signal fired once the response body has yielded it.
type Frame = (Event, oneshot::Sender<()>);

/// Sending half of an SSE response. Each event becomes one `data:` frame.
///
/// `send` resolves only after the body has handed the frame to the
/// connection, so a stalled or vanished client holds the turn back instead
/// of letting frames pile up.
pub struct SseSink {
    tx: mpsc::Sender<Frame>,
}

#[async_trait]
impl EventSink for SseSink {
    async fn send(&mut self, event: StreamEvent) -> Result<(), TransportError> {
        let data = serde_json::to_string(&event).map_err(|_| TransportError::Closed)?;
        let (delivered, ack) = oneshot::channel();
        self.tx
            .send((Event::default().data(data), delivered))
            .await
            .map_err(|_| TransportError::Closed)?;
        // the body dropping a queued frame drops its sender too
        ack.await.map_err(|_| TransportError::Closed)
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Response body whose frames come from the paired [`SseSink`].
pub struct SseBody {
    frames: ReceiverStream<Frame>,
}

impl IntoResponse for SseBody {
    fn into_response(self) -> Response {
        let frames = self.frames.map(|(event, delivered)| {
            let _ = delivered.send(());
            Ok::<_, Infallible>(event)
        });
        (
            [
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            Sse::new(frames).keep_alive(KeepAlive::default()),
        )
            .into_response()
    }
}

/// Create a connected sink and response body. Dropping the body (client
/// disconnect) makes pending and further sends fail.
pub fn channel() -> (SseSink, SseBody) {
    let (tx, rx) = mpsc::channel(1);
    (
        SseSink { tx },
        SseBody {
            frames: ReceiverStream::new(rx),
        },
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_frames_and_headers() {
        let (mut sink, body) = channel();
        let sender = tokio::spawn(async move {
            sink.send(StreamEvent::answer("hi")).await.unwrap();
            sink.send(StreamEvent::done()).await.unwrap();
        });

        let response = body.into_response();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        sender.await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(
            text,
            "data: {\"content\":\"hi\",\"thinking\":false,\"done\":false}\n\n\
             data: {\"content\":\"\",\"thinking\":false,\"done\":true}\n\n"
        );
    }

    #[tokio::test]
    async fn test_send_waits_for_body_to_yield_frame() {
        let (mut sink, body) = channel();
        let first = tokio::spawn(async move {
            sink.send(StreamEvent::answer("a")).await.map(|_| sink)
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!first.is_finished(), "send completed with nobody reading");

        let mut data = body.into_response().into_body().into_data_stream();
        let frame = futures::StreamExt::next(&mut data).await.unwrap().unwrap();
        assert!(String::from_utf8(frame.to_vec()).unwrap().contains("\"content\":\"a\""));
        let mut sink = first.await.unwrap().unwrap();

        let second = tokio::spawn(async move { sink.send(StreamEvent::answer("b")).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished(), "second send completed before it was read");

        drop(data);
        assert!(matches!(second.await.unwrap(), Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_dropped_body_closes_sink() {
        let (mut sink, body) = channel();
        drop(body);
        assert!(sink.is_closed());
        assert!(matches!(
            sink.send(StreamEvent::answer("x")).await,
            Err(TransportError::Closed)
        ));
    }
}
