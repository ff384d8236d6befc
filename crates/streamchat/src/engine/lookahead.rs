//! Tool-call look-ahead over a model stream.

use futures::StreamExt;

use super::{ChunkStream, EngineError, MessageChunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// First segment requests at least one tool call.
    ToolCalls,
    /// First segment is plain content, or the stream ended without any.
    Direct,
}

/// A stream whose leading chunks were read to make a [`Decision`].
pub struct Peeked {
    pub decision: Decision,
    buffered: Vec<MessageChunk>,
    rest: ChunkStream,
}

impl Peeked {
    /// Re-attach the buffered chunks in front of the unread remainder.
    pub fn into_stream(self) -> ChunkStream {
        futures::stream::iter(self.buffered.into_iter().map(Ok))
            .chain(self.rest)
            .boxed()
    }
}

impl std::fmt::Debug for Peeked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peeked")
            .field("decision", &self.decision)
            .field("buffered", &self.buffered.len())
            .finish()
    }
}

/// Read up to and including the first chunk that carries text or tool calls.
///
/// Empty leading chunks are kept. The stream handle moves into the returned
/// [`Peeked`]; dropping it closes the upstream stream on either branch.
pub async fn peek_first_segment(mut stream: ChunkStream) -> Result<Peeked, EngineError> {
    let mut buffered = Vec::new();
    let mut decision = Decision::Direct;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let settled = !chunk.is_empty();
        if chunk.has_tool_calls() {
            decision = Decision::ToolCalls;
        }
        buffered.push(chunk);
        if settled {
            break;
        }
    }

    Ok(Peeked {
        decision,
        buffered,
        rest: stream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ToolCallDelta;

    fn stream_of(chunks: Vec<MessageChunk>) -> ChunkStream {
        futures::stream::iter(chunks.into_iter().map(Ok)).boxed()
    }

    #[tokio::test]
    async fn test_plain_content_is_direct_and_replayed_whole() {
        let peeked = peek_first_segment(stream_of(vec![
            MessageChunk::default(),
            MessageChunk::text("Hel"),
            MessageChunk::text("lo"),
        ]))
        .await
        .unwrap();
        assert_eq!(peeked.decision, Decision::Direct);

        let replay: Vec<String> = peeked
            .into_stream()
            .map(|c| c.unwrap().content)
            .collect()
            .await;
        assert_eq!(replay, vec!["", "Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_tool_call_in_first_segment() {
        let call = MessageChunk {
            tool_calls: vec![ToolCallDelta {
                index: 0,
                id: Some("c".to_string()),
                name: Some("web_search_tool".to_string()),
                arguments: String::new(),
            }],
            ..MessageChunk::default()
        };
        let peeked = peek_first_segment(stream_of(vec![call, MessageChunk::text("x")]))
            .await
            .unwrap();
        assert_eq!(peeked.decision, Decision::ToolCalls);
        assert_eq!(peeked.into_stream().count().await, 2);
    }

    #[tokio::test]
    async fn test_empty_stream_is_direct() {
        let peeked = peek_first_segment(stream_of(vec![])).await.unwrap();
        assert_eq!(peeked.decision, Decision::Direct);
        assert_eq!(peeked.into_stream().count().await, 0);
    }

    #[tokio::test]
    async fn test_error_before_first_segment_propagates() {
        let stream = futures::stream::iter(vec![Err::<MessageChunk, _>(EngineError::Model(
            "boom".to_string(),
        ))])
        .boxed();
        assert!(peek_first_segment(stream).await.is_err());
    }
}
