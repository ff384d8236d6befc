//! Single-consumer driver for one turn's event stream.

use async_trait::async_trait;
use streamchat_protocol::StreamEvent;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::normalizer::normalize;
use crate::engine::{EngineError, EventReceiver};
use crate::session::SessionStore;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("client disconnected")]
    Closed,
}

/// Destination of a turn's normalized events.
#[async_trait]
pub trait EventSink: Send {
    /// Deliver one event. An error means the client is gone.
    async fn send(&mut self, event: StreamEvent) -> Result<(), TransportError>;

    fn is_closed(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Started,
    Streaming,
    Committing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Engine finished; the turn is in the session store.
    Completed { answer: String },
    /// Engine failed mid-stream; nothing was committed.
    Faulted { error: String },
    /// Client went away or the run was cancelled; nothing was committed.
    Cancelled,
}

/// Everything needed to stream and commit one turn.
pub struct TurnContext<'a> {
    pub session_id: &'a str,
    pub query: &'a str,
    pub store: &'a dyn SessionStore,
    pub cancel: CancellationToken,
}

struct ActiveTurn<'a> {
    ctx: TurnContext<'a>,
    state: TurnState,
    answer: String,
}

impl ActiveTurn<'_> {
    fn transition(&mut self, next: TurnState) {
        debug!(session_id = self.ctx.session_id, from = ?self.state, to = ?next, "turn state");
        self.state = next;
    }

    /// Stop the engine and close out without committing.
    async fn abandon(&mut self, sink: &mut dyn EventSink) -> TurnOutcome {
        self.ctx.cancel.cancel();
        if !sink.is_closed() {
            let _ = sink.send(StreamEvent::done()).await;
        }
        self.transition(TurnState::Closed);
        TurnOutcome::Cancelled
    }
}

/// Drive a started engine run to completion.
///
/// Events are forwarded in arrival order. On normal end of stream the turn is
/// committed and then exactly one `done` event is sent. A mid-stream engine
/// error still ends with `done` but commits nothing, and neither does a
/// client disconnect, which also cancels the run.
pub async fn run_turn(
    ctx: TurnContext<'_>,
    mut events: EventReceiver,
    sink: &mut dyn EventSink,
) -> TurnOutcome {
    let mut turn = ActiveTurn {
        ctx,
        state: TurnState::Started,
        answer: String::new(),
    };
    turn.transition(TurnState::Streaming);

    loop {
        let next = tokio::select! {
            biased;
            _ = turn.ctx.cancel.cancelled() => return turn.abandon(sink).await,
            next = events.recv() => next,
        };

        match next {
            Some(Ok(raw)) => {
                let normalized = normalize(&raw);
                for event in normalized.events {
                    if sink.send(event).await.is_err() {
                        info!(
                            session_id = turn.ctx.session_id,
                            "client disconnected, cancelling turn"
                        );
                        return turn.abandon(sink).await;
                    }
                }
                if let Some(text) = normalized.answer {
                    turn.answer.push_str(&text);
                }
            }
            Some(Err(EngineError::Cancelled)) => return turn.abandon(sink).await,
            Some(Err(err)) => {
                warn!(session_id = turn.ctx.session_id, error = %err, "engine stream faulted");
                turn.ctx.cancel.cancel();
                let _ = sink.send(StreamEvent::done()).await;
                turn.transition(TurnState::Closed);
                return TurnOutcome::Faulted {
                    error: err.to_string(),
                };
            }
            None => break,
        }
    }

    turn.transition(TurnState::Committing);
    if sink.is_closed() {
        info!(session_id = turn.ctx.session_id, "client gone before commit");
        return turn.abandon(sink).await;
    }

    turn.ctx
        .store
        .append(turn.ctx.session_id, turn.ctx.query, &turn.answer)
        .await;
    if sink.send(StreamEvent::done()).await.is_err() {
        debug!(session_id = turn.ctx.session_id, "done frame not delivered");
    }
    turn.transition(TurnState::Closed);

    info!(
        session_id = turn.ctx.session_id,
        answer_chars = turn.answer.chars().count(),
        "turn committed"
    );
    TurnOutcome::Completed {
        answer: turn.answer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Message, ModelOutput, NodeKind, RawEvent};
    use crate::session::InMemorySessionStore;
    use tokio::sync::mpsc;

    /// Collects events; fails every send after `limit` deliveries.
    #[derive(Default)]
    struct VecSink {
        events: Vec<StreamEvent>,
        limit: Option<usize>,
    }

    #[async_trait]
    impl EventSink for VecSink {
        async fn send(&mut self, event: StreamEvent) -> Result<(), TransportError> {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }
            self.events.push(event);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.limit.is_some_and(|limit| self.events.len() >= limit)
        }
    }

    fn graph(text: &str) -> Result<RawEvent, EngineError> {
        RawEvent::encode(NodeKind::Graph, &Message::assistant(text))
    }

    fn model(text: &str) -> Result<RawEvent, EngineError> {
        RawEvent::encode(
            NodeKind::Model,
            &ModelOutput {
                message: Message::assistant(text),
                token_usage: None,
            },
        )
    }

    fn channel(items: Vec<Result<RawEvent, EngineError>>) -> EventReceiver {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            tx.try_send(item).unwrap();
        }
        rx
    }

    fn ctx<'a>(store: &'a InMemorySessionStore, query: &'a str) -> TurnContext<'a> {
        TurnContext {
            session_id: "s1",
            query,
            store,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_completed_turn_commits_before_single_done() {
        let store = InMemorySessionStore::new();
        let mut sink = VecSink::default();
        let rx = channel(vec![model("think "), graph("Hel"), graph("lo")]);

        let outcome = run_turn(ctx(&store, "hello"), rx, &mut sink).await;

        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                answer: "think Hello".to_string()
            }
        );
        let dones: Vec<_> = sink.events.iter().filter(|e| e.done).collect();
        assert_eq!(dones.len(), 1);
        assert!(sink.events.last().unwrap().done);
        assert_eq!(sink.events.last().unwrap().content, "");

        let turns = store.get("s1").await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "hello");
        assert_eq!(turns[1].content, "think Hello");
    }

    #[tokio::test]
    async fn test_bad_events_do_not_abort_stream() {
        let store = InMemorySessionStore::new();
        let mut sink = VecSink::default();
        let rx = channel(vec![
            Ok(RawEvent::new(NodeKind::Tools, "[{\"role\":\"tool\",\"content\":\"<<garbage>>\",\"tool_call_id\":\"c\",\"tool_name\":\"t\"}]")),
            graph("after"),
        ]);

        let outcome = run_turn(ctx(&store, "q"), rx, &mut sink).await;

        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
        assert_eq!(sink.events.len(), 2);
        assert_eq!(sink.events[0].content, "after");
        assert!(sink.events[1].done);
    }

    #[tokio::test]
    async fn test_disconnect_commits_nothing_and_cancels() {
        let store = InMemorySessionStore::new();
        let mut sink = VecSink {
            limit: Some(1),
            ..VecSink::default()
        };
        let turn_ctx = ctx(&store, "q");
        let cancel = turn_ctx.cancel.clone();
        let rx = channel(vec![graph("a"), graph("b"), graph("c")]);

        let outcome = run_turn(turn_ctx, rx, &mut sink).await;

        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert!(cancel.is_cancelled());
        assert!(store.get("s1").await.is_empty());
    }

    #[tokio::test]
    async fn test_mid_stream_fault_ends_with_done_and_no_commit() {
        let store = InMemorySessionStore::new();
        let mut sink = VecSink::default();
        let rx = channel(vec![graph("partial"), Err(EngineError::Stream("boom".to_string()))]);

        let outcome = run_turn(ctx(&store, "q"), rx, &mut sink).await;

        assert!(matches!(outcome, TurnOutcome::Faulted { .. }));
        assert_eq!(sink.events.len(), 2);
        assert!(sink.events[1].done);
        assert!(store.get("s1").await.is_empty());
    }

    #[tokio::test]
    async fn test_external_cancel_stops_waiting() {
        let store = InMemorySessionStore::new();
        let mut sink = VecSink::default();
        let turn_ctx = ctx(&store, "q");
        let cancel = turn_ctx.cancel.clone();
        let (_tx, rx) = mpsc::channel::<Result<RawEvent, EngineError>>(1);

        cancel.cancel();
        let outcome = run_turn(turn_ctx, rx, &mut sink).await;

        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert!(store.get("s1").await.is_empty());
    }
}
