//! Per-connection read and write loops.
//!
//! Both loops are generic over the transport so they can be driven by an axum
//! WebSocket in production and by in-memory streams and sinks in tests. Either
//! loop ending tears the session down, which signals the other loop to stop.

use std::{fmt::Display, sync::Arc};

use futures_util::{Sink, SinkExt, Stream, StreamExt};

use crate::{
    domain::ChatEvent,
    infrastructure::dto::websocket::{decode_frame, encode_event},
    usecase::{ChatHubHandle, ClientSession, MessagePipeline, SessionOutbound, SessionRateLimiter},
};

/// Transport frame as seen by the read loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Close,
    /// Control frames and anything else the chat protocol does not use
    Other,
}

/// Why a loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The peer closed the connection or the stream ended
    PeerClosed,
    /// Reading from the transport failed
    TransportError,
    /// Writing to the transport failed
    WriteFailed,
    /// The session was closed from elsewhere
    Shutdown,
    /// The hub stopped accepting commands
    HubUnavailable,
}

impl LoopExit {
    /// Whether the transport failed, as opposed to an orderly close
    pub fn is_failure(self) -> bool {
        matches!(self, LoopExit::TransportError | LoopExit::WriteFailed)
    }
}

/// Read frames from the client and feed them through the pipeline
///
/// Every text frame costs one rate-limit token before it is decoded. Frames over
/// the limit and frames that fail to decode are dropped without closing the
/// connection.
pub async fn read_loop<S, E>(
    session: Arc<ClientSession>,
    mut frames: S,
    limiter: SessionRateLimiter,
    pipeline: Arc<MessagePipeline>,
    hub: ChatHubHandle,
) -> LoopExit
where
    S: Stream<Item = Result<InboundFrame, E>> + Unpin,
    E: Display,
{
    let mut shutdown = session.subscribe_shutdown();
    let exit = loop {
        let frame = tokio::select! {
            _ = shutdown.wait_for(|closed| *closed) => break LoopExit::Shutdown,
            frame = frames.next() => frame,
        };

        let text = match frame {
            None | Some(Ok(InboundFrame::Close)) => break LoopExit::PeerClosed,
            Some(Ok(InboundFrame::Other)) => continue,
            Some(Ok(InboundFrame::Text(text))) => text,
            Some(Err(e)) => {
                tracing::warn!("Read error on session '{}': {}", session.id(), e);
                break LoopExit::TransportError;
            }
        };

        if !limiter.allow() {
            tracing::debug!("Session '{}' is over the rate limit, frame dropped", session.id());
            continue;
        }

        let event = match decode_frame(&text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!("Frame from session '{}' discarded: {}", session.id(), e);
                continue;
            }
        };

        if let Err(e) = pipeline.handle(&session, event, &hub).await {
            tracing::warn!("Session '{}' cannot reach the hub: {}", session.id(), e);
            break LoopExit::HubUnavailable;
        }
    };

    tracing::debug!("Read loop of session '{}' ended: {:?}", session.id(), exit);
    exit
}

/// Drain the session's outbound queues into the client
pub async fn write_loop<K>(
    session: Arc<ClientSession>,
    mut outbound: SessionOutbound,
    mut sink: K,
) -> LoopExit
where
    K: Sink<String> + Unpin,
    K::Error: Display,
{
    let exit = loop {
        let event = tokio::select! {
            _ = outbound.shutdown.wait_for(|closed| *closed) => break LoopExit::Shutdown,
            Some(ping) = outbound.pings.recv() => ChatEvent::Ping(ping),
            Some(message) = outbound.mailbox.recv() => ChatEvent::Message(message),
            Some(event) = outbound.name_changes.recv() => ChatEvent::NameChange(event),
            Some(event) = outbound.joins.recv() => ChatEvent::UserJoined(event),
            else => break LoopExit::Shutdown,
        };

        let payload = match encode_event(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to encode {} event: {}", event.event_type(), e);
                continue;
            }
        };

        if let Err(e) = sink.send(payload).await {
            tracing::warn!("Write error on session '{}': {}", session.id(), e);
            break LoopExit::WriteFailed;
        }
    };

    tracing::debug!("Write loop of session '{}' ended: {:?}", session.id(), exit);
    exit
}
