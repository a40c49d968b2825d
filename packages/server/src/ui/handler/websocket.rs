//! WebSocket connection handlers.

use std::{future, net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, header},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};

use crate::{
    ui::state::AppState,
    usecase::{ClientSession, SessionIdentity, SessionRateLimiter},
};

use super::session::{InboundFrame, read_loop, write_loop};

/// Sub-protocol a client requests to stay out of presence and chat fan-out
pub const IGNORE_CLIENT_PROTOCOL: &str = "IGNORE_CLIENT";

impl From<Message> for InboundFrame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => InboundFrame::Text(text.as_str().to_string()),
            Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => InboundFrame::Text(text),
                Err(_) => InboundFrame::Other,
            },
            Message::Close(_) => InboundFrame::Close,
            Message::Ping(_) | Message::Pong(_) => InboundFrame::Other,
        }
    }
}

/// Resolve the client address, preferring the first `X-Forwarded-For` entry
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

fn requests_ignore(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|protocol| protocol.trim() == IGNORE_CLIENT_PROTOCOL)
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let identity = SessionIdentity {
        ip_address: client_ip(&headers, peer),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        ignore: requests_ignore(&headers),
    };

    ws.protocols([IGNORE_CLIENT_PROTOCOL])
        .on_upgrade(move |socket| handle_socket(socket, state, identity))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: SessionIdentity) {
    let (session, outbound) = ClientSession::new(identity, state.clock.now());
    if let Err(e) = state.hub.add(session.clone()).await {
        tracing::warn!("Rejecting connection from {}: {}", session.ip_address(), e);
        return;
    }
    tracing::info!(
        "Session '{}' connected from {}{}",
        session.id(),
        session.ip_address(),
        if session.is_ignored() { " (ignored)" } else { "" }
    );

    let (sender, receiver) = socket.split();
    let sink = sender.with(|text: String| {
        future::ready(Ok::<_, axum::Error>(Message::Text(text.into())))
    });
    let frames = receiver.map(|frame| frame.map(InboundFrame::from));
    let limiter = SessionRateLimiter::new(state.rate_limit);

    let mut send_task = tokio::spawn(write_loop(session.clone(), outbound, sink));
    let mut recv_task = tokio::spawn(read_loop(
        session.clone(),
        frames,
        limiter,
        state.pipeline.clone(),
        state.hub.clone(),
    ));

    // If any one of the tasks exit, tear the session down and abort the other.
    let exit = tokio::select! {
        exit = &mut send_task => {
            recv_task.abort();
            exit
        }
        exit = &mut recv_task => {
            send_task.abort();
            exit
        }
    };

    if let Some(exit) = exit.ok().filter(|exit| exit.is_failure()) {
        let _ = state
            .hub
            .report_error(format!("session '{}' ended with {:?}", session.id(), exit))
            .await;
    }
    session.teardown(&state.hub).await;
    tracing::info!("Session '{}' disconnected", session.id());
}
