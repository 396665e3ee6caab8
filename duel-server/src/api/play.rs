use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use duel_sdk::objects::{ClientMessage, ErrorCode, ServerMessage};

use crate::state::AppState;

/// `GET /play/ws`: player WebSocket.
///
/// Each connection is one session. Text frames carry `ClientMessage` JSON;
/// everything the coordinator addresses to the session is pushed back as
/// `ServerMessage` JSON.
pub(super) async fn play_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_play_ws(socket, state))
}

/// Drives a single connection until either side goes away.
///
/// Undecodable and binary frames are answered with an `error` message and
/// the socket stays open. On exit the session is reported disconnected.
async fn handle_play_ws(mut socket: WebSocket, state: AppState) {
    let buffer = state.outbound_buffer().await;
    let (session, mut outbound) = match state.coordinator.connect(buffer).await {
        Ok(connected) => connected,
        Err(e) => {
            tracing::error!(error = %e, "WS: coordinator unavailable");
            let _ = send_json(
                &mut socket,
                &ServerMessage::error(ErrorCode::CoordinatorUnavailable, e.to_string()),
            )
            .await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    tracing::debug!(%session, "WS: session opened");

    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(message) = message else {
                    break;
                };
                if send_json(&mut socket, &message).await.is_err() {
                    break;
                }
            }

            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match ClientMessage::decode(text.as_str()) {
                        Ok(message) => {
                            if state.coordinator.client_message(session, message).await.is_err() {
                                let _ = send_json(
                                    &mut socket,
                                    &ServerMessage::error(
                                        ErrorCode::CoordinatorUnavailable,
                                        "coordinator unavailable",
                                    ),
                                )
                                .await;
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::debug!(%session, error = %e, "WS: malformed frame");
                            let reply =
                                ServerMessage::error(ErrorCode::MalformedMessage, e.to_string());
                            if send_json(&mut socket, &reply).await.is_err() {
                                break;
                            }
                        }
                    },
                    Some(Ok(Message::Binary(_))) => {
                        let reply = ServerMessage::error(
                            ErrorCode::UnsupportedFrame,
                            "binary frames are not supported",
                        );
                        if send_json(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(%session, error = %e, "WS: receive failed");
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!(%session, "WS: session closed");
    let _ = state.coordinator.disconnect(session).await;
}

/// Serialize `value` as JSON and send it as a text WebSocket frame.
///
/// Returns `Err(())` if the send fails (client disconnected).
async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}
