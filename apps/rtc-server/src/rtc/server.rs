//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};

use crate::AppState;

use super::connection::{ChannelTransport, Connection};
use super::envelope::{Hello, Inbound};

#[derive(Debug, Deserialize)]
pub struct UpgradeQuery {
    #[serde(default)]
    pub ticket: Option<String>,
}

pub fn router(path: &str) -> Router<AppState> {
    Router::new().route(path, get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<UpgradeQuery>,
    State(state): State<AppState>,
) -> Response {
    let (transport, outbound) = ChannelTransport::new();
    let connection = Connection::new(transport, query.ticket);

    if !state.config.allow_anonymous
        && state.dispatcher.identity(&connection).await.is_anonymous()
    {
        tracing::debug!(connection_id = %connection.id(), "rejecting anonymous connection");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "a valid ticket is required" })),
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_connection(socket, state, connection, outbound))
}

async fn handle_connection(
    socket: WebSocket,
    state: AppState,
    connection: Connection,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let connection = Arc::new(connection);
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Subscribe before announcing the connection so no broadcast is missed.
    let mut broadcast_rx = state.hub.subscribe();
    state.connections.register(connection.clone());

    tracing::info!(connection_id = %connection.id(), "rtc connection opened");

    match serde_json::to_string(&Hello {
        resource: connection.id(),
    }) {
        Ok(hello) => {
            let _ = connection.write(hello);
        }
        Err(err) => tracing::error!(?err, "failed to encode hello"),
    }

    // Writer task: drain queued frames into the socket.
    let mut writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        state
                            .dispatcher
                            .on_message(&connection, Inbound::Text(text.as_str().to_owned()))
                            .await;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %connection.id(), "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            result = broadcast_rx.recv() => {
                match result {
                    Ok(message) => {
                        state
                            .dispatcher
                            .on_message(&connection, Inbound::Broadcast(message))
                            .await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            connection_id = %connection.id(),
                            skipped = n,
                            "rtc connection lagged behind broadcast"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            // The socket stopped accepting writes.
            _ = &mut writer => break,
        }
    }

    let destroyed = state.dispatcher.on_disconnect(&connection).await;
    state.connections.remove(connection.id());
    writer.abort();

    tracing::info!(
        connection_id = %connection.id(),
        destroyed,
        "rtc connection closed"
    );
}
