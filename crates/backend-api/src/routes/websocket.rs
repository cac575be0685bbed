use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
    Json,
};
use campusnet_auth::User;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, info, warn};
use utoipa::IntoParams;

use crate::{
    realtime::{ClientEvent, ServerEvent, Subscription},
    routes::models::PresenceResponse,
    services::{account as account_service, messaging as messaging_service},
    util::require_bearer,
    ApiError, AppState,
};

const OUTBOUND_CAPACITY: usize = 100;

#[derive(Debug, Deserialize, IntoParams)]
pub struct WebSocketQuery {
    /// Session token; browsers cannot set headers on websocket requests.
    pub token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws",
    tag = "Realtime",
    params(WebSocketQuery),
    responses(
        (status = 101, description = "Upgraded to a websocket carrying realtime events"),
        (status = 401, description = "Missing or invalid session token", body = crate::error::ErrorResponse)
    )
)]
pub async fn websocket_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = match params.token {
        Some(token) if !token.trim().is_empty() => token,
        _ => require_bearer(&headers)?,
    };
    let (user, _) = state.authenticate(&token).await?;
    let ws = ws.map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: User) {
    let Subscription {
        mut receiver,
        came_online,
    } = state.realtime().connect(user.id);
    info!(user = %user.public_id, "websocket connected");

    if came_online {
        announce_presence(&state, &user, true).await;
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_CAPACITY);
    let sender_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(error) => {
                    warn!(?error, "failed to encode realtime event");
                    continue;
                }
            };
            if let Err(error) = ws_sender.send(Message::Text(json)).await {
                debug!(%error, "websocket send failed");
                break;
            }
        }
    });

    let hello = ServerEvent::Hello {
        user_id: user.public_id.clone(),
    };
    if out_tx.send(hello).await.is_ok() {
        loop {
            tokio::select! {
                incoming = ws_receiver.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_message(&state, &user, &text).await {
                            if out_tx.send(reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        debug!(user = %user.public_id, %error, "websocket receive failed");
                        break;
                    }
                },
                event = receiver.recv() => match event {
                    Ok(event) => {
                        if out_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(user = %user.public_id, skipped, "websocket fell behind; events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    drop(out_tx);
    if let Err(error) = sender_task.await {
        warn!(?error, "websocket sender task panicked");
    }

    if state.realtime().disconnect(user.id) {
        announce_presence(&state, &user, false).await;
    }
    info!(user = %user.public_id, "websocket disconnected");
}

async fn announce_presence(state: &AppState, user: &User, online: bool) {
    if let Err(error) =
        account_service::broadcast_presence(state.db_pool(), state.realtime(), user, online).await
    {
        warn!(user = %user.public_id, ?error, "failed to broadcast presence");
    }
}

/// Returns the event to send back to this socket, if any.
async fn handle_client_message(state: &AppState, user: &User, text: &str) -> Option<ServerEvent> {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(error) => {
            debug!(user = %user.public_id, %error, "invalid client event");
            return Some(ServerEvent::Error {
                message: "invalid event format".to_string(),
            });
        }
    };

    let result = match event {
        ClientEvent::Ping => return Some(ServerEvent::Pong),
        ClientEvent::Typing { conversation_id } => {
            messaging_service::typing(state.db_pool(), state.realtime(), user, &conversation_id)
                .await
        }
        ClientEvent::MarkRead { conversation_id } => {
            messaging_service::mark_read(state.db_pool(), state.realtime(), user, &conversation_id)
                .await
                .map(|_| ())
        }
    };

    result.err().map(|error| ServerEvent::Error {
        message: ApiError::from(error).message,
    })
}

#[utoipa::path(
    get,
    path = "/api/presence",
    tag = "Realtime",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Accepted connections that are online", body = PresenceResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    )
)]
pub async fn presence(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PresenceResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let online =
        account_service::online_connections(state.db_pool(), state.realtime(), user.id).await?;
    Ok(Json(PresenceResponse { online }))
}
