use campusnet_auth::{Authenticator, User};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::connection::accepted_connection_ids;
use super::profile::get_profile;
use super::ServiceError;
use crate::realtime::{RealtimeHub, ServerEvent};
use crate::routes::models::{MeResponse, UserResponse};

pub async fn me(pool: &SqlitePool, user: &User) -> Result<MeResponse, ServiceError> {
    Ok(MeResponse {
        user: UserResponse::from(user),
        profile: get_profile(pool, user.id, user.id).await?,
    })
}

/// Deletes the account and everything that references it, then closes the
/// user's live sockets.
pub async fn delete_account(
    authenticator: &Authenticator,
    hub: &RealtimeHub,
    user: &User,
    password: &str,
) -> Result<(), ServiceError> {
    let connections = accepted_connection_ids(&authenticator.pool(), user.id).await?;
    authenticator.delete_account(user.id, password).await?;

    if hub.disconnect_user(user.id) {
        for connection in connections {
            hub.send_to_user(
                connection,
                ServerEvent::Presence {
                    user_id: user.public_id.clone(),
                    online: false,
                },
            );
        }
    }

    info!(user = %user.public_id, "account removed");
    Ok(())
}

/// Public ids of the user's accepted connections that currently hold a socket.
pub async fn online_connections(
    pool: &SqlitePool,
    hub: &RealtimeHub,
    user_id: i64,
) -> Result<Vec<String>, ServiceError> {
    let online = hub.online_among(&accepted_connection_ids(pool, user_id).await?);
    if online.is_empty() {
        return Ok(Vec::new());
    }

    let mut public_ids = Vec::with_capacity(online.len());
    for id in online {
        let public_id: Option<String> = sqlx::query_scalar("SELECT public_id FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        public_ids.extend(public_id);
    }
    public_ids.sort();
    Ok(public_ids)
}

/// Tell accepted connections that the user came online or went offline.
pub async fn broadcast_presence(
    pool: &SqlitePool,
    hub: &RealtimeHub,
    user: &User,
    online: bool,
) -> Result<(), ServiceError> {
    let connections = accepted_connection_ids(pool, user.id).await?;
    let mut delivered = 0;
    for connection in connections {
        delivered += hub.send_to_user(
            connection,
            ServerEvent::Presence {
                user_id: user.public_id.clone(),
                online,
            },
        );
    }
    debug!(user = %user.public_id, online, delivered, "presence broadcast");
    Ok(())
}
