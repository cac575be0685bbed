use std::sync::Arc;

use campusnet_advisor::AdvisorClient;
use campusnet_auth::{AuthSession, Authenticator, User};
use campusnet_news::NewsScraper;
use sqlx::SqlitePool;

use crate::realtime::RealtimeHub;
use crate::services::notification::Notifier;
use crate::ApiError;

#[derive(Clone)]
pub struct AppState {
    db_pool: SqlitePool,
    authenticator: Authenticator,
    advisor: Arc<AdvisorClient>,
    news: NewsScraper,
    realtime: RealtimeHub,
    notifier: Notifier,
}

impl AppState {
    pub fn new(
        db_pool: SqlitePool,
        authenticator: Authenticator,
        advisor: Arc<AdvisorClient>,
        news: NewsScraper,
        notification_retention_days: u32,
    ) -> Self {
        let realtime = RealtimeHub::new();
        let notifier = Notifier::new(db_pool.clone(), realtime.clone(), notification_retention_days);
        Self {
            db_pool,
            authenticator,
            advisor,
            news,
            realtime,
            notifier,
        }
    }

    pub fn db_pool(&self) -> &SqlitePool {
        &self.db_pool
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn advisor(&self) -> &AdvisorClient {
        &self.advisor
    }

    pub fn news(&self) -> &NewsScraper {
        &self.news
    }

    pub fn realtime(&self) -> &RealtimeHub {
        &self.realtime
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub async fn authenticate(&self, token: &str) -> Result<(User, AuthSession), ApiError> {
        self.authenticator
            .authenticate_token(token)
            .await
            .map_err(ApiError::from)
    }
}
