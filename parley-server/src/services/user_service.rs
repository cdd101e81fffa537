use async_trait::async_trait;
use shared::models::UserSummary;
use tracing::instrument;
use uuid::Uuid;

use super::{
    chat_store::{ChatStoreResult, SessionStore, UserDirectory},
    pg_store::{PgChatStore, UserRow},
};
use crate::auth::session::hash_session_token;

#[async_trait]
impl UserDirectory for PgChatStore {
    #[instrument(name = "users.list_others", skip(self), err)]
    async fn list_others(&self, user_id: Uuid) -> ChatStoreResult<Vec<UserSummary>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, username, full_name, profile_pic
            FROM users
            WHERE id <> $1
            ORDER BY full_name ASC, username ASC
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(UserSummary::from).collect())
    }
}

#[async_trait]
impl SessionStore for PgChatStore {
    #[instrument(name = "sessions.user_for_token", skip_all, err)]
    async fn user_for_token(&self, token: &str) -> ChatStoreResult<Option<Uuid>> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            r"
            SELECT user_id
            FROM user_sessions
            WHERE token_hash = $1 AND expires_at > now()
            ",
        )
        .bind(hash_session_token(token))
        .fetch_optional(self.pool())
        .await?;

        Ok(user_id)
    }
}
