/// Authentication Gate
///
/// Decides whether a bearer token is currently authorized, and owns the
/// session lifecycle built on top of that: starting a session at login,
/// single-use refresh rotation, and logout.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::auth::claims::TokenKind;
use crate::auth::issuer::{TokenIssuer, TokenPair};
use crate::auth::password::PasswordHasher;
use crate::auth::validator::TokenValidator;
use crate::error::{AppError, AuthError, StoreError};
use crate::session::{SessionRecord, SessionStore};

/// The identity behind an authorized request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub session_id: String,
}

#[derive(Clone)]
pub struct AuthenticationGate {
    issuer: TokenIssuer,
    validator: TokenValidator,
    hasher: PasswordHasher,
    sessions: Arc<dyn SessionStore>,
}

impl AuthenticationGate {
    pub fn new(
        issuer: TokenIssuer,
        validator: TokenValidator,
        hasher: PasswordHasher,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            issuer,
            validator,
            hasher,
            sessions,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Authorize an access token: the user id on success.
    pub async fn authorize(&self, bearer: &str) -> Result<Principal, AppError> {
        self.authorize_at(bearer, Utc::now()).await
    }

    pub async fn authorize_at(&self, bearer: &str, now: DateTime<Utc>) -> Result<Principal, AppError> {
        let validated = self
            .validator
            .validate_at(bearer, TokenKind::Access, now)
            .map_err(|e| {
                tracing::warn!(error = %e, "Access token rejected");
                AuthError::Unauthorized
            })?;

        if validated.expired {
            return Err(AuthError::ExpiredToken.into());
        }

        // Signature alone is not enough: the session must still exist
        let record = match self.sessions.lookup(validated.session_id()).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                tracing::warn!(
                    session_id = %validated.session_id(),
                    "Access token for a rotated or revoked session"
                );
                return Err(AuthError::Unauthorized.into());
            }
            Err(e) => return Err(e.into()),
        };

        if record.user_id != validated.user_id() {
            tracing::warn!(
                session_id = %record.session_id,
                "Session owner does not match token subject"
            );
            return Err(AuthError::Unauthorized.into());
        }

        Ok(Principal {
            user_id: record.user_id,
            session_id: record.session_id,
        })
    }

    /// Start a new session for an authenticated user (login).
    pub async fn start_session(&self, user_id: &str) -> Result<TokenPair, AppError> {
        self.start_session_at(user_id, Utc::now()).await
    }

    pub async fn start_session_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<TokenPair, AppError> {
        let (pair, record) = self.issue_blocking(user_id, now).await?;
        let session_id = record.session_id.clone();
        self.sessions.create(record).await?;

        tracing::info!(user_id = %user_id, session_id = %session_id, "Session started");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// The old session record is consumed by an atomic rotate before the new
    /// pair is returned, so a refresh token works at most once.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        self.refresh_at(refresh_token, Utc::now()).await
    }

    pub async fn refresh_at(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<TokenPair, AppError> {
        let validated = self
            .validator
            .validate_at(refresh_token, TokenKind::Refresh, now)?;
        let session_id = validated.session_id().to_string();

        if validated.expired {
            let swept = self.sessions.sweep_expired(now).await?;
            tracing::debug!(swept, "Swept expired sessions before refresh");
        }

        let record = match self.sessions.lookup(&session_id).await {
            Ok(record) if !record.is_expired_at(now) => record,
            Ok(_) | Err(StoreError::NotFound) => {
                tracing::info!(session_id = %session_id, "Refresh for a missing or expired session");
                return Err(AuthError::SessionExpired.into());
            }
            Err(e) => return Err(e.into()),
        };

        if record.user_id != validated.user_id() {
            tracing::warn!(session_id = %session_id, "Session owner does not match refresh token");
            return Err(AuthError::Unauthorized.into());
        }
        if !self.fingerprint_matches(refresh_token, &record).await? {
            tracing::warn!(session_id = %session_id, "Refresh token does not match stored fingerprint");
            return Err(AuthError::Unauthorized.into());
        }

        let (pair, new_record) = self.issue_blocking(&record.user_id, now).await?;
        let new_session_id = new_record.session_id.clone();
        self.sessions.rotate(&session_id, new_record).await.map_err(|e| {
            tracing::warn!(session_id = %session_id, error = %e, "Session rotation failed");
            e
        })?;

        tracing::info!(
            user_id = %record.user_id,
            old_session_id = %session_id,
            session_id = %new_session_id,
            "Session rotated"
        );
        Ok(pair)
    }

    /// End a session. Idempotent.
    pub async fn logout(&self, session_id: &str) -> Result<(), AppError> {
        self.sessions.delete(session_id).await?;
        tracing::info!(session_id = %session_id, "Session ended");
        Ok(())
    }

    async fn issue_blocking(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(TokenPair, SessionRecord), AppError> {
        let issuer = self.issuer.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || issuer.issue_at(&user_id, now)).await?
    }

    async fn fingerprint_matches(&self, token: &str, record: &SessionRecord) -> Result<bool, AppError> {
        let hasher = self.hasher;
        let token = token.to_string();
        let fingerprint = record.refresh_fingerprint.clone();
        tokio::task::spawn_blocking(move || hasher.verify_fingerprint(&token, &fingerprint)).await?
    }
}
