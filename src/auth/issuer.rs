/// Token Issuance
///
/// Mints an access/refresh pair for a user under a fresh session id, plus the
/// session record that must be persisted for the refresh token.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Header};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::auth::claims::{Claims, TokenKind};
use crate::auth::keys::{KeyManager, SIGNING_ALGORITHM};
use crate::auth::password::PasswordHasher;
use crate::configuration::TokenSettings;
use crate::error::AppError;
use crate::session::SessionRecord;

/// 32 alphanumeric characters, ~190 bits of entropy
const SESSION_ID_LENGTH: usize = 32;

/// Signed bearer strings handed back to the client. Not persisted.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: Arc<KeyManager>,
    hasher: PasswordHasher,
    settings: TokenSettings,
}

/// Generate a new random session identifier
pub fn generate_session_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LENGTH)
        .map(char::from)
        .collect()
}

impl TokenIssuer {
    pub fn new(keys: Arc<KeyManager>, hasher: PasswordHasher, settings: TokenSettings) -> Self {
        Self {
            keys,
            hasher,
            settings,
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Issue a token pair for `user_id` under a new session.
    ///
    /// CPU-bound (RSA signing plus a bcrypt fingerprint); call it off the
    /// async executor.
    ///
    /// # Errors
    /// `AppError::TokenSigning` if either token cannot be signed. Not retried.
    pub fn issue(&self, user_id: &str) -> Result<(TokenPair, SessionRecord), AppError> {
        self.issue_at(user_id, Utc::now())
    }

    pub fn issue_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(TokenPair, SessionRecord), AppError> {
        let session_id = generate_session_id();

        let access_claims = self.claims(user_id, &session_id, TokenKind::Access, now)?;
        let refresh_claims = self.claims(user_id, &session_id, TokenKind::Refresh, now)?;

        let access_token = self.sign(&access_claims)?;
        let refresh_token = self.sign(&refresh_claims)?;
        let refresh_fingerprint = self.hasher.fingerprint(&refresh_token)?;

        let pair = TokenPair {
            access_token,
            refresh_token,
            access_expires_at: access_claims.expires_at(),
            refresh_expires_at: refresh_claims.expires_at(),
        };
        let record = SessionRecord {
            session_id,
            user_id: user_id.to_string(),
            refresh_fingerprint,
            expires_at: refresh_claims.expires_at(),
        };

        tracing::debug!(
            user_id = %user_id,
            session_id = %record.session_id,
            "Token pair issued"
        );
        Ok((pair, record))
    }

    fn claims(
        &self,
        user_id: &str,
        session_id: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Claims, AppError> {
        let seconds = match kind {
            TokenKind::Access => self.settings.access_token_expiry,
            TokenKind::Refresh => self.settings.refresh_token_expiry,
        };
        let mut claims = Duration::try_seconds(seconds)
            .and_then(|ttl| Claims::new(user_id, session_id, kind, now, ttl, &self.settings.issuer))
            .ok_or_else(|| {
                AppError::TokenSigning(format!("{} token expiry of {}s is out of range", kind, seconds))
            })?;
        if self.settings.embed_public_key {
            claims.pk = Some(self.keys.public_key_pem().to_string());
        }
        Ok(claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(SIGNING_ALGORITHM), claims, self.keys.encoding_key())
            .map_err(|e| AppError::TokenSigning(e.to_string()))
    }
}
