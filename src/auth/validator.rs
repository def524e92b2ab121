/// Token Validation
///
/// Pure cryptographic + clock check; never touches the network or a store.
///
/// The RS512 signature over `header.payload` is checked before anything in
/// the token is trusted, so a token altered anywhere fails as
/// `InvalidSignature`. Only a header that deliberately declares another
/// algorithm (`none`, an absent `alg`, or a different JWA name) is reported
/// as `UnsupportedAlgorithm`. Claims are then decoded through
/// `jsonwebtoken::decode`; `exp` in the past is a flag, not an error.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{crypto, decode, decode_header, Validation};

use crate::auth::claims::{Claims, TokenKind};
use crate::auth::keys::{KeyManager, SIGNING_ALGORITHM};
use crate::error::AuthError;

/// Registered JOSE header parameters besides `alg` (RFC 7515, 4.1).
const HEADER_PARAMS: &[&str] = &[
    "typ", "cty", "kid", "jku", "jwk", "x5u", "x5c", "x5t", "x5t#S256", "crit",
];

/// Claims from a correctly signed token, plus whether it has expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedToken {
    pub claims: Claims,
    pub expired: bool,
}

impl ValidatedToken {
    pub fn user_id(&self) -> &str {
        self.claims.user_id()
    }

    pub fn session_id(&self) -> &str {
        self.claims.session_id()
    }
}

#[derive(Debug, Clone)]
pub struct TokenValidator {
    keys: Arc<KeyManager>,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(keys: Arc<KeyManager>, issuer: impl Into<String>) -> Self {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        // Expiry is reported through `ValidatedToken::expired`
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_issuer(&[issuer.into()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Self { keys, validation }
    }

    /// PEM public key tokens are checked against.
    pub fn public_key_pem(&self) -> &str {
        self.keys.public_key_pem()
    }

    /// Validate a bearer string expected to be a token of `kind`.
    pub fn validate(&self, token: &str, kind: TokenKind) -> Result<ValidatedToken, AuthError> {
        self.validate_at(token, kind, Utc::now())
    }

    pub fn validate_at(
        &self,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<ValidatedToken, AuthError> {
        if token.split('.').count() != 3 {
            return Err(AuthError::Unauthorized);
        }
        let (signing_input, signature) = token.rsplit_once('.').ok_or(AuthError::Unauthorized)?;

        let verified = crypto::verify(
            signature,
            signing_input.as_bytes(),
            self.keys.decoding_key(),
            SIGNING_ALGORITHM,
        )
        .unwrap_or(false);
        if !verified {
            if declares_foreign_algorithm(token) {
                tracing::warn!(kind = %kind, "Token declares an unsupported algorithm");
                return Err(AuthError::UnsupportedAlgorithm);
            }
            tracing::warn!(kind = %kind, "Token signature verification failed");
            return Err(AuthError::InvalidSignature);
        }

        let claims = decode::<Claims>(token, self.keys.decoding_key(), &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::InvalidAlgorithm => {
                    tracing::warn!(kind = %kind, "Signed token declares an unsupported algorithm");
                    AuthError::UnsupportedAlgorithm
                }
                _ => {
                    tracing::warn!(error = %e, "Token claims rejected");
                    AuthError::Unauthorized
                }
            })?
            .claims;

        if claims.kind != kind {
            tracing::warn!(expected = %kind, actual = %claims.kind, "Wrong token kind presented");
            return Err(AuthError::Unauthorized);
        }
        if claims.sub.is_empty() || claims.sid.is_empty() {
            return Err(AuthError::Unauthorized);
        }

        let expired = claims.is_expired_at(now);
        Ok(ValidatedToken { claims, expired })
    }
}

/// Whether an unverifiable token's header names an algorithm other than
/// RS512 on purpose. A header damaged in transit does not count: its `alg`
/// is unrecognised, or it carries members no JOSE header defines.
fn declares_foreign_algorithm(token: &str) -> bool {
    if let Ok(header) = decode_header(token) {
        return header.alg != SIGNING_ALGORITHM;
    }

    // `none` and an absent `alg` have no `Algorithm` variant
    let Some((segment, _)) = token.split_once('.') else {
        return false;
    };
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(segment) else {
        return false;
    };
    let Ok(serde_json::Value::Object(members)) = serde_json::from_slice(&bytes) else {
        return false;
    };
    match members.get("alg") {
        Some(serde_json::Value::String(alg)) => alg == "none",
        Some(_) => false,
        None => members.keys().all(|key| HEADER_PARAMS.contains(&key.as_str())),
    }
}
