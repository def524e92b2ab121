/// Authentication Routes
///
/// Signup, login, token refresh, and public key export.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthenticationGate, PasswordHasher, TokenPair};
use crate::error::{AppError, AuthError};
use crate::middleware::bearer_token;
use crate::users::{self, NewUser, UserStore};

/// User signup request
#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub phone: String,
}

#[derive(Serialize)]
pub struct SignupResponse {
    pub user_id: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Token refresh request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Authentication response with access and refresh tokens
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

impl AuthResponse {
    fn from_pair(pair: TokenPair, gate: &AuthenticationGate) -> Self {
        let settings = gate.issuer().settings();
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: settings.access_token_expiry,
            refresh_expires_in: settings.refresh_token_expiry,
        }
    }
}

/// POST /users/signup
///
/// # Errors
/// - 400: empty or malformed field
/// - 409: username or phone already registered
pub async fn signup(
    form: web::Json<SignupRequest>,
    store: web::Data<dyn UserStore>,
    hasher: web::Data<PasswordHasher>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let user = users::signup(
        store.get_ref(),
        *hasher.get_ref(),
        NewUser {
            username: form.username,
            password: form.password,
            phone: form.phone,
        },
    )
    .await?;

    Ok(HttpResponse::Created().json(SignupResponse {
        user_id: user.user_id,
    }))
}

/// POST /users/login
///
/// Unknown username and wrong password both answer 401 `INVALID_CREDENTIALS`.
pub async fn login(
    form: web::Json<LoginRequest>,
    store: web::Data<dyn UserStore>,
    hasher: web::Data<PasswordHasher>,
    gate: web::Data<AuthenticationGate>,
) -> Result<HttpResponse, AppError> {
    let user = users::verify_credentials(
        store.get_ref(),
        *hasher.get_ref(),
        &form.username,
        &form.password,
    )
    .await?;

    let pair = gate.start_session(&user.user_id).await?;

    tracing::info!(user_id = %user.user_id, "User logged in successfully");
    Ok(HttpResponse::Ok().json(AuthResponse::from_pair(pair, gate.get_ref())))
}

/// POST /users/refresh
///
/// The refresh token is read from `Authorization: Bearer <token>`, or from a
/// JSON body `{"refresh_token": "..."}` when the header is absent.
/// Single-use: the presented refresh token stops working once this returns.
///
/// # Errors
/// - 401: missing, invalid, expired, or already used refresh token
/// - 503: session store unavailable
pub async fn refresh(
    req: HttpRequest,
    form: Option<web::Json<RefreshRequest>>,
    gate: web::Data<AuthenticationGate>,
) -> Result<HttpResponse, AppError> {
    let token = match bearer_token(req.headers()) {
        Some(token) => token.to_string(),
        None => form
            .map(|form| form.into_inner().refresh_token)
            .ok_or(AuthError::MissingToken)?,
    };
    let pair = gate.refresh(&token).await?;
    Ok(HttpResponse::Ok().json(AuthResponse::from_pair(pair, gate.get_ref())))
}

/// GET /keys/public
pub async fn public_key(gate: web::Data<AuthenticationGate>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/x-pem-file")
        .body(gate.validator().public_key_pem().to_string())
}
