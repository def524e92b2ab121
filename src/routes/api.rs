/// Protected API Routes
///
/// Everything here sits behind `JwtMiddleware`; the `Principal` is already in
/// the request extensions.

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::auth::{AuthenticationGate, Principal};
use crate::error::AppError;

#[derive(Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub user_id: String,
}

/// GET /api
pub async fn index(principal: web::ReqData<Principal>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse {
        success: true,
        user_id: principal.user_id.clone(),
    })
}

/// POST /api/logout
///
/// Ends the caller's session; its access and refresh tokens stop working.
pub async fn logout(
    principal: web::ReqData<Principal>,
    gate: web::Data<AuthenticationGate>,
) -> Result<HttpResponse, AppError> {
    gate.logout(&principal.session_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
