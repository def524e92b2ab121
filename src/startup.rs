use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AuthenticationGate, KeyManager, PasswordHasher, TokenIssuer, TokenValidator};
use crate::configuration::Settings;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{health_check, index, login, logout, public_key, refresh, signup};
use crate::session::SessionStore;
use crate::users::UserStore;

/// Wire the token components together from settings.
pub fn build_gate(
    settings: &Settings,
    keys: Arc<KeyManager>,
    sessions: Arc<dyn SessionStore>,
) -> AuthenticationGate {
    let hasher = PasswordHasher::new(settings.password.cost);
    let issuer = TokenIssuer::new(keys.clone(), hasher, settings.tokens.clone());
    let validator = TokenValidator::new(keys, settings.tokens.issuer.clone());
    AuthenticationGate::new(issuer, validator, hasher, sessions)
}

pub fn run(
    listener: TcpListener,
    gate: AuthenticationGate,
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
) -> Result<Server, std::io::Error> {
    let gate_data = web::Data::new(gate.clone());
    let users = web::Data::from(users);
    let hasher = web::Data::new(hasher);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)
            // Shared state
            .app_data(gate_data.clone())
            .app_data(users.clone())
            .app_data(hasher.clone())
            // Public routes (no authentication required)
            .route("/health_check", web::get().to(health_check))
            .route("/users/signup", web::post().to(signup))
            .route("/users/login", web::post().to(login))
            .route("/users/refresh", web::post().to(refresh))
            .route("/keys/public", web::get().to(public_key))
            // Protected routes (require a live session)
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(gate.clone()))
                    .route("", web::get().to(index))
                    .route("/logout", web::post().to(logout)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
