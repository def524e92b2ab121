use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokenkeeper::auth::{
    AuthenticationGate, KeyManager, PasswordHasher, TokenIssuer, TokenValidator, MIN_COST,
};
use tokenkeeper::configuration::TokenSettings;
use tokenkeeper::session::InMemorySessionStore;
use tokenkeeper::startup::run;
use tokenkeeper::users::InMemoryUserStore;

lazy_static::lazy_static! {
    static ref KEYS: Arc<KeyManager> =
        Arc::new(KeyManager::generate(2048).expect("Failed to generate test keypair"));
}

pub struct TestApp {
    pub address: String,
    pub sessions: InMemorySessionStore,
    pub client: reqwest::Client,
}

impl TestApp {
    async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", &self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn signup(&self, username: &str, phone: &str) -> reqwest::Response {
        self.post(
            "/users/signup",
            &json!({ "username": username, "password": "SecurePass123", "phone": phone }),
        )
        .await
    }

    /// Sign up and log in, returning the login response body.
    async fn login_new_user(&self, username: &str, phone: &str) -> Value {
        assert_eq!(201, self.signup(username, phone).await.status().as_u16());
        let response = self
            .post(
                "/users/login",
                &json!({ "username": username, "password": "SecurePass123" }),
            )
            .await;
        assert_eq!(200, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }

    async fn get_api(&self, access_token: &str) -> reqwest::Response {
        self.client
            .get(&format!("{}/api", &self.address))
            .bearer_auth(access_token)
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

async fn spawn_app_with(access_ttl: i64, refresh_ttl: i64) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let hasher = PasswordHasher::new(MIN_COST);
    let settings = TokenSettings {
        access_token_expiry: access_ttl,
        refresh_token_expiry: refresh_ttl,
        issuer: "test".to_string(),
        embed_public_key: false,
    };
    let sessions = InMemorySessionStore::new();
    let gate = AuthenticationGate::new(
        TokenIssuer::new(KEYS.clone(), hasher, settings),
        TokenValidator::new(KEYS.clone(), "test"),
        hasher,
        Arc::new(sessions.clone()),
    );

    let server = run(listener, gate, Arc::new(InMemoryUserStore::new()), hasher)
        .expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        sessions,
        client: reqwest::Client::new(),
    }
}

async fn spawn_app() -> TestApp {
    spawn_app_with(60, 120).await
}

// --- Signup Tests ---

#[tokio::test]
async fn signup_returns_201_with_user_id() {
    let app = spawn_app().await;

    let response = app.signup("alice", "010-1111-2222").await;

    assert_eq!(201, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["user_id"].as_str().map(|id| !id.is_empty()).unwrap_or(false));
}

#[tokio::test]
async fn signup_returns_400_for_empty_fields() {
    let app = spawn_app().await;
    let test_cases = vec![
        (json!({"username": "", "password": "pw", "phone": "0101"}), "empty username"),
        (json!({"username": "bob", "password": "", "phone": "0101"}), "empty password"),
        (json!({"username": "bob", "password": "pw", "phone": ""}), "empty phone"),
        (json!({"username": "bob", "password": "pw"}), "missing phone"),
    ];

    for (body, reason) in test_cases {
        let response = app.post("/users/signup", &body).await;
        assert_eq!(400, response.status().as_u16(), "Should reject: {}", reason);
    }
}

#[tokio::test]
async fn signup_returns_409_for_duplicates() {
    let app = spawn_app().await;
    assert_eq!(201, app.signup("alice", "0101").await.status().as_u16());

    let same_username = app.signup("alice", "0202").await;
    assert_eq!(409, same_username.status().as_u16());

    let same_phone = app.signup("bob", "0101").await;
    assert_eq!(409, same_phone.status().as_u16());
}

// --- Login Tests ---

#[tokio::test]
async fn login_returns_token_pair() {
    let app = spawn_app().await;

    let body = app.login_new_user("alice", "0101").await;

    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 60);
    assert_eq!(body["refresh_expires_in"], 120);
    assert_eq!(app.sessions.len(), 1);
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let app = spawn_app().await;
    app.signup("alice", "0101").await;

    let wrong_password = app
        .post("/users/login", &json!({"username": "alice", "password": "nope"}))
        .await;
    let unknown_user = app
        .post("/users/login", &json!({"username": "mallory", "password": "nope"}))
        .await;

    for response in [wrong_password, unknown_user] {
        assert_eq!(401, response.status().as_u16());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "INVALID_CREDENTIALS");
    }
    assert!(app.sessions.is_empty());
}

// --- Protected API Tests ---

#[tokio::test]
async fn api_accepts_valid_access_token() {
    let app = spawn_app().await;
    let tokens = app.login_new_user("alice", "0101").await;

    let response = app.get_api(tokens["access_token"].as_str().unwrap()).await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(body["user_id"].is_string());
}

#[tokio::test]
async fn api_rejects_missing_token() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(&format!("{}/api", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .expect("Rejected request should carry x-request-id");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "MISSING_TOKEN");
    assert_eq!(body["error_id"], request_id.as_str());
}

#[tokio::test]
async fn handler_error_id_matches_request_id_header() {
    let app = spawn_app().await;

    let response = app
        .post("/users/login", &json!({"username": "nobody", "password": "nope"}))
        .await;

    assert_eq!(401, response.status().as_u16());
    let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_id"], request_id.as_str());
}

#[tokio::test]
async fn api_rejects_refresh_token_and_garbage() {
    let app = spawn_app().await;
    let tokens = app.login_new_user("alice", "0101").await;

    for token in [tokens["refresh_token"].as_str().unwrap(), "not.a.token"] {
        let response = app.get_api(token).await;
        assert_eq!(401, response.status().as_u16());
    }
}

#[tokio::test]
async fn api_rejects_expired_access_token() {
    let app = spawn_app_with(1, 120).await;
    let tokens = app.login_new_user("alice", "0101").await;

    tokio::time::sleep(Duration::from_millis(2100)).await;

    let response = app.get_api(tokens["access_token"].as_str().unwrap()).await;
    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "TOKEN_EXPIRED");

    // The refresh token still renews the session
    let renewed = app
        .post("/users/refresh", &json!({"refresh_token": tokens["refresh_token"]}))
        .await;
    assert_eq!(200, renewed.status().as_u16());
}

// --- Refresh Tests ---

#[tokio::test]
async fn refresh_rotates_and_is_single_use() {
    let app = spawn_app().await;
    let tokens = app.login_new_user("alice", "0101").await;
    let refresh_body = json!({"refresh_token": tokens["refresh_token"]});

    let first = app.post("/users/refresh", &refresh_body).await;
    assert_eq!(200, first.status().as_u16());
    let renewed: Value = first.json().await.unwrap();
    assert_ne!(renewed["refresh_token"], tokens["refresh_token"]);

    let new_access = app.get_api(renewed["access_token"].as_str().unwrap()).await;
    assert_eq!(200, new_access.status().as_u16());

    // Replaying the consumed refresh token fails
    let replay = app.post("/users/refresh", &refresh_body).await;
    assert_eq!(401, replay.status().as_u16());

    // The rotated-out session no longer authorizes its access token
    let old_access = app.get_api(tokens["access_token"].as_str().unwrap()).await;
    assert_eq!(401, old_access.status().as_u16());
    assert_eq!(app.sessions.len(), 1);
}

#[tokio::test]
async fn refresh_rejects_access_token() {
    let app = spawn_app().await;
    let tokens = app.login_new_user("alice", "0101").await;

    let response = app
        .post("/users/refresh", &json!({"refresh_token": tokens["access_token"]}))
        .await;

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn refresh_accepts_bearer_header() {
    let app = spawn_app().await;
    let tokens = app.login_new_user("alice", "0101").await;

    let response = app
        .client
        .post(&format!("{}/users/refresh", &app.address))
        .bearer_auth(tokens["refresh_token"].as_str().unwrap())
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let renewed: Value = response.json().await.unwrap();
    assert_ne!(renewed["refresh_token"], tokens["refresh_token"]);
    assert_eq!(app.sessions.len(), 1);
}

#[tokio::test]
async fn refresh_without_token_is_missing_token() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(&format!("{}/users/refresh", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "MISSING_TOKEN");
}

// --- Logout Tests ---

#[tokio::test]
async fn logout_revokes_both_tokens() {
    let app = spawn_app().await;
    let tokens = app.login_new_user("alice", "0101").await;
    let access_token = tokens["access_token"].as_str().unwrap();

    let response = app
        .client
        .post(&format!("{}/api/logout", &app.address))
        .bearer_auth(access_token)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(204, response.status().as_u16());

    assert_eq!(401, app.get_api(access_token).await.status().as_u16());
    let refresh = app
        .post("/users/refresh", &json!({"refresh_token": tokens["refresh_token"]}))
        .await;
    assert_eq!(401, refresh.status().as_u16());
    assert!(app.sessions.is_empty());
}
