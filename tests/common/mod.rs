#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use serde_json::Value;
use tenant_guard::{
    ServerConfig, build_auth_state,
    auth::AuthState,
    cli::{ClientIpSource, Environment},
    clock::{Clock, ManualClock},
    create_router,
    db::{Database, NewAccount, Role},
    password::hash_password_with_cost,
    rate_limit::RateLimitConfig,
};
use tower::ServiceExt;

pub const PASSWORD: &str = "P1-correct-horse";

/// Application wired to an in-memory database and a manual clock.
pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub clock: Arc<ManualClock>,
    pub auth: AuthState,
}

/// Knobs for building a [`TestApp`].
pub struct TestOptions {
    pub rate_limits: RateLimitConfig,
    pub environment: Environment,
    pub no_signup: bool,
    pub access_token_ttl_secs: u64,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            rate_limits: RateLimitConfig::unlimited(),
            environment: Environment::Development,
            no_signup: false,
            access_token_ttl_secs: 15 * 60,
        }
    }
}

/// Tokens handed out by a successful login.
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub csrf_token: String,
    pub principal: Value,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(TestOptions::default()).await
    }

    pub async fn build(options: TestOptions) -> Self {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let clock = Arc::new(ManualClock::starting_now());
        let config = ServerConfig {
            db: db.clone(),
            jwt_secret: b"test-jwt-secret-with-enough-entropy!".to_vec(),
            environment: options.environment,
            access_token_ttl_secs: options.access_token_ttl_secs,
            refresh_token_ttl_secs: 7 * 24 * 60 * 60,
            no_signup: options.no_signup,
            client_ip_source: ClientIpSource::XForwardedFor,
            rate_limits: options.rate_limits,
            clock: clock.clone(),
        };
        let auth = build_auth_state(&config);
        let app = create_router(auth.clone(), &config);

        Self {
            app,
            db,
            clock,
            auth,
        }
    }

    pub fn now_secs(&self) -> i64 {
        self.clock.now_secs() as i64
    }

    /// Create a tenant and return its id.
    pub async fn seed_tenant(&self, enabled: bool, subscription_end: Option<i64>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.db
            .tenants()
            .create(&id, "Test Tenant", enabled, subscription_end)
            .await
            .expect("Failed to create tenant");
        id
    }

    /// Create a principal with [`PASSWORD`] and return its id.
    pub async fn seed_user(&self, username: &str, role: Role, tenant_id: Option<&str>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let hash = hash_password_with_cost(PASSWORD, 4).expect("Failed to hash password");
        self.db
            .users()
            .create(&NewAccount {
                id: &id,
                username,
                display_name: username,
                password_hash: &hash,
                role,
                tenant_id,
                job_category_id: None,
            })
            .await
            .expect("Failed to create user");
        id
    }

    /// Create a submission owned by `member_id` and return its id.
    pub async fn seed_submission(&self, tenant_id: &str, member_id: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.db
            .submissions()
            .create(&id, tenant_id, member_id, "Monthly report")
            .await
            .expect("Failed to create submission");
        id
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed")
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn login_response(&self, username: &str, password: &str) -> Response {
        self.post_json(
            "/api/auth/login",
            serde_json::json!({ "username": username, "password": password }),
        )
        .await
    }

    /// Log in with [`PASSWORD`] and return the issued tokens.
    pub async fn login(&self, username: &str) -> Session {
        let response = self.login_response(username, PASSWORD).await;
        assert_eq!(
            response.status(),
            StatusCode::OK,
            "login failed for {username}"
        );
        let json = body_json(response).await;
        Session {
            access_token: json["accessToken"].as_str().unwrap().to_string(),
            refresh_token: json["refreshToken"].as_str().map(str::to_string),
            csrf_token: json["csrfToken"].as_str().unwrap().to_string(),
            principal: json["principal"].clone(),
        }
    }

    /// Authenticated GET with a bearer token.
    pub async fn get(&self, uri: &str, session: &Session) -> Response {
        self.send(
            Request::builder()
                .uri(uri)
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", session.access_token),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Authenticated JSON request with a bearer token and an optional CSRF header.
    pub async fn mutate(
        &self,
        method: &str,
        uri: &str,
        session: &Session,
        csrf: Option<&str>,
        body: Value,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", session.access_token),
            )
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(csrf) = csrf {
            builder = builder.header("x-csrf-token", csrf);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }
}

pub async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}
