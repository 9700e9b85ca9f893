// API module - HTTP endpoints

pub mod attendance;
pub mod auth;
pub mod checkin;
pub mod comments;
pub mod events;
pub mod finance;
pub mod forms;
pub mod gallery;
pub mod health;
pub mod members;
pub mod middleware;
pub mod sermons;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::services::storage::PUBLIC_PREFIX;
use middleware::{
    auth::require_auth,
    session::{AppSessionLayer, AppState},
};

/// Dashboard endpoints, mounted under `/api/admin` behind the login check
fn admin_routes() -> Router<AppState> {
    Router::new()
        .merge(events::admin_router())
        .merge(sermons::admin_router())
        .merge(gallery::admin_router())
        .merge(finance::admin_router())
        .merge(attendance::admin_router())
        .merge(members::admin_router())
        .route_layer(axum::middleware::from_fn(require_auth))
}

/// Allows the configured site origin to call the API with its session cookie
fn cors_layer(base_url: &str) -> Option<CorsLayer> {
    let origin = url::Url::parse(base_url).ok()?.origin().ascii_serialization();
    let origin = HeaderValue::from_str(&origin).ok()?;

    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true),
    )
}

/// Builds the full application router
pub fn app(state: AppState, session_layer: AppSessionLayer) -> Router {
    let uploads = ServeDir::new(state.media.root());

    let mut router = Router::new()
        .route("/health", get(health::health_check))
        .merge(auth::router())
        .merge(events::router())
        .merge(sermons::router())
        .merge(comments::router())
        .merge(gallery::router())
        .merge(checkin::router())
        .nest("/api/admin", admin_routes())
        .nest_service(PUBLIC_PREFIX, uploads)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());

    match cors_layer(state.config.public_base_url()) {
        Some(cors) => router = router.layer(cors),
        None => tracing::warn!(base_url = %state.config.base_url, "CORS disabled: base URL has no origin"),
    }

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use http_body_util::BodyExt;
    use secrecy::Secret;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use tower_sessions::SessionManagerLayer;
    use tower_sessions_sqlx_store::PostgresStore;

    use crate::api::middleware::session::signing_key;

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/chapel_test".to_string(),
            base_url: "https://chapel.example.org/".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            upload_dir: std::env::temp_dir().join("chapel-test-uploads"),
            admin_username: None,
            admin_password: None,
            checkin_token_ttl_hours: 24,
            token_retention_days: 90,
            sync_poll_interval_ms: 2000,
            timezone: "UTC".to_string(),
            session_secret: Secret::new("x".repeat(64)),
        }
    }

    /// Router over a pool that never connects; only paths that fail before
    /// touching the database can be exercised
    fn test_app() -> Router {
        let config = test_config();
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();

        let session_layer = SessionManagerLayer::new(PostgresStore::new(pool.clone()))
            .with_signed(signing_key(&[7u8; 32]));
        app(AppState::new(pool, config), session_layer)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_admin_routes_require_login() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/admin/finance/overview")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_roster_routes_are_mounted_behind_login() {
        let requests = [
            ("GET", "/api/admin/attendance/absent?service_id=0"),
            ("GET", "/api/admin/visitors"),
            ("PUT", "/api/admin/members/6f1c2a0e-8d7b-4f5e-9a31-2b4c6d8e0f12"),
        ];

        for (method, uri) in requests {
            let response = test_app()
                .oneshot(json_request(method, uri, serde_json::json!({})))
                .await
                .unwrap();

            // Unknown paths fall through to 404
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        }

        let response = test_app()
            .oneshot(json_request("GET", "/api/admin/no-such-route", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_comment_validation_response() {
        let response = test_app()
            .oneshot(json_request(
                "POST",
                "/api/sermons/6f1c2a0e-8d7b-4f5e-9a31-2b4c6d8e0f12/comments",
                serde_json::json!({ "author_name": "", "content": "Amen" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Name and comment are required");
    }

    #[tokio::test]
    async fn test_member_checkin_requires_contact() {
        let response = test_app()
            .oneshot(json_request(
                "POST",
                "/api/checkin/member",
                serde_json::json!({ "email": "ama@example.com" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Email and phone are required");
    }

    #[tokio::test]
    async fn test_login_requires_credentials() {
        let response = test_app()
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                serde_json::json!({ "username": "admin" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_cors_requires_origin() {
        assert!(cors_layer("https://chapel.example.org").is_some());
        assert!(cors_layer("not a url").is_none());
    }
}
