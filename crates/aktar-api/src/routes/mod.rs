//! HTTP route handlers for the Aktar API.

use std::time::Duration;

use aktar_common::{AktarError, ApiResponse};
use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::state::AppState;

mod auth;
mod captcha;
mod health;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))

        // CAPTCHA endpoints
        .route("/api/captcha/create", post(captcha::create_challenge))
        .route("/api/captcha/verify", post(captcha::verify_challenge))

        // Auth endpoints
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/recover", post(auth::recover))

        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(15),
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )

        // Add shared state
        .with_state(state)
}

/// Hint sent with transient backend failures
const RETRY_AFTER_SECS: &str = "2";

/// Handler error rendered as `{ success: false, message }`
pub struct ApiError(pub AktarError);

impl From<AktarError> for ApiError {
    fn from(err: AktarError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        let body: ApiResponse<()> = ApiResponse::fail(self.0.user_message());
        let mut response = (status, Json(body)).into_response();
        if self.0.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Unwrap a JSON body, turning extractor rejections into validation errors
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(v)| v).map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected request body");
        ApiError(AktarError::Validation("Geçersiz istek gövdesi".to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdminSeed, AppConfig};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn app() -> (Router, AppState) {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = Some("router-test".to_string());
        config.auth.admin_seed = Some(AdminSeed {
            nickname: "yonetici".to_string(),
            password: "cok-gizli".to_string(),
            city: "Ankara".to_string(),
        });
        let state = AppState::new(config).await.unwrap();
        (create_router(state.clone()), state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// Create a challenge over HTTP and return (id, answer)
    async fn challenge(app: &Router, state: &AppState) -> (String, i64) {
        let (status, body) = send(app, "POST", "/api/captcha/create", None).await;
        assert_eq!(status, StatusCode::OK);
        let id = body["data"]["captchaId"].as_str().unwrap().to_string();
        // The answer is not on the wire; read it from the store
        let answer = state.store.peek_answer(&id).await.unwrap() as i64;
        (id, answer)
    }

    #[tokio::test]
    async fn test_create_response_shape() {
        let (app, _) = app().await;
        let (status, body) = send(&app, "POST", "/api/captcha/create", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let data = &body["data"];
        assert!(data.get("correctIndex").is_none());
        assert_eq!(data["circles"].as_array().unwrap().len(), 6);
        assert!(data["image"].as_str().unwrap().starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_captcha_then_admin_login() {
        let (app, state) = app().await;
        let (id, answer) = challenge(&app, &state).await;
        let wrong = (answer + 1) % 6;

        let (status, body) = send(
            &app,
            "POST",
            "/api/captcha/verify",
            Some(json!({ "captchaId": id, "selectedIndex": wrong })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = send(
            &app,
            "POST",
            "/api/captcha/verify",
            Some(json!({ "captchaId": id, "selectedIndex": answer })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["data"]["token"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/login",
            Some(json!({ "nickname": "yonetici", "password": "cok-gizli", "captchaToken": token })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["isAdmin"], true);
        assert!(body["data"]["token"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_register_and_me() {
        let (app, state) = app().await;
        let (id, answer) = challenge(&app, &state).await;
        let (_, body) = send(
            &app,
            "POST",
            "/api/captcha/verify",
            Some(json!({ "captchaId": id, "selectedIndex": answer })),
        )
        .await;
        let captcha_token = body["data"]["token"].as_str().unwrap();

        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/register",
            Some(json!({
                "nickname": "elif",
                "password": "ıhlamur1",
                "confirmPassword": "ıhlamur1",
                "city": "Trabzon",
                "captchaToken": captcha_token,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["isAdmin"], false);
        assert!(body["data"]["recoveryCode"].as_str().is_some());
        let jwt = body["data"]["token"].as_str().unwrap();

        let request = Request::builder()
            .uri("/api/auth/me")
            .header(header::AUTHORIZATION, format!("Bearer {jwt}"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, body) = send(&app, "GET", "/api/auth/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_login_without_captcha_rejected() {
        let (app, _) = app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/login",
            Some(json!({ "nickname": "yonetici", "password": "cok-gizli" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_malformed_body_is_validation_error() {
        let (app, _) = app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/captcha/verify",
            Some(json!({ "captchaId": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().is_some());
    }

    #[test]
    fn test_backend_outage_is_retryable() {
        let response = ApiError(AktarError::Redis("connection reset".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], RETRY_AFTER_SECS);

        let response = ApiError(AktarError::Auth).into_response();
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app().await;
        let (status, body) = send(&app, "GET", "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["store"], true);
        assert_eq!(body["backend"], "memory");
        assert_eq!(body["users"], 1);
    }
}
