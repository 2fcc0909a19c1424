//! HTTP client for the Aktar API.
//!
//! Authenticated calls carry `Authorization: Bearer <token>` from the
//! session store. A 401 on such a call clears the session; a 401 on login
//! or register leaves it alone.

use std::sync::Arc;
use std::time::Duration;

use aktar_common::{
    AktarError, ApiResponse, AuthPayload, LoginRequest, PublicChallenge, RegisterPayload,
    RegisterRequest, UserProfile, VerifiedToken, VerifyRequest,
};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::ClientError;
use crate::session::SessionStore;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: Arc<SessionStore>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn create_captcha(&self) -> Result<PublicChallenge, ClientError> {
        let request = self.http.post(self.url("/api/captcha/create"));
        self.send(request, false).await
    }

    pub async fn verify_captcha(
        &self,
        captcha_id: &str,
        selected_index: i64,
    ) -> Result<VerifiedToken, ClientError> {
        let body = VerifyRequest {
            captcha_id: captcha_id.to_string(),
            selected_index,
        };
        let request = self.http.post(self.url("/api/captcha/verify")).json(&body);
        self.send(request, false).await
    }

    /// Verify a click at canvas pixel `(x, y)`.
    ///
    /// A click outside every circle is rejected locally without spending
    /// an attempt.
    pub async fn verify_click(
        &self,
        challenge: &PublicChallenge,
        x: u32,
        y: u32,
    ) -> Result<VerifiedToken, ClientError> {
        let index = challenge.circle_at(x, y).ok_or_else(|| {
            AktarError::Validation("Lütfen bir daireye tıklayın".to_string())
        })?;
        self.verify_captcha(&challenge.captcha_id, i64::from(index))
            .await
    }

    /// Log in and store the session
    pub async fn login(
        &self,
        nickname: &str,
        password: &str,
        captcha_token: &str,
    ) -> Result<UserProfile, ClientError> {
        let body = LoginRequest {
            nickname: nickname.to_string(),
            password: password.to_string(),
            captcha_token: captcha_token.to_string(),
        };
        let request = self.http.post(self.url("/api/auth/login")).json(&body);
        let payload: AuthPayload = self.send(request, false).await?;

        self.session.set_auth(payload.token, payload.user.clone())?;
        Ok(payload.user)
    }

    /// Register and store the session. The recovery code is only returned here.
    pub async fn register(&self, body: &RegisterRequest) -> Result<RegisterPayload, ClientError> {
        let request = self.http.post(self.url("/api/auth/register")).json(body);
        let payload: RegisterPayload = self.send(request, false).await?;

        self.session
            .set_auth(payload.token.clone(), payload.user.clone())?;
        Ok(payload)
    }

    /// Fetch the current profile and refresh the stored copy
    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        let request = self.http.get(self.url("/api/auth/me"));
        let user: UserProfile = self.send(request, true).await?;

        self.session.refresh_user(user.clone())?;
        Ok(user)
    }

    pub fn logout(&self) -> Result<(), ClientError> {
        self.session.clear_auth()
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        authenticated: bool,
    ) -> Result<T, ClientError> {
        let request = if authenticated {
            match self.session.token() {
                Some(token) => request.bearer_auth(token),
                None => return Err(ClientError::Unauthorized(AktarError::Auth.user_message())),
            }
        } else {
            request
        };

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let envelope = serde_json::from_slice::<ApiResponse<T>>(&bytes);

        if status == StatusCode::UNAUTHORIZED {
            let message = envelope
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| AktarError::Auth.user_message());
            if authenticated {
                tracing::warn!("Session rejected by server, clearing");
                self.session.clear_auth()?;
            }
            return Err(ClientError::Unauthorized(message));
        }

        match envelope {
            Ok(ApiResponse {
                success: true,
                data: Some(data),
                ..
            }) if status.is_success() => Ok(data),
            Ok(ApiResponse { message, .. }) => Err(ClientError::Api {
                status: status.as_u16(),
                message: message.unwrap_or_else(unexpected_response),
            }),
            Err(e) => {
                tracing::debug!(status = status.as_u16(), error = %e, "Undecodable response body");
                Err(ClientError::Api {
                    status: status.as_u16(),
                    message: unexpected_response(),
                })
            }
        }
    }
}

fn unexpected_response() -> String {
    "Sunucudan beklenmeyen yanıt".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode as AxumStatus, header},
        routing::{get, post},
    };
    use serde_json::{Value, json};

    fn stub_user() -> Value {
        json!({ "id": 1, "nickname": "yonetici", "city": "Ankara", "isAdmin": true })
    }

    fn fail(status: AxumStatus, message: &str) -> (AxumStatus, Json<Value>) {
        (status, Json(json!({ "success": false, "message": message })))
    }

    async fn verify(Json(body): Json<Value>) -> (AxumStatus, Json<Value>) {
        if body["selectedIndex"] == 2 {
            (
                AxumStatus::OK,
                Json(json!({ "success": true, "data": { "token": "cap-1", "expiresAt": 0 } })),
            )
        } else {
            fail(AxumStatus::BAD_REQUEST, "Yanlış seçim")
        }
    }

    async fn login(Json(body): Json<Value>) -> (AxumStatus, Json<Value>) {
        if body["password"] == "dogru" && body["captchaToken"] == "cap-1" {
            (
                AxumStatus::OK,
                Json(json!({ "success": true, "data": { "token": "jwt-good", "user": stub_user() } })),
            )
        } else {
            fail(AxumStatus::UNAUTHORIZED, "Kullanıcı adı, şifre veya doğrulama hatalı")
        }
    }

    async fn me(headers: HeaderMap) -> (AxumStatus, Json<Value>) {
        let authorized = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            == Some("Bearer jwt-good");
        if authorized {
            (AxumStatus::OK, Json(json!({ "success": true, "data": stub_user() })))
        } else {
            fail(AxumStatus::UNAUTHORIZED, "Oturum geçersiz")
        }
    }

    /// Serve the stub on an ephemeral port and return its base URL
    async fn spawn_stub() -> String {
        let app = Router::new()
            .route("/api/captcha/verify", post(verify))
            .route("/api/auth/login", post(login))
            .route("/api/auth/me", get(me));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn client(base_url: &str) -> ApiClient {
        let session = Arc::new(SessionStore::load(Arc::new(MemoryStorage::new())));
        ApiClient::new(base_url, session).unwrap()
    }

    #[tokio::test]
    async fn test_captcha_then_login_stores_session() {
        let base = spawn_stub().await;
        let api = client(&base);

        let err = api.verify_captcha("c1", 0).await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 400, .. }));
        assert_eq!(err.user_message(), "Yanlış seçim");

        let token = api.verify_captcha("c1", 2).await.unwrap();
        let err = api.login("yonetici", "yanlis", &token.token).await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized(_)));
        assert!(!api.session().is_authenticated());

        let user = api.login("yonetici", "dogru", &token.token).await.unwrap();
        assert!(user.is_admin);
        assert_eq!(api.session().token().as_deref(), Some("jwt-good"));

        let me = api.me().await.unwrap();
        assert_eq!(me, user);
    }

    #[tokio::test]
    async fn test_click_resolves_to_circle() {
        let base = spawn_stub().await;
        let api = client(&base);
        let challenge: PublicChallenge = serde_json::from_value(json!({
            "captchaId": "c1",
            "circles": [
                { "id": 0, "x": 40, "y": 40, "radius": 20 },
                { "id": 1, "x": 120, "y": 40, "radius": 20 },
                { "id": 2, "x": 200, "y": 120, "radius": 24 },
            ],
            "image": "data:image/png;base64,",
            "width": 320,
            "height": 200,
            "expiresAt": 0,
        }))
        .unwrap();

        let token = api.verify_click(&challenge, 210, 130).await.unwrap();
        assert_eq!(token.token, "cap-1");

        let err = api.verify_click(&challenge, 40, 45).await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 400, .. }));

        let err = api.verify_click(&challenge, 300, 190).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(AktarError::Validation(_))));
    }

    #[tokio::test]
    async fn test_rejected_token_clears_session() {
        let base = spawn_stub().await;
        let api = client(&base);
        let user: UserProfile = serde_json::from_value(stub_user()).unwrap();

        api.session().set_auth("jwt-stale", user).unwrap();
        let err = api.me().await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized(_)));
        assert!(api.session().token().is_none());
        assert!(api.session().user().is_none());

        // No token, no request
        assert!(matches!(api.me().await, Err(ClientError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_failed_login_keeps_existing_session() {
        let base = spawn_stub().await;
        let api = client(&base);
        let user: UserProfile = serde_json::from_value(stub_user()).unwrap();
        api.session().set_auth("jwt-good", user).unwrap();

        assert!(api.login("yonetici", "yanlis", "cap-1").await.is_err());
        assert_eq!(api.session().token().as_deref(), Some("jwt-good"));
    }
}
