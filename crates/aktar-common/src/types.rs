//! Wire types shared between the Aktar API and its clients.
//!
//! Everything here crosses the HTTP boundary, so field names follow the
//! storefront's camelCase JSON.

use serde::{Deserialize, Serialize};

/// Response envelope used by every endpoint:
/// `{ success, data }` on success, `{ success: false, message }` on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// One circle as the client sees it.
///
/// Every circle carries the same fields; nothing here distinguishes the
/// broken one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicCircle {
    pub id: u8,
    pub x: u32,
    pub y: u32,
    pub radius: u32,
}

impl PublicCircle {
    /// True if the point lies inside this circle
    pub fn contains(&self, px: u32, py: u32) -> bool {
        let dx = px as i64 - self.x as i64;
        let dy = py as i64 - self.y as i64;
        let r = self.radius as i64;
        dx * dx + dy * dy <= r * r
    }
}

/// Challenge data sent to the client by `POST /api/captcha/create`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicChallenge {
    pub captcha_id: String,
    pub circles: Vec<PublicCircle>,
    /// `data:image/png;base64,...`
    pub image: String,
    pub width: u32,
    pub height: u32,
    /// Unix epoch seconds
    pub expires_at: i64,
}

impl PublicChallenge {
    /// Index of the circle under a click at `(x, y)` in canvas pixels
    pub fn circle_at(&self, x: u32, y: u32) -> Option<u8> {
        self.circles.iter().find(|c| c.contains(x, y)).map(|c| c.id)
    }
}

/// Body of `POST /api/captcha/verify`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub captcha_id: String,
    pub selected_index: i64,
}

/// Successful verification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedToken {
    pub token: String,
    pub expires_at: i64,
}

/// Authenticated user as exposed to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: u64,
    pub nickname: String,
    pub city: String,
    pub is_admin: bool,
}

/// Body of `POST /api/auth/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub nickname: String,
    pub password: String,
    #[serde(default)]
    pub captcha_token: String,
}

/// Body of `POST /api/auth/register`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub nickname: String,
    pub password: String,
    pub confirm_password: String,
    pub city: String,
    #[serde(default)]
    pub captcha_token: String,
}

/// `data` of a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPayload {
    pub token: String,
    pub user: UserProfile,
}

/// `data` of a successful registration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub token: String,
    pub user: UserProfile,
    /// Shown once; only a hash is kept server-side
    pub recovery_code: String,
}
