use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of JWT: access or refresh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Payload of an access token: the user id plus identity fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub sub: Uuid,       // user ID
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub iat: usize,      // issued at (unix timestamp)
    pub exp: usize,      // expires at (unix timestamp)
    pub iss: String,     // issuer
    pub aud: String,     // audience
    pub jti: Uuid,       // unique per token
    pub kind: TokenKind, // always Access
}

/// Payload of a refresh token: only the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
    pub jti: Uuid,
    pub kind: TokenKind, // always Refresh
}

/// Identity fields embedded into an access token.
#[derive(Debug, Clone)]
pub struct Identity<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub username: &'a str,
    pub full_name: &'a str,
}
