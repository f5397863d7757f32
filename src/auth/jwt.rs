use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{AccessClaims, Identity, RefreshClaims, TokenKind};
use crate::{config::JwtConfig, state::AppState};

/// Any failure to accept a token: bad signature, expired, malformed, wrong kind.
/// Carries no cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid token")]
pub struct InvalidToken;

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl KeyPair {
    fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }
}

/// Signs and verifies access and refresh JWTs, each kind with its own secret.
#[derive(Clone)]
pub struct TokenIssuer {
    access: KeyPair,
    refresh: KeyPair,
    issuer: String,
    audience: String,
}

impl FromRef<AppState> for TokenIssuer {
    fn from_ref(state: &AppState) -> Self {
        TokenIssuer::new(&state.config.jwt)
    }
}

/// `(iat, exp)` as unix timestamps. Negative TTLs clamp `exp` at the epoch.
fn window(ttl: Duration) -> (usize, usize) {
    let now = OffsetDateTime::now_utc();
    let exp = now + ttl;
    (
        now.unix_timestamp().max(0) as usize,
        exp.unix_timestamp().max(0) as usize,
    )
}

impl TokenIssuer {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            access: KeyPair::new(&cfg.access_secret, cfg.access_ttl_minutes),
            refresh: KeyPair::new(&cfg.refresh_secret, cfg.refresh_ttl_minutes),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access.ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh.ttl
    }

    pub fn issue_access_token(&self, who: &Identity<'_>) -> anyhow::Result<String> {
        let (iat, exp) = window(self.access.ttl);
        let claims = AccessClaims {
            sub: who.id,
            email: who.email.to_string(),
            username: who.username.to_string(),
            full_name: who.full_name.to_string(),
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
            kind: TokenKind::Access,
        };
        let token = encode(&Header::default(), &claims, &self.access.encoding)?;
        debug!(user_id = %who.id, "access token signed");
        Ok(token)
    }

    pub fn issue_refresh_token(&self, user_id: Uuid) -> anyhow::Result<String> {
        let (iat, exp) = window(self.refresh.ttl);
        let claims = RefreshClaims {
            sub: user_id,
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
            kind: TokenKind::Refresh,
        };
        let token = encode(&Header::default(), &claims, &self.refresh.encoding)?;
        debug!(user_id = %user_id, "refresh token signed");
        Ok(token)
    }

    fn verify<C: DeserializeOwned>(
        &self,
        token: &str,
        key: &DecodingKey,
    ) -> Result<C, InvalidToken> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        decode::<C>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "jwt rejected");
                InvalidToken
            })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, InvalidToken> {
        let claims: AccessClaims = self.verify(token, &self.access.decoding)?;
        if claims.kind != TokenKind::Access {
            return Err(InvalidToken);
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, InvalidToken> {
        let claims: RefreshClaims = self.verify(token, &self.refresh.decoding)?;
        if claims.kind != TokenKind::Refresh {
            return Err(InvalidToken);
        }
        Ok(claims)
    }
}
