// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access and refresh token issuance.
//!
//! ## Token Kinds
//!
//! - **Access token**: HS256 JWT, 10-minute lifetime, verified without a
//!   storage round-trip. Payload: `user_id`, `exp`, `iat`, `iss`.
//! - **Refresh token**: 32 bytes from the system CSPRNG, lowercase hex
//!   (64 characters). Persisted by the credential store, valid for 7 days.
//!
//! The signing secret is checked lazily: a service built without one starts
//! fine and fails every issuance/verification with a configuration error.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{AccessClaims, AuthError};

/// Issuer tag embedded in every access token.
pub const TOKEN_ISSUER: &str = "broker-platform";

/// Access token lifetime.
pub const ACCESS_TOKEN_TTL: TimeDelta = TimeDelta::minutes(10);

/// Refresh token lifetime.
pub const REFRESH_TOKEN_TTL: TimeDelta = TimeDelta::days(7);

/// Entropy per refresh token (256 bits).
const REFRESH_TOKEN_BYTES: usize = 32;

/// The only accepted signing algorithm.
const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Access + refresh token pair returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

impl TokenPair {
    fn new(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: ACCESS_TOKEN_TTL.num_seconds(),
        }
    }
}

/// Issues and verifies access tokens and generates refresh values.
#[derive(Clone)]
pub struct TokenService {
    secret: Option<Arc<[u8]>>,
    rng: SystemRandom,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("secret_configured", &self.secret.is_some())
            .finish()
    }
}

impl TokenService {
    /// Create a token service. An empty secret counts as unset.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret
                .filter(|s| !s.is_empty())
                .map(|s| Arc::from(s.into_bytes())),
            rng: SystemRandom::new(),
        }
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    fn secret(&self) -> Result<&[u8], AuthError> {
        self.secret
            .as_deref()
            .ok_or_else(|| AuthError::ConfigError("JWT secret not configured".to_string()))
    }

    /// Issue a signed access token valid for [`ACCESS_TOKEN_TTL`].
    pub fn issue_access(&self, user_id: Uuid) -> Result<String, AuthError> {
        self.issue_access_at(user_id, Utc::now())
    }

    pub(crate) fn issue_access_at(
        &self,
        user_id: Uuid,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let secret = self.secret()?;
        let claims = AccessClaims {
            user_id,
            exp: (issued_at + ACCESS_TOKEN_TTL).timestamp(),
            iat: issued_at.timestamp(),
            iss: TOKEN_ISSUER.to_string(),
        };
        encode(
            &Header::new(SIGNING_ALGORITHM),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .map_err(|e| AuthError::InternalError(format!("failed to sign access token: {e}")))
    }

    /// Generate a fresh refresh token value: 32 random bytes, hex-encoded.
    pub fn issue_refresh_value(&self) -> Result<String, AuthError> {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AuthError::EntropyUnavailable)?;
        Ok(hex::encode(bytes))
    }

    /// Issue an access token and a refresh value together.
    pub fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, AuthError> {
        let access_token = self.issue_access(user_id)?;
        let refresh_token = self.issue_refresh_value()?;
        Ok(TokenPair::new(access_token, refresh_token))
    }

    /// Verify signature, algorithm, issuer and expiry of an access token.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let secret = self.secret()?;

        // Reject anything not signed with the expected symmetric MAC before
        // the library ever picks a key for it.
        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;
        if header.alg != SIGNING_ALGORITHM {
            return Err(AuthError::InvalidSignature);
        }

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iat", "iss"]);

        let key = DecodingKey::from_secret(secret);
        let token_data =
            decode::<AccessClaims>(token, &key, &validation).map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidIssuer => AuthError::InvalidSignature,
                _ => AuthError::MalformedToken,
            })?;

        Ok(token_data.claims)
    }

    /// Expiry for a refresh credential issued now.
    pub fn refresh_expiry_horizon() -> DateTime<Utc> {
        Utc::now() + REFRESH_TOKEN_TTL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use std::collections::HashSet;

    fn service() -> TokenService {
        TokenService::new(Some("test-secret-with-enough-bytes".to_string()))
    }

    #[test]
    fn issued_access_token_verifies() {
        let svc = service();
        let user_id = Uuid::new_v4();
        let token = svc.issue_access(user_id).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = svc.verify(&token).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.iss, TOKEN_ISSUER);
        assert_eq!(claims.exp - claims.iat, 600);
    }

    #[test]
    fn token_is_valid_just_before_ten_minutes() {
        let svc = service();
        let issued_at = Utc::now() - TimeDelta::minutes(9) - TimeDelta::seconds(50);
        let token = svc.issue_access_at(Uuid::new_v4(), issued_at).unwrap();
        assert!(svc.verify(&token).is_ok());
    }

    #[test]
    fn token_is_expired_after_ten_minutes() {
        let svc = service();
        let issued_at = Utc::now() - TimeDelta::minutes(10) - TimeDelta::seconds(5);
        let token = svc.issue_access_at(Uuid::new_v4(), issued_at).unwrap();
        assert!(matches!(svc.verify(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn wrong_secret_fails_signature() {
        let token = service().issue_access(Uuid::new_v4()).unwrap();
        let other = TokenService::new(Some("another-secret".to_string()));
        assert!(matches!(other.verify(&token), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn tampered_payload_fails_signature() {
        let svc = service();
        let token = svc.issue_access(Uuid::new_v4()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let mut claims: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        claims["user_id"] = serde_json::json!(Uuid::new_v4().to_string());
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());

        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        assert!(matches!(svc.verify(&forged), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn other_algorithms_are_rejected() {
        let svc = service();
        let claims = AccessClaims {
            user_id: Uuid::new_v4(),
            exp: (Utc::now() + TimeDelta::minutes(5)).timestamp(),
            iat: Utc::now().timestamp(),
            iss: TOKEN_ISSUER.to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test-secret-with-enough-bytes"),
        )
        .unwrap();
        assert!(matches!(svc.verify(&token), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn unsigned_token_is_rejected() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(
            format!(
                r#"{{"user_id":"{}","iat":1,"exp":9999999999,"iss":"{TOKEN_ISSUER}"}}"#,
                Uuid::new_v4()
            )
            .as_bytes(),
        );
        let token = format!("{header}.{claims}.");
        assert!(service().verify(&token).is_err());
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let claims = AccessClaims {
            user_id: Uuid::new_v4(),
            exp: (Utc::now() + TimeDelta::minutes(5)).timestamp(),
            iat: Utc::now().timestamp(),
            iss: "someone-else".to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret-with-enough-bytes"),
        )
        .unwrap();
        assert!(matches!(service().verify(&token), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(service().verify("not-a-jwt"), Err(AuthError::MalformedToken)));
        assert!(matches!(service().verify(""), Err(AuthError::MalformedToken)));
    }

    #[test]
    fn missing_secret_is_config_error() {
        let svc = TokenService::new(None);
        assert!(!svc.has_secret());
        assert!(matches!(svc.issue_access(Uuid::new_v4()), Err(AuthError::ConfigError(_))));
        assert!(matches!(svc.verify("a.b.c"), Err(AuthError::ConfigError(_))));

        let empty = TokenService::new(Some(String::new()));
        assert!(matches!(empty.issue_pair(Uuid::new_v4()), Err(AuthError::ConfigError(_))));
    }

    #[test]
    fn refresh_values_are_64_hex_and_unique() {
        let svc = service();
        let values: HashSet<String> = (0..256)
            .map(|_| svc.issue_refresh_value().unwrap())
            .collect();
        assert_eq!(values.len(), 256);
        for value in &values {
            assert_eq!(value.len(), 64);
            assert!(value.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        }
    }

    #[test]
    fn pair_carries_bearer_metadata() {
        let pair = service().issue_pair(Uuid::new_v4()).unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 600);
        assert_eq!(pair.refresh_token.len(), 64);
    }

    #[test]
    fn refresh_horizon_is_seven_days_out() {
        let horizon = TokenService::refresh_expiry_horizon();
        let delta = horizon - Utc::now();
        assert!(delta <= TimeDelta::days(7));
        assert!(delta > TimeDelta::days(7) - TimeDelta::seconds(5));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let rendered = format!("{:?}", service());
        assert!(!rendered.contains("test-secret"));
    }
}
