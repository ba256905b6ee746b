//! JWT Authentication
//!
//! Optional identity for connections. Tokens are issued by an external
//! provider; the server only validates them. When no key is configured,
//! clients state their player id in `join` and the server trusts it.

use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::hash::DigestHasher;
use crate::game::state::PlayerId;

/// Domain separator for subject-derived player ids.
const PLAYER_ID_DOMAIN: &[u8] = b"dice-proof-player:";

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If None, any audience accepted.
    pub audience: Option<String>,
    /// RS256 public key in PEM format.
    pub public_key_pem: Option<String>,
    /// HS256 secret.
    pub secret: Option<String>,
    /// Skip expiry validation (testing only).
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Read `AUTH_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("AUTH_SECRET").ok(),
            skip_expiry: std::env::var("AUTH_SKIP_EXPIRY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Whether tokens are required.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

/// Claims read from a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject, the provider's user id.
    pub sub: String,
    /// Expiry (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued at.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
}

impl TokenClaims {
    /// Deterministic player id for the subject: `p-` followed by 32 hex
    /// characters of `SHA256(domain | sub)`. Provider subjects may contain
    /// characters that player ids do not allow.
    pub fn player_id(&self) -> Result<PlayerId, AuthError> {
        let mut hasher = DigestHasher::new(PLAYER_ID_DOMAIN);
        hasher.update_str(&self.sub);
        let digest = hasher.finalize();
        let raw = format!("p-{}", hex::encode(&digest.as_bytes()[..16]));
        PlayerId::try_from(raw).map_err(|e| AuthError::DecodeError(e.to_string()))
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No key configured on the server.
    #[error("authentication not configured")]
    NotConfigured,
    /// Token is not a JWT.
    #[error("invalid token format")]
    InvalidFormat,
    /// Signature check failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token expired.
    #[error("token expired")]
    Expired,
    /// Issuer mismatch.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Audience mismatch.
    #[error("invalid audience")]
    InvalidAudience,
    /// Required claim missing.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// Other decoding failure.
    #[error("decode error: {0}")]
    DecodeError(String),
}

/// Validate a token and extract its claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    let (key, algorithm) = if let Some(pem) = &config.public_key_pem {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e)))?;
        (key, Algorithm::RS256)
    } else if let Some(secret) = &config.secret {
        (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)
    } else {
        return Err(AuthError::NotConfigured);
    };

    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims = std::collections::HashSet::new();
    if let Some(issuer) = &config.issuer {
        validation.set_issuer(&[issuer]);
    }
    if let Some(audience) = &config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }
    if config.skip_expiry {
        validation.validate_exp = false;
    }

    let token_data: TokenData<TokenClaims> =
        decode(token, &key, &validation).map_err(map_jwt_error)?;
    let claims = token_data.claims;

    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    // exp is optional in required_spec_claims, so check it here as well
    if !config.skip_expiry && claims.exp > 0 {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        if now > claims.exp {
            return Err(AuthError::Expired);
        }
    }

    Ok(claims)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "table-secret-key-256-bits-long!!";

    fn token(claims: &TokenClaims, secret: &str) -> String {
        let key = EncodingKey::from_secret(secret.as_bytes());
        encode(&Header::new(Algorithm::HS256), claims, &key).unwrap()
    }

    fn claims() -> TokenClaims {
        let now = chrono::Utc::now().timestamp() as u64;
        TokenClaims {
            sub: "auth0|user123".into(),
            exp: now + 3600,
            iat: now,
            iss: Some("test-issuer".into()),
            aud: Some(serde_json::json!("dice-tables")),
        }
    }

    fn hs256() -> AuthConfig {
        AuthConfig { secret: Some(SECRET.into()), ..Default::default() }
    }

    #[test]
    fn test_valid_token() {
        let claims = validate_token(&token(&claims(), SECRET), &hs256()).unwrap();
        assert_eq!(claims.sub, "auth0|user123");
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut c = claims();
        c.exp = 1;
        let result = validate_token(&token(&c, SECRET), &hs256());
        assert!(matches!(result, Err(AuthError::Expired)));

        let config = AuthConfig { skip_expiry: true, ..hs256() };
        assert!(validate_token(&token(&c, SECRET), &config).is_ok());
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let result = validate_token(&token(&claims(), "some-other-secret-entirely!!!!!"), &hs256());
        assert!(matches!(result, Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_issuer_and_audience() {
        let t = token(&claims(), SECRET);
        let config = AuthConfig { issuer: Some("elsewhere".into()), ..hs256() };
        assert!(matches!(validate_token(&t, &config), Err(AuthError::InvalidIssuer)));

        let config = AuthConfig { audience: Some("dice-tables".into()), ..hs256() };
        assert!(validate_token(&t, &config).is_ok());
    }

    #[test]
    fn test_missing_sub_rejected() {
        let mut c = claims();
        c.sub.clear();
        let result = validate_token(&token(&c, SECRET), &hs256());
        assert!(matches!(result, Err(AuthError::MissingClaim(_))));
    }

    #[test]
    fn test_not_configured() {
        let result = validate_token("a.b.c", &AuthConfig::default());
        assert!(matches!(result, Err(AuthError::NotConfigured)));
    }

    #[test]
    fn test_player_id_from_subject() {
        let a = claims().player_id().unwrap();
        assert_eq!(a, claims().player_id().unwrap());
        assert!(a.as_str().starts_with("p-"));
        assert_eq!(a.as_str().len(), 34);

        let other = TokenClaims { sub: "auth0|user456".into(), ..claims() };
        assert_ne!(a, other.player_id().unwrap());
    }
}
