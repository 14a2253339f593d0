//! HS256 token issuing and validation.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AuthError, Result, RevocationList};

/// Lifetime of an access token.
pub const ACCESS_TOKEN_TTL: Duration = Duration::minutes(15);

/// Lifetime of a refresh token.
pub const REFRESH_TOKEN_TTL: Duration = Duration::days(365);

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// The identity's email.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token, so two tokens issued in the same second differ.
    pub jti: String,
}

impl Claims {
    /// Expiry as a timestamp.
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// An access token and the refresh token issued with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs and validates tokens with a shared secret.
///
/// Validation consults the [`RevocationList`] before checking the signature.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    revocations: RevocationList,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("revocations", &self.revocations.len())
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &[u8], revocations: RevocationList) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            revocations,
        }
    }

    pub fn revocations(&self) -> &RevocationList {
        &self.revocations
    }

    /// Issues an access/refresh pair for `subject`.
    pub fn issue_pair(&self, subject: &str) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue(subject, ACCESS_TOKEN_TTL)?,
            refresh_token: self.issue(subject, REFRESH_TOKEN_TTL)?,
        })
    }

    /// Issues a single token valid for `ttl`.
    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("failed to sign token: {e}")))
    }

    /// Validates a token: not revoked, correctly signed and not expired.
    pub fn validate(&self, token: &str) -> Result<Claims> {
        if self.revocations.is_revoked(token) {
            return Err(AuthError::Unauthorized("token has been revoked".to_string()));
        }

        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Self::validation(true))
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                AuthError::Unauthorized("invalid token".to_string())
            })
    }

    /// Decodes a token checking only its signature, so an expired token
    /// still yields its real expiry.
    pub fn decode_unchecked_expiry(&self, token: &str) -> Result<Claims> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Self::validation(false))
            .map(|data| data.claims)
            .map_err(|_| AuthError::Unauthorized("invalid token".to_string()))
    }

    fn validation(check_expiry: bool) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = check_expiry;
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(b"test-secret", RevocationList::new())
    }

    #[test]
    fn test_issue_and_validate() {
        let issuer = issuer();
        let pair = issuer.issue_pair("ada@x.com").unwrap();
        assert_ne!(pair.access_token, pair.refresh_token);

        let access = issuer.validate(&pair.access_token).unwrap();
        assert_eq!(access.sub, "ada@x.com");
        assert_eq!(access.exp - access.iat, ACCESS_TOKEN_TTL.num_seconds());

        let refresh = issuer.validate(&pair.refresh_token).unwrap();
        assert_eq!(refresh.exp - refresh.iat, REFRESH_TOKEN_TTL.num_seconds());
    }

    #[test]
    fn test_tokens_are_unique() {
        let issuer = issuer();
        let a = issuer.issue("ada@x.com", ACCESS_TOKEN_TTL).unwrap();
        let b = issuer.issue("ada@x.com", ACCESS_TOKEN_TTL).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = issuer();
        let token = issuer.issue("ada@x.com", Duration::seconds(-10)).unwrap();
        assert!(matches!(
            issuer.validate(&token),
            Err(AuthError::Unauthorized(msg)) if msg == "invalid token"
        ));

        // Expiry is still readable for revocation.
        let claims = issuer.decode_unchecked_expiry(&token).unwrap();
        assert!(claims.expires_at() < Utc::now());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issuer().issue("ada@x.com", ACCESS_TOKEN_TTL).unwrap();
        let other = TokenIssuer::new(b"other-secret", RevocationList::new());
        assert!(other.validate(&token).is_err());
        assert!(other.decode_unchecked_expiry(&token).is_err());
    }

    #[test]
    fn test_revoked_token_rejected() {
        let issuer = issuer();
        let token = issuer.issue("ada@x.com", ACCESS_TOKEN_TTL).unwrap();
        issuer
            .revocations()
            .add(token.clone(), Utc::now() + ACCESS_TOKEN_TTL);

        assert!(matches!(
            issuer.validate(&token),
            Err(AuthError::Unauthorized(msg)) if msg == "token has been revoked"
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(issuer().validate("not.a.jwt").is_err());
    }
}
