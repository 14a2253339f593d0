//! Login, refresh, revoke and bearer authentication.

use chrono::Utc;
use common::validation::is_valid_email;
use serde::{Deserialize, Serialize};
use store::{Identity, IdentityRepository};

use crate::password::verify_password_blocking;
use crate::token::{ACCESS_TOKEN_TTL, Claims, TokenIssuer, TokenPair};
use crate::{AuthError, Result};

/// Payload returned by every operation that issues tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    pub name: String,
    #[serde(rename = "lastname")]
    pub last_name: String,
    pub email: String,
}

impl AuthResponse {
    pub fn new(identity: &Identity, tokens: TokenPair) -> Self {
        Self {
            token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            name: identity.name.clone(),
            last_name: identity.last_name.clone(),
            email: identity.email.clone(),
        }
    }
}

/// Token lifecycle on top of the identity store.
pub struct AuthService<R> {
    identities: R,
    issuer: TokenIssuer,
}

impl<R: IdentityRepository> AuthService<R> {
    pub fn new(identities: R, issuer: TokenIssuer) -> Self {
        Self { identities, issuer }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Verifies credentials and issues a token pair.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let email = email.trim();
        if email.is_empty() || password.trim().is_empty() {
            return Err(AuthError::InvalidInput(
                "email and password are required".to_string(),
            ));
        }
        if !is_valid_email(email) {
            return Err(AuthError::InvalidInput("invalid email format".to_string()));
        }

        let Some(identity) = self.identities.get_by_email(email).await? else {
            tracing::warn!("login attempt with unknown email");
            metrics::counter!("auth_logins_total", "outcome" => "rejected").increment(1);
            return Err(AuthError::InvalidCredentials);
        };

        let matches =
            verify_password_blocking(password.to_string(), identity.password_hash.clone()).await?;
        if !matches {
            tracing::warn!("login attempt with wrong password");
            metrics::counter!("auth_logins_total", "outcome" => "rejected").increment(1);
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.issuer.issue_pair(&identity.email)?;
        metrics::counter!("auth_logins_total", "outcome" => "accepted").increment(1);
        tracing::info!("user logged in");
        Ok(AuthResponse::new(&identity, tokens))
    }

    /// Exchanges a valid refresh token for a fresh pair.
    ///
    /// The presented token stays valid until it expires or is revoked.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse> {
        let claims = self.issuer.validate(refresh_token)?;

        let identity = self
            .identities
            .get_by_email(&claims.sub)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("user not found".to_string()))?;

        let tokens = self.issuer.issue_pair(&identity.email)?;
        tracing::info!("token refreshed");
        Ok(AuthResponse::new(&identity, tokens))
    }

    /// Revokes `token` until its own expiry.
    ///
    /// A token whose signature cannot be verified is revoked for one
    /// access-token lifetime instead.
    #[tracing::instrument(skip_all)]
    pub fn revoke(&self, token: &str) {
        let expires_at = match self.issuer.decode_unchecked_expiry(token) {
            Ok(claims) => claims.expires_at(),
            Err(_) => Utc::now() + ACCESS_TOKEN_TTL,
        };
        self.issuer.revocations().add(token, expires_at);
        tracing::info!(%expires_at, "token revoked");
    }

    /// Validates a bearer token and returns its claims.
    pub fn authenticate(&self, token: &str) -> Result<Claims> {
        self.issuer.validate(token)
    }

    /// Resolves the identity a validated token belongs to.
    pub async fn identity_for(&self, claims: &Claims) -> Result<Option<Identity>> {
        Ok(self.identities.get_by_email(&claims.sub).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::hash_password;
    use crate::RevocationList;
    use chrono::Duration;
    use common::ExternalUserId;
    use store::{InMemoryIdentityRepository, NewIdentity};

    async fn service() -> AuthService<InMemoryIdentityRepository> {
        let repo = InMemoryIdentityRepository::new();
        repo.create(NewIdentity {
            name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@x.com".to_string(),
            password_hash: hash_password("secret1").unwrap(),
            external_user_id: ExternalUserId::new(501).unwrap(),
            created_by: "ada@x.com".to_string(),
        })
        .await
        .unwrap();
        AuthService::new(repo, TokenIssuer::new(b"test-secret", RevocationList::new()))
    }

    #[tokio::test]
    async fn test_login_success() {
        let auth = service().await;
        let response = auth.login("ada@x.com", "secret1").await.unwrap();
        assert_eq!(response.email, "ada@x.com");
        assert_eq!(response.last_name, "Lovelace");
        assert_eq!(auth.authenticate(&response.token).unwrap().sub, "ada@x.com");
        assert!(!response.refresh_token.is_empty());
    }

    #[tokio::test]
    async fn test_login_rejections() {
        let auth = service().await;
        assert!(matches!(
            auth.login("ada@x.com", "wrong-pass").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("nobody@x.com", "secret1").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("", "secret1").await,
            Err(AuthError::InvalidInput(msg)) if msg == "email and password are required"
        ));
        assert!(matches!(
            auth.login("not-an-email", "secret1").await,
            Err(AuthError::InvalidInput(msg)) if msg == "invalid email format"
        ));
    }

    #[tokio::test]
    async fn test_refresh_issues_new_pair_and_keeps_old() {
        let auth = service().await;
        let first = auth.login("ada@x.com", "secret1").await.unwrap();
        let second = auth.refresh(&first.refresh_token).await.unwrap();

        assert_ne!(first.token, second.token);
        assert_ne!(first.refresh_token, second.refresh_token);
        assert!(auth.authenticate(&first.refresh_token).is_ok());
    }

    #[tokio::test]
    async fn test_refresh_for_deleted_identity() {
        let auth = service().await;
        let token = auth
            .issuer()
            .issue("gone@x.com", Duration::minutes(5))
            .unwrap();
        assert!(matches!(
            auth.refresh(&token).await,
            Err(AuthError::Unauthorized(msg)) if msg == "user not found"
        ));
    }

    #[tokio::test]
    async fn test_revoke_blocks_token_and_refresh() {
        let auth = service().await;
        let response = auth.login("ada@x.com", "secret1").await.unwrap();

        auth.revoke(&response.token);
        auth.revoke(&response.refresh_token);

        assert!(matches!(
            auth.authenticate(&response.token),
            Err(AuthError::Unauthorized(msg)) if msg == "token has been revoked"
        ));
        assert!(auth.refresh(&response.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn test_revoke_uses_token_expiry() {
        let auth = service().await;
        let token = auth
            .issuer()
            .issue("ada@x.com", Duration::seconds(2))
            .unwrap();
        auth.revoke(&token);
        assert!(auth.issuer().revocations().is_revoked(&token));

        tokio::time::sleep(std::time::Duration::from_millis(3100)).await;
        assert!(!auth.issuer().revocations().is_revoked(&token));
    }

    #[tokio::test]
    async fn test_revoke_garbage_token() {
        let auth = service().await;
        auth.revoke("garbage");
        assert!(auth.issuer().revocations().is_revoked("garbage"));
    }
}
