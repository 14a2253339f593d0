//! Identity registration saga.
//!
//! Creates the user on the service desk first, then locally. Once the remote
//! identity exists, any later failure deletes it again.

use auth::{AuthResponse, TokenIssuer, hash_password_blocking};
use common::ExternalUserId;
use common::validation::{MIN_PASSWORD_LEN, is_valid_email, is_valid_password};
use service_desk::{NewRemoteUser, Scope, ServiceDesk, ServiceDeskError, extract_user_id};
use store::{IdentityRepository, NewIdentity};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SagaError};
use crate::state::{CompensationPolicy, RegistrationStep};
use crate::trace::SagaTrace;

/// Saga name used in logs and metric labels.
pub const SAGA_NAME: &str = "identity_registration";

/// Registration request.
#[derive(Clone, Default)]
pub struct RegistrationInput {
    pub name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for RegistrationInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationInput")
            .field("name", &self.name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl RegistrationInput {
    /// Checks required fields and formats, returning a trimmed copy.
    ///
    /// The password is taken as given.
    pub fn validate(&self) -> Result<RegistrationInput> {
        let normalized = RegistrationInput {
            name: self.name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        };

        let missing: Vec<&str> = [
            ("name", normalized.name.as_str()),
            ("lastname", normalized.last_name.as_str()),
            ("email", normalized.email.as_str()),
            ("password", normalized.password.trim()),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| field)
        .collect();
        if !missing.is_empty() {
            return Err(SagaError::InvalidInput(format!(
                "required fields missing: {}",
                missing.join(", ")
            )));
        }

        if !is_valid_email(&normalized.email) {
            return Err(SagaError::InvalidInput("invalid email format".to_string()));
        }
        if !is_valid_password(&normalized.password) {
            return Err(SagaError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        Ok(normalized)
    }
}

/// Service desk groupings every new user joins. A zero id skips that scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeConfig {
    pub company_id: i64,
    pub group_id: i64,
    pub location_id: i64,
}

impl ScopeConfig {
    /// Configured scopes in assignment order.
    pub fn targets(&self) -> impl Iterator<Item = (Scope, i64)> + use<> {
        [
            (Scope::Company, self.company_id),
            (Scope::Group, self.group_id),
            (Scope::Location, self.location_id),
        ]
        .into_iter()
        .filter(|(_, id)| *id > 0)
    }
}

/// Registers identities across the service desk and the local store.
pub struct IdentitySaga<R, D> {
    identities: R,
    desk: D,
    issuer: TokenIssuer,
    scopes: ScopeConfig,
}

impl<R, D> IdentitySaga<R, D>
where
    R: IdentityRepository,
    D: ServiceDesk,
{
    pub const POLICY: CompensationPolicy = CompensationPolicy::Compensate;

    pub fn new(identities: R, desk: D, issuer: TokenIssuer, scopes: ScopeConfig) -> Self {
        Self {
            identities,
            desk,
            issuer,
            scopes,
        }
    }

    /// Runs the registration saga.
    ///
    /// On success exactly one local identity exists, linked to the remote
    /// user the service desk returned. On failure after the remote user was
    /// created, that user has been deleted again, or the error says it could
    /// not be.
    #[tracing::instrument(skip_all, fields(saga = SAGA_NAME, email = %input.email))]
    pub async fn register(
        &self,
        input: &RegistrationInput,
        cancel: &CancellationToken,
    ) -> Result<AuthResponse> {
        let mut trace = SagaTrace::start(SAGA_NAME, Self::POLICY);
        let result = self.run(&mut trace, input, cancel).await;
        trace.finish(&result);
        result
    }

    async fn run(
        &self,
        trace: &mut SagaTrace<RegistrationStep>,
        input: &RegistrationInput,
        cancel: &CancellationToken,
    ) -> Result<AuthResponse> {
        trace.enter(RegistrationStep::ValidateInput);
        let input = input.validate()?;
        trace.complete(RegistrationStep::ValidateInput);

        trace.enter(RegistrationStep::CheckLocalUniqueness);
        match self.identities.get_by_email(&input.email).await {
            Ok(Some(_)) => {
                return Err(SagaError::AlreadyExists(
                    "email already registered".to_string(),
                ));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "failed to check existing identity");
                return Err(SagaError::Internal(
                    "failed to check user existence".to_string(),
                ));
            }
        }
        trace.complete(RegistrationStep::CheckLocalUniqueness);

        trace.enter(RegistrationStep::CheckRemoteUniqueness);
        match self.desk.get_user_by_email(&input.email, cancel).await {
            Ok(Some(_)) => {
                tracing::warn!("email already exists on the service desk");
                return Err(SagaError::AlreadyExists("email already in use".to_string()));
            }
            Ok(None) => {}
            Err(e) if e.is_cancelled() => {
                return Err(SagaError::Cancelled {
                    step: trace.current_name(),
                });
            }
            Err(e) if e.is_client_rejection() => {
                tracing::debug!(error = %e, "lookup rejected, treating email as unused");
            }
            Err(e) => {
                return Err(SagaError::external(
                    "failed to check email in external service",
                    e,
                ));
            }
        }
        trace.complete(RegistrationStep::CheckRemoteUniqueness);

        let password_hash = hash_password_blocking(input.password.clone())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to hash password");
                SagaError::Internal("failed to process password".to_string())
            })?;

        trace.enter(RegistrationStep::CreateRemoteIdentity);
        let remote_user = NewRemoteUser {
            name: input.name.clone(),
            last_name: input.last_name.clone(),
            email: input.email.clone(),
            password: input.password.clone(),
        };
        let response = match self.desk.create_user(&remote_user, cancel).await {
            Ok(response) => response,
            Err(e) if e.is_cancelled() => {
                return Err(SagaError::Cancelled {
                    step: trace.current_name(),
                });
            }
            Err(ServiceDeskError::Status { status: 409, .. }) => {
                return Err(SagaError::AlreadyExists("email already in use".to_string()));
            }
            Err(e) => {
                return Err(SagaError::external(
                    "failed to create user in external service",
                    e,
                ));
            }
        };
        let external_id = extract_user_id(&response).ok_or_else(|| {
            tracing::error!(%response, "create user response has no usable id");
            SagaError::external(
                "failed to process external user response",
                ServiceDeskError::UnexpectedResponse(
                    "missing or non-positive user id".to_string(),
                ),
            )
        })?;
        trace.complete(RegistrationStep::CreateRemoteIdentity);
        tracing::debug!(%external_id, "remote identity created");

        trace.enter(RegistrationStep::AssignScopes);
        if let Err(e) = self.assign_scopes(external_id, cancel).await {
            tracing::error!(
                error = %e,
                %external_id,
                "failed to assign user to default scopes, attempting compensation"
            );
            let compensation = self.compensate(trace, external_id, &input.email).await;
            if e.is_cancelled() {
                return Err(SagaError::Cancelled {
                    step: trace.current_name(),
                });
            }
            return Err(SagaError::external(
                with_cleanup_note(
                    "failed to assign user to default configuration",
                    external_id,
                    compensation,
                ),
                e,
            ));
        }
        trace.complete(RegistrationStep::AssignScopes);

        trace.enter(RegistrationStep::CreateLocalRecord);
        let new_identity = NewIdentity {
            name: input.name.clone(),
            last_name: input.last_name.clone(),
            email: input.email.clone(),
            password_hash,
            external_user_id: external_id,
            created_by: input.email.clone(),
        };
        let identity = match self.identities.create(new_identity).await {
            Ok(identity) => identity,
            Err(e) if e.is_duplicate_key() => {
                tracing::warn!(%external_id, "duplicate email detected during registration");
                let compensation = self.compensate(trace, external_id, &input.email).await;
                return Err(SagaError::AlreadyExists(with_cleanup_note(
                    "email already registered",
                    external_id,
                    compensation,
                )));
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    %external_id,
                    "failed to create identity locally, attempting compensation"
                );
                return Err(match self.compensate(trace, external_id, &input.email).await {
                    Ok(()) => {
                        SagaError::Internal("failed to create user in local database".to_string())
                    }
                    Err(compensation) => SagaError::CompensationFailed {
                        message: "failed to create user and compensation failed - manual cleanup may be required".to_string(),
                        original: e.to_string(),
                        compensation: compensation.to_string(),
                    },
                });
            }
        };
        trace.complete(RegistrationStep::CreateLocalRecord);

        trace.enter(RegistrationStep::IssueTokens);
        let tokens = self.issuer.issue_pair(&identity.email).map_err(|e| {
            tracing::error!(error = %e, "failed to generate tokens");
            SagaError::Internal("failed to generate token".to_string())
        })?;
        trace.complete(RegistrationStep::IssueTokens);

        tracing::info!(%external_id, "user registered successfully");
        Ok(AuthResponse::new(&identity, tokens))
    }

    async fn assign_scopes(
        &self,
        user: ExternalUserId,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), ServiceDeskError> {
        for (scope, id) in self.scopes.targets() {
            let result = match scope {
                Scope::Company => self.desk.assign_user_to_company(id, user, cancel).await,
                Scope::Group => self.desk.assign_user_to_group(id, user, cancel).await,
                Scope::Location => self.desk.assign_user_to_location(id, user, cancel).await,
            };
            if let Err(e) = result {
                tracing::warn!(?scope, scope_id = id, error = %e, "scope assignment failed");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Undoes completed steps, most recent first. Returns the last
    /// compensation failure, if any.
    async fn compensate(
        &self,
        trace: &mut SagaTrace<RegistrationStep>,
        external_id: ExternalUserId,
        email: &str,
    ) -> std::result::Result<(), ServiceDeskError> {
        trace.begin_compensation();
        let mut outcome = Ok(());

        for step in trace.pending_compensation() {
            if step != RegistrationStep::CreateRemoteIdentity {
                continue;
            }
            // Detached from the caller's token: the undo runs even if the caller gave up.
            let detached = CancellationToken::new();
            match self.desk.delete_user(external_id, &detached).await {
                Ok(()) => {
                    trace.record_compensation(step, true);
                    tracing::info!(%external_id, email, "compensated: deleted external user");
                }
                Err(e) => {
                    trace.record_compensation(step, false);
                    tracing::error!(
                        error = %e,
                        %external_id,
                        email,
                        "compensation failed: could not delete external user - manual cleanup required"
                    );
                    outcome = Err(e);
                }
            }
        }
        outcome
    }
}

fn with_cleanup_note(
    message: &str,
    external_id: ExternalUserId,
    compensation: std::result::Result<(), ServiceDeskError>,
) -> String {
    match compensation {
        Ok(()) => message.to_string(),
        Err(e) => format!(
            "{message}; compensation failed, manual cleanup required for external user {external_id}: {e}"
        ),
    }
}
