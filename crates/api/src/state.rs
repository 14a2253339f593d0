//! Shared application state.

use std::sync::Arc;

use auth::{AuthService, TokenIssuer};
use saga::{IdentitySaga, ScopeConfig, TicketSaga};
use service_desk::ServiceDesk;
use store::{IdentityRepository, TicketRepository};
use ticketing::{AllowedCategories, TicketService};
use tokio_util::sync::CancellationToken;

pub type Identities = Arc<dyn IdentityRepository>;
pub type Tickets = Arc<dyn TicketRepository>;
pub type Desk = Arc<dyn ServiceDesk>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub auth: AuthService<Identities>,
    pub identity_saga: IdentitySaga<Identities, Desk>,
    pub ticket_saga: TicketSaga<Identities, Tickets, Desk>,
    pub tickets: TicketService<Identities, Tickets, Desk>,
    /// Cancelled when the server shuts down.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        identities: Identities,
        tickets: Tickets,
        desk: Desk,
        issuer: TokenIssuer,
        scopes: ScopeConfig,
        allowed_categories: AllowedCategories,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            auth: AuthService::new(identities.clone(), issuer.clone()),
            identity_saga: IdentitySaga::new(identities.clone(), desk.clone(), issuer, scopes),
            ticket_saga: TicketSaga::new(identities.clone(), tickets.clone(), desk.clone()),
            tickets: TicketService::new(identities, tickets, desk, allowed_categories),
            shutdown,
        }
    }

    /// Token for one request's outbound calls; shutdown cancels it.
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}
