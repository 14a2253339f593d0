//! Dual-write sagas for the help-desk gateway.
//!
//! Each saga writes to the service desk first and the local store second,
//! with no distributed transaction between them. What happens to the remote
//! write when the local one fails is a named [`CompensationPolicy`]:
//!
//! - [`IdentitySaga`] compensates: it deletes the remote user again.
//! - [`TicketSaga`] accepts and reconciles: the remote ticket stays and the
//!   error names it for operators.
//!
//! No saga log is persisted; a crash between the two writes leaves a remote
//! record that only the logs describe.

pub mod error;
pub mod identity;
pub mod state;
pub mod ticket;
pub mod trace;

pub use error::{Result, SagaError};
pub use identity::{IdentitySaga, RegistrationInput, ScopeConfig};
pub use state::{CompensationPolicy, RegistrationStep, SagaState, SagaStep, TicketStep};
pub use ticket::{CreatedTicket, TicketInput, TicketSaga};
pub use trace::SagaTrace;
