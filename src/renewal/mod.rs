//! The renewal engine: per-renewal and per-identifier scopes, the
//! authorization state machine, the end-to-end driver and the registry loop.

pub mod authorization;
pub mod context;
pub mod driver;
pub mod scheduler;
pub mod setup;

pub use authorization::authorize_identifier;
pub use context::{IdentifierContext, RenewalContext};
pub use driver::RenewalDriver;
pub use scheduler::process_renewals;
pub use setup::{cancel_renewal, create_renewal};
