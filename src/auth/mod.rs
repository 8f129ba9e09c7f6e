//! Authentication system
//!
//! Login state machine, the credential-validation contract and the in-memory
//! credential store.

pub mod credentials;
pub mod state;
pub mod validator;

pub use credentials::MemoryAuthenticator;
pub use state::{AuthorizationState, AuthorizationStatus};
pub use validator::{Authenticator, Principal, validate_username};
