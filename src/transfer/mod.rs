//! Data connections
//!
//! Active and passive establishers, connection validators and the one-shot
//! data connection feature that command handlers consume.

pub mod active;
pub mod address;
pub mod establisher;
pub mod feature;
pub mod passive;
pub mod validation;

pub use active::ActiveEstablisher;
pub use establisher::DataConnectionEstablisher;
pub use feature::DataConnectionFeature;
pub use passive::PassiveEstablisher;
pub use validation::{DataConnectionValidator, PeerAddressValidator};
