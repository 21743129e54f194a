pub mod model;
pub mod session;

pub use model::{Principal, SessionTokens, SignUpOutcome};
pub use session::{IdentityProvider, Session, SessionEvent};
