mod peer_session;
mod retry_policy;

pub use peer_session::{PeerSession, SessionSignal, SessionState, SessionStatus};
pub(crate) use retry_policy::millis;
pub use retry_policy::RetryPolicy;
