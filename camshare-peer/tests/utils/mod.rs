pub mod mock_transport;

pub use mock_signaling_server::*;
pub use mock_transport::*;
pub use wait_helpers::*;
