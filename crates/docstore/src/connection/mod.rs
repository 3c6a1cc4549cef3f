/// Connection lifecycle and candidate fallback.
pub mod manager;
/// Process shutdown hooks.
pub mod shutdown;

pub use manager::{ActiveConnection, ConnectionManager, ConnectionState};
pub use shutdown::shutdown_signal;
