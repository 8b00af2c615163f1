//! Services module
//!
//! The chat platform boundary and the dispatcher that executes moderation
//! actions against it

pub mod dispatcher;
pub mod recording;
pub mod transport;

// Re-export commonly used services
pub use dispatcher::ActionDispatcher;
pub use recording::{RecordingTransport, TransportCall};
pub use transport::{MemberStatus, PermissionSet, TelegramTransport, Transport};
