pub mod controller;
pub mod protocol;
pub mod registry;

pub use controller::SessionController;
pub use protocol::{InboundMessage, OutboundMessage};
pub use registry::SessionRegistry;
