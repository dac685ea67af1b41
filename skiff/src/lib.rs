pub mod config;
pub mod net;
pub mod smtp;

pub use config::RelayConfig;
pub use net::{Relay, RelayError};
pub use smtp::{Message, ProtocolError};
