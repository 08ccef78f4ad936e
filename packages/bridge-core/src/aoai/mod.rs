//! AOAI realtime client and wire protocol.

pub mod client;
pub mod protocol;

pub use client::AoaiClient;
pub use protocol::ServerMessage;
