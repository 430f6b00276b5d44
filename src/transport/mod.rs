//! Wire protocol, framing, and peer connection plumbing (§4.6/§4.7/§4.8).

pub mod client;
pub mod compression;
pub mod connection;
pub mod dedup;
pub mod encryption;
pub mod message;
pub mod server;
pub mod wire;

pub use connection::PeerConnection;
pub use dedup::DedupCache;
pub use encryption::SessionCipher;
pub use message::{Envelope, Payload};
pub use server::Server;
pub use wire::WireOptions;
