//! Network subsystem for UDP voice transport

pub mod peers;
pub mod udp;

pub use peers::{PeerEntry, PeerTable};
pub use udp::UdpTransport;
