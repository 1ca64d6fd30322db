//! # Voice Relay
//!
//! Low-latency point-to-multipoint voice over plain UDP. Clients capture,
//! encode and send; a relay server forwards every packet to all other known
//! peers without ever decoding the audio.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────── CLIENT ────────────────────────┐
//! │                                                        │
//! │  capture cb ─► [preprocess] ─► encode ─► outbound (3)  │
//! │                                              │         │
//! │                              network loop ◄──┘  5 ms   │
//! │                              │  stamp header + send    │
//! │                              │  recv ─► decode ─┐      │
//! │                              │                  ▼      │
//! │  playback cb ◄──────────────────────────── inbound (8) │
//! └──────────────────────────────┼─────────────────────────┘
//!                                │ UDP [ts:u64][seq:u32][opus]
//!                                ▼
//! ┌──────────────────────── SERVER ────────────────────────┐
//! │  recv ─► strip header ─► record peer ─► re-stamp       │
//! │                                          │             │
//! │                       fan out to every peer but sender │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! The real-time callbacks never block: every queue operation they touch is
//! bounded and drops on overflow. The network loop never blocks on I/O and
//! paces itself to a fixed period.

pub mod audio;
pub mod codec;
pub mod config;
pub mod dsp;
pub mod error;
pub mod network;
pub mod protocol;
pub mod session;

pub use config::{Mode, SessionConfig};
pub use error::{Error, Result};
pub use session::{Backend, Session, SessionState, SessionStats};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for capture, playback and codec
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Mono voice
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Samples per hardware period (5 ms at 48 kHz)
    pub const DEFAULT_FRAME_SIZE: usize = 240;

    /// Default Opus bitrate in bits per second
    pub const DEFAULT_BITRATE: u32 = 32_000;

    /// Default UDP port shared by the server bind and client peer address
    pub const DEFAULT_UDP_PORT: u16 = 12345;

    /// Network loop period in microseconds
    pub const DEFAULT_LOOP_PERIOD_US: u64 = 5_000;

    /// Latency reporter period in milliseconds
    pub const DEFAULT_STATS_PERIOD_MS: u64 = 2_000;

    /// Outbound queue capacity in encoded frames (15 ms at 5 ms frames)
    pub const OUTBOUND_QUEUE_CAPACITY: usize = 3;

    /// Inbound jitter buffer capacity in decoded frames
    pub const INBOUND_QUEUE_CAPACITY: usize = 8;

    /// Kernel send/receive buffer size requested for the socket
    pub const SOCKET_BUFFER_BYTES: usize = 65_536;

    /// Largest datagram the receive path accepts
    pub const MAX_DATAGRAM_SIZE: usize = 1500;

    /// Largest encoded frame the Opus encoder may produce
    pub const MAX_ENCODED_FRAME: usize = 512;
}
