//! Wire format
//!
//! Every datagram is a fixed-size header followed by an opaque codec payload.
//!
//! ```text
//! Timestamped profile (12 bytes):
//! ┌──────────────────────────┬──────────────┬─────────────────┐
//! │ send timestamp u64 (µs)  │ sequence u32 │ payload ...     │
//! └──────────────────────────┴──────────────┴─────────────────┘
//!
//! Minimal profile (4 bytes):
//! ┌──────────────┬─────────────────┐
//! │ sequence u32 │ payload ...     │
//! └──────────────┴─────────────────┘
//! ```
//!
//! Fields are in the producer's native byte order. The timestamp comes from
//! the producer's monotonic clock and is only comparable on that host, so any
//! latency derived from it is a trend, not a one-way delay.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

/// Header layout, fixed per session and shared by both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderProfile {
    /// Sequence only
    Minimal,
    /// Timestamp and sequence
    #[default]
    Timestamped,
}

impl HeaderProfile {
    /// Header size in bytes
    pub const fn header_len(self) -> usize {
        match self {
            HeaderProfile::Minimal => 4,
            HeaderProfile::Timestamped => 12,
        }
    }

    pub const fn has_timestamp(self) -> bool {
        matches!(self, HeaderProfile::Timestamped)
    }
}

/// Decoded header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Microseconds on the producer's clock; `None` under the minimal profile
    pub timestamp_us: Option<u64>,
    /// Per-producer counter, wraps silently
    pub sequence: u32,
}

impl PacketHeader {
    pub fn new(timestamp_us: u64, sequence: u32) -> Self {
        Self {
            timestamp_us: Some(timestamp_us),
            sequence,
        }
    }
}

/// Header encoder/decoder bound to one profile
#[derive(Debug, Clone, Copy)]
pub struct PacketCodec {
    profile: HeaderProfile,
}

impl PacketCodec {
    pub fn new(profile: HeaderProfile) -> Self {
        Self { profile }
    }

    pub fn header_len(&self) -> usize {
        self.profile.header_len()
    }

    /// Append the header prefix for `timestamp_us`/`sequence` to `out`.
    /// The timestamp is dropped under the minimal profile.
    pub fn encode_header(&self, timestamp_us: u64, sequence: u32, out: &mut BytesMut) {
        out.reserve(self.header_len());
        if self.profile.has_timestamp() {
            out.put_u64_ne(timestamp_us);
        }
        out.put_u32_ne(sequence);
    }

    /// Clear `out` and write a complete datagram into it
    pub fn encode_packet(
        &self,
        timestamp_us: u64,
        sequence: u32,
        payload: &[u8],
        out: &mut BytesMut,
    ) {
        out.clear();
        out.reserve(self.header_len() + payload.len());
        self.encode_header(timestamp_us, sequence, out);
        out.extend_from_slice(payload);
    }

    /// Split a datagram into header and payload view.
    ///
    /// Fails when the buffer is shorter than the header; never reads past
    /// the end of `datagram`.
    pub fn decode_header<'a>(
        &self,
        datagram: &'a [u8],
    ) -> Result<(PacketHeader, &'a [u8]), NetworkError> {
        let needed = self.header_len();
        if datagram.len() < needed {
            return Err(NetworkError::Malformed {
                len: datagram.len(),
                needed,
            });
        }

        let mut cursor = &datagram[..needed];
        let timestamp_us = if self.profile.has_timestamp() {
            Some(cursor.get_u64_ne())
        } else {
            None
        };
        let sequence = cursor.get_u32_ne();

        Ok((
            PacketHeader {
                timestamp_us,
                sequence,
            },
            &datagram[needed..],
        ))
    }
}
