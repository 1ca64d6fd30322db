//! The network loop
//!
//! One thread per session. Every iteration drains the socket, dispatches
//! each datagram according to the session mode, then drains the outbound
//! queue, and finally idles until the next period.

use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::codec::FrameDecoder;
use crate::constants::MAX_DATAGRAM_SIZE;
use crate::network::{PeerTable, UdpTransport};
use crate::protocol::PacketCodec;
use crate::session::pacer::Pacer;
use crate::session::stats::Counters;
use crate::session::SessionShared;

/// How often the relay looks for idle peers when pruning is enabled
const PRUNE_INTERVAL: Duration = Duration::from_secs(1);

/// Microseconds on a monotonic clock anchored to wall time at first use.
///
/// Stays monotonic inside one process and lands near wall-clock time, so
/// hosts running NTP produce latency figures that at least trend sensibly.
pub(crate) fn timestamp_us() -> u64 {
    static ANCHOR: OnceLock<(Instant, u64)> = OnceLock::new();
    let (origin, wall_us) = ANCHOR.get_or_init(|| {
        let wall_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        (Instant::now(), wall_us)
    });
    wall_us + origin.elapsed().as_micros() as u64
}

/// What the loop is connected to
pub(crate) enum Link {
    /// Server: learn peers, re-stamp, fan out
    Relay {
        transport: UdpTransport,
        peers: PeerTable,
        idle_timeout: Option<Duration>,
        last_prune: Instant,
    },
    /// Client: send to the relay, decode whatever comes back
    Client { transport: UdpTransport },
    /// Local echo: outbound packets are played straight back
    Loopback,
}

impl Link {
    pub(crate) fn relay(transport: UdpTransport, idle_timeout: Option<Duration>) -> Self {
        Link::Relay {
            transport,
            peers: PeerTable::new(),
            idle_timeout,
            last_prune: Instant::now(),
        }
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Link::Relay { transport, .. } | Link::Client { transport } => {
                Some(transport.local_addr())
            }
            Link::Loopback => None,
        }
    }
}

pub(crate) struct NetworkLoop {
    link: Link,
    codec: PacketCodec,
    decoder: Option<Box<dyn FrameDecoder>>,
    shared: Arc<SessionShared>,
    /// Next sequence number this node stamps
    sequence: u32,
    recv_buf: Vec<u8>,
    send_buf: BytesMut,
    /// Outbound payloads taken from the queue this iteration
    pending: Vec<Bytes>,
}

impl NetworkLoop {
    pub(crate) fn new(
        link: Link,
        codec: PacketCodec,
        decoder: Option<Box<dyn FrameDecoder>>,
        shared: Arc<SessionShared>,
    ) -> Self {
        Self {
            link,
            codec,
            decoder,
            shared,
            sequence: 0,
            recv_buf: vec![0u8; MAX_DATAGRAM_SIZE],
            send_buf: BytesMut::with_capacity(MAX_DATAGRAM_SIZE),
            pending: Vec::new(),
        }
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.link.local_addr()
    }

    /// Run until the shared running flag clears. Shutdown takes at most one
    /// period plus one iteration.
    pub(crate) fn run(mut self, pacer: Pacer) {
        tracing::info!(
            period_us = pacer.period().as_micros() as u64,
            strategy = ?pacer.strategy(),
            "Network loop started"
        );

        while self.shared.running.load(Ordering::Acquire) {
            let deadline = pacer.deadline_from(Instant::now());
            self.tick();
            if !pacer.wait_until(deadline) {
                Counters::bump(&self.shared.counters.loop_overruns);
            }
        }

        tracing::info!(sequence = self.sequence, "Network loop stopped");
    }

    /// One loop iteration without the idle phase
    pub(crate) fn tick(&mut self) {
        self.drain_receives();
        self.drain_outbound();
        self.prune_peers();
    }

    fn next_sequence(sequence: &mut u32) -> u32 {
        let current = *sequence;
        *sequence = sequence.wrapping_add(1);
        current
    }

    fn drain_receives(&mut self) {
        let Self {
            link,
            codec,
            decoder,
            shared,
            sequence,
            recv_buf,
            send_buf,
            ..
        } = self;

        match link {
            Link::Relay {
                transport, peers, ..
            } => {
                while let Some((len, from)) = transport.try_recv(recv_buf) {
                    Counters::bump(&shared.counters.packets_received);

                    let payload = match codec.decode_header(&recv_buf[..len]) {
                        Ok((_, payload)) if !payload.is_empty() => payload,
                        _ => {
                            Counters::bump(&shared.counters.malformed_packets);
                            continue;
                        }
                    };

                    if peers.record_sender(from) {
                        shared.peer_count.store(peers.len(), Ordering::Relaxed);
                    }

                    // The relay stamps with its own clock and counter
                    let seq = Self::next_sequence(sequence);
                    codec.encode_packet(timestamp_us(), seq, payload, send_buf);

                    for dest in peers.all_except(from) {
                        if transport.send_to(&send_buf[..], dest) {
                            Counters::bump(&shared.counters.packets_relayed);
                        } else {
                            Counters::bump(&shared.counters.send_failures);
                        }
                    }
                }
            }
            Link::Client { transport } => {
                while let Some((len, _from)) = transport.try_recv(recv_buf) {
                    Counters::bump(&shared.counters.packets_received);
                    play_datagram(codec, decoder, shared, &recv_buf[..len], true);
                }
            }
            Link::Loopback => {}
        }
    }

    fn drain_outbound(&mut self) {
        let Self {
            link,
            codec,
            decoder,
            shared,
            sequence,
            send_buf,
            pending,
            ..
        } = self;

        shared.queues.outbound.drain_into(pending);
        if pending.is_empty() {
            return;
        }

        for payload in pending.drain(..) {
            let seq = Self::next_sequence(sequence);
            codec.encode_packet(timestamp_us(), seq, &payload, send_buf);

            match link {
                Link::Client { transport } => {
                    if transport.send(&send_buf[..]) {
                        Counters::bump(&shared.counters.packets_sent);
                    } else {
                        Counters::bump(&shared.counters.send_failures);
                    }
                }
                Link::Loopback => {
                    Counters::bump(&shared.counters.packets_sent);
                    Counters::bump(&shared.counters.packets_received);
                    play_datagram(codec, decoder, shared, &send_buf[..], false);
                }
                // Nothing captures on the relay
                Link::Relay { .. } => {}
            }
        }
    }

    fn prune_peers(&mut self) {
        if let Link::Relay {
            peers,
            idle_timeout: Some(idle_timeout),
            last_prune,
            ..
        } = &mut self.link
        {
            if last_prune.elapsed() < PRUNE_INTERVAL {
                return;
            }
            *last_prune = Instant::now();
            if peers.prune_idle(*idle_timeout) > 0 {
                self.shared.peer_count.store(peers.len(), Ordering::Relaxed);
            }
        }
    }
}

/// Strip the header, decode and queue for playback
fn play_datagram(
    codec: &PacketCodec,
    decoder: &mut Option<Box<dyn FrameDecoder>>,
    shared: &SessionShared,
    datagram: &[u8],
    measure_latency: bool,
) {
    let (header, payload) = match codec.decode_header(datagram) {
        Ok((header, payload)) if !payload.is_empty() => (header, payload),
        _ => {
            Counters::bump(&shared.counters.malformed_packets);
            return;
        }
    };

    let Some(decoder) = decoder.as_mut() else {
        return;
    };

    match decoder.decode(payload) {
        Ok(pcm) if !pcm.is_empty() => {
            if measure_latency {
                if let Some(sent_us) = header.timestamp_us {
                    shared.latency.record(timestamp_us().saturating_sub(sent_us));
                }
            }
            shared.queues.inbound.push(pcm);
        }
        Ok(_) => {}
        Err(e) => {
            Counters::bump(&shared.counters.decode_failures);
            tracing::trace!(error = %e, sequence = header.sequence, "Dropped undecodable packet");
        }
    }
}
