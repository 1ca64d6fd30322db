//! Relay peer table
//!
//! Peers are learned from the source address of incoming datagrams. Entries
//! are never removed unless idle pruning is explicitly enabled.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// One known sender
#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub addr: SocketAddr,
    pub first_seen: Instant,
    pub last_seen: Instant,
    pub packets: u64,
}

/// Source addresses seen by the relay, keyed by IP and port
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<SocketAddr, PeerEntry>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `addr` if absent and refresh its last-seen time.
    /// Returns true when the peer is new.
    pub fn record_sender(&mut self, addr: SocketAddr) -> bool {
        self.record_sender_at(addr, Instant::now())
    }

    fn record_sender_at(&mut self, addr: SocketAddr, now: Instant) -> bool {
        let mut is_new = false;
        let entry = self.peers.entry(addr).or_insert_with(|| {
            is_new = true;
            PeerEntry {
                addr,
                first_seen: now,
                last_seen: now,
                packets: 0,
            }
        });
        entry.last_seen = now;
        entry.packets += 1;

        if is_new {
            tracing::info!(peer = %addr, total = self.peers.len(), "New peer");
        }
        is_new
    }

    /// Every known peer except `addr`
    pub fn all_except(&self, addr: SocketAddr) -> impl Iterator<Item = SocketAddr> + '_ {
        self.peers.keys().copied().filter(move |peer| *peer != addr)
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.peers.contains_key(addr)
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&PeerEntry> {
        self.peers.get(addr)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Drop peers silent for longer than `max_idle`; returns how many went
    pub fn prune_idle(&mut self, max_idle: Duration) -> usize {
        self.prune_idle_at(max_idle, Instant::now())
    }

    fn prune_idle_at(&mut self, max_idle: Duration, now: Instant) -> usize {
        let before = self.peers.len();
        self.peers.retain(|addr, entry| {
            let keep = now.saturating_duration_since(entry.last_seen) <= max_idle;
            if !keep {
                tracing::info!(peer = %addr, "Pruned idle peer");
            }
            keep
        });
        before - self.peers.len()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_record_is_idempotent() {
        let mut table = PeerTable::new();
        assert!(table.record_sender(addr("10.0.0.1:5000")));
        assert!(!table.record_sender(addr("10.0.0.1:5000")));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&addr("10.0.0.1:5000")).unwrap().packets, 2);
    }

    #[test]
    fn test_all_except_excludes_sender() {
        let mut table = PeerTable::new();
        let a = addr("10.0.0.1:5000");
        let b = addr("10.0.0.2:5000");
        let c = addr("10.0.0.3:5000");
        for peer in [a, b, c] {
            table.record_sender(peer);
        }

        let others: HashSet<_> = table.all_except(a).collect();
        assert_eq!(others, HashSet::from([b, c]));
    }

    #[test]
    fn test_same_ip_different_port_is_distinct() {
        let mut table = PeerTable::new();
        let a = addr("10.0.0.1:5000");
        let a2 = addr("10.0.0.1:5001");
        table.record_sender(a);
        table.record_sender(a2);

        let others: Vec<_> = table.all_except(a).collect();
        assert_eq!(others, vec![a2]);
    }

    #[test]
    fn test_same_port_different_ip_is_distinct() {
        let mut table = PeerTable::new();
        let a = addr("10.0.0.1:5000");
        let b = addr("10.0.0.9:5000");
        table.record_sender(a);
        table.record_sender(b);

        let others: Vec<_> = table.all_except(b).collect();
        assert_eq!(others, vec![a]);
    }

    #[test]
    fn test_unknown_sender_gets_everyone() {
        let mut table = PeerTable::new();
        table.record_sender(addr("10.0.0.1:5000"));
        table.record_sender(addr("10.0.0.2:5000"));
        assert_eq!(table.all_except(addr("10.0.0.3:5000")).count(), 2);
    }

    #[test]
    fn test_prune_idle() {
        let mut table = PeerTable::new();
        let start = Instant::now();
        table.record_sender_at(addr("10.0.0.1:5000"), start);
        table.record_sender_at(addr("10.0.0.2:5000"), start + Duration::from_secs(10));

        let pruned = table.prune_idle_at(Duration::from_secs(5), start + Duration::from_secs(12));
        assert_eq!(pruned, 1);
        assert!(table.contains(&addr("10.0.0.2:5000")));
    }
}
