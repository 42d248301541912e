//! Per-peer connection lifecycle, layered on top of libp2p's own connection
//! events because a raw libp2p dial collapses "offer/answer/ice" into one
//! opaque operation but the coordinator still needs those states visible.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use libp2p::PeerId;

/// Coordinator-visible connection state. `Offering`/`Connecting` both occur
/// during a single `swarm.dial()`; `Disconnected` is the grace window before
/// one ICE-restart-style redial attempt, after which the peer is `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    New,
    Offering,
    Connecting,
    Open,
    Disconnected,
    Closed,
}

#[derive(Debug, Clone)]
struct Entry {
    state: ConnState,
    /// When the peer entered `Disconnected`.
    disconnected_at: Option<Instant>,
    /// Set once the single redial attempt has been made.
    ice_restart_attempted: bool,
}

/// Tracks [`ConnState`] and grace timers for every peer the transport has
/// ever dialed or accepted, enforcing `peer_cap` across the set of peers
/// currently occupying a connection slot (`Offering`, `Connecting`, `Open`).
pub struct ConnTracker {
    peers: HashMap<PeerId, Entry>,
    peer_cap: usize,
}

impl ConnTracker {
    pub fn new(peer_cap: usize) -> Self {
        ConnTracker { peers: HashMap::new(), peer_cap }
    }

    fn occupied_slots(&self) -> usize {
        self.peers
            .values()
            .filter(|e| matches!(e.state, ConnState::Offering | ConnState::Connecting | ConnState::Open))
            .count()
    }

    pub fn state_of(&self, peer: &PeerId) -> ConnState {
        self.peers.get(peer).map(|e| e.state).unwrap_or(ConnState::New)
    }

    /// Called before dialing. Returns `false` (and mutates nothing) if the
    /// peer cap is already reached.
    pub fn try_begin_offering(&mut self, peer: PeerId) -> bool {
        if self.occupied_slots() >= self.peer_cap {
            return false;
        }
        self.peers.insert(
            peer,
            Entry { state: ConnState::Offering, disconnected_at: None, ice_restart_attempted: false },
        );
        true
    }

    /// Called when an inbound connection attempt arrives. Returns `false`
    /// if the peer cap is reached; the caller refuses the introduction.
    pub fn try_begin_connecting(&mut self, peer: PeerId) -> bool {
        if self.state_of(&peer) == ConnState::Open {
            return true;
        }
        if self.occupied_slots() >= self.peer_cap {
            return false;
        }
        self.peers.insert(
            peer,
            Entry { state: ConnState::Connecting, disconnected_at: None, ice_restart_attempted: false },
        );
        true
    }

    pub fn mark_open(&mut self, peer: PeerId) {
        let entry = self.peers.entry(peer).or_insert(Entry {
            state: ConnState::New,
            disconnected_at: None,
            ice_restart_attempted: false,
        });
        entry.state = ConnState::Open;
        entry.disconnected_at = None;
        entry.ice_restart_attempted = false;
    }

    /// Returns `true` the first time this peer transitions into
    /// `Disconnected` (so the caller can start a redial timer).
    pub fn mark_disconnected(&mut self, peer: PeerId) -> bool {
        match self.peers.get_mut(&peer) {
            Some(entry) if entry.state != ConnState::Disconnected && entry.state != ConnState::Closed => {
                entry.state = ConnState::Disconnected;
                entry.disconnected_at = Some(Instant::now());
                entry.ice_restart_attempted = false;
                true
            }
            _ => false,
        }
    }

    /// Peers that have been `Disconnected` longer than `grace` and have not
    /// yet had a redial attempt.
    pub fn due_for_ice_restart(&self, grace: Duration, now: Instant) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter_map(|(peer, e)| {
                if e.state == ConnState::Disconnected
                    && !e.ice_restart_attempted
                    && e.disconnected_at.is_some_and(|at| now.duration_since(at) >= grace)
                {
                    Some(*peer)
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn mark_ice_restart_attempted(&mut self, peer: PeerId) {
        if let Some(entry) = self.peers.get_mut(&peer) {
            entry.ice_restart_attempted = true;
            entry.disconnected_at = Some(Instant::now());
        }
    }

    /// Peers whose redial attempt has had `restart_grace` to succeed and
    /// did not (still `Disconnected`) — these transition to `Closed`.
    pub fn due_for_close(&self, restart_grace: Duration, now: Instant) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter_map(|(peer, e)| {
                if e.state == ConnState::Disconnected
                    && e.ice_restart_attempted
                    && e.disconnected_at.is_some_and(|at| now.duration_since(at) >= restart_grace)
                {
                    Some(*peer)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Returns `true` if this is a fresh close (caller should emit
    /// `peerDisconnected`), `false` if the peer was already closed/unknown.
    pub fn mark_closed(&mut self, peer: PeerId) -> bool {
        match self.peers.get_mut(&peer) {
            Some(entry) if entry.state != ConnState::Closed => {
                entry.state = ConnState::Closed;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid() -> PeerId {
        PeerId::random()
    }

    #[test]
    fn peer_cap_refuses_over_budget_dials() {
        let mut tracker = ConnTracker::new(1);
        assert!(tracker.try_begin_offering(pid()));
        assert!(!tracker.try_begin_offering(pid()));
    }

    #[test]
    fn disconnect_then_ice_restart_then_close_sequence() {
        let mut tracker = ConnTracker::new(50);
        let peer = pid();
        tracker.try_begin_offering(peer);
        tracker.mark_open(peer);
        assert!(tracker.mark_disconnected(peer));
        assert!(!tracker.mark_disconnected(peer)); // already disconnected, no-op

        let past = Instant::now() - Duration::from_secs(100);
        // Simulate elapsed grace by checking with a grace of zero duration.
        let due = tracker.due_for_ice_restart(Duration::from_secs(0), Instant::now());
        assert_eq!(due, vec![peer]);
        tracker.mark_ice_restart_attempted(peer);

        let due_close = tracker.due_for_close(Duration::from_secs(0), Instant::now());
        assert_eq!(due_close, vec![peer]);
        assert!(tracker.mark_closed(peer));
        assert!(!tracker.mark_closed(peer));
        let _ = past;
    }

    #[test]
    fn reopening_before_grace_clears_timers() {
        let mut tracker = ConnTracker::new(50);
        let peer = pid();
        tracker.try_begin_offering(peer);
        tracker.mark_open(peer);
        tracker.mark_disconnected(peer);
        tracker.mark_open(peer);
        assert!(tracker.due_for_ice_restart(Duration::from_secs(0), Instant::now()).is_empty());
    }
}
