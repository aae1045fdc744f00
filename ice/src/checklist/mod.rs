
use std::fmt;
use std::time::{Duration, Instant};

use stun::message::TransactionId;

use crate::candidate::{Candidate, CandidateType};
use crate::control::Role;
use crate::error::*;

/// Tick period of the checklist scheduler.
pub const TA: Duration = Duration::from_millis(50);

/// Retransmission floor; the effective RTO grows with the number of live
/// entries but never drops below this.
pub const RTO_FLOOR: Duration = Duration::from_millis(500);

/// A connected pair that stayed silent this long goes disconnected.
pub const DISCONNECTED_TIMEOUT: Duration = Duration::from_secs(8);

/// An entry (or connected pair) that stayed silent this long has failed.
pub const FAILED_TIMEOUT: Duration = Duration::from_secs(16);

/// Keepalive cadence on the nominated pair.
pub const CONNECTED_CHECK_PERIOD: Duration = Duration::from_secs(3);

/// Hard cap on checklist size; lowest-priority entries are dropped first.
pub const MAX_CHECKLIST_ENTRIES: usize = 25;

/// State of one checklist entry (RFC 8445 section 6.1.2.6).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChecklistEntryState {
    Frozen,
    Waiting,
    InProgress,
    Succeeded,
    Failed,
}

impl fmt::Display for ChecklistEntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Frozen => "frozen",
            Self::Waiting => "waiting",
            Self::InProgress => "in-progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One candidate pair under probing.
#[derive(Debug, Clone)]
pub struct ChecklistEntry {
    pub local: Candidate,
    pub remote: Candidate,
    /// Cached concrete remote endpoint; entries exist only for resolved
    /// remote candidates.
    pub remote_endpoint: std::net::SocketAddr,
    pub state: ChecklistEntryState,
    pub nominated: bool,
    pub first_check_sent_at: Option<Instant>,
    pub last_check_sent_at: Option<Instant>,
    pub checks_sent: u32,
    pub last_binding_request_received_at: Option<Instant>,
    pub last_connected_response_at: Option<Instant>,
    pub request_transaction_id: TransactionId,
    pub turn_permission_requests_sent: u32,
    pub turn_permission_request_at: Option<Instant>,
    pub turn_permission_response_at: Option<Instant>,
}

impl ChecklistEntry {
    /// Builds an entry; fails if the remote candidate has no resolved
    /// endpoint yet.
    pub fn new(local: Candidate, remote: Candidate) -> Result<Self> {
        let remote_endpoint = remote.endpoint().ok_or(Error::ErrCandidateAddrNotUsable)?;
        Ok(ChecklistEntry {
            local,
            remote,
            remote_endpoint,
            state: ChecklistEntryState::Waiting,
            nominated: false,
            first_check_sent_at: None,
            last_check_sent_at: None,
            checks_sent: 0,
            last_binding_request_received_at: None,
            last_connected_response_at: None,
            request_transaction_id: TransactionId::new(),
            turn_permission_requests_sent: 0,
            turn_permission_request_at: None,
            turn_permission_response_at: None,
        })
    }

    /// True when checks for this pair travel through a TURN relay.
    pub fn is_relay_pair(&self) -> bool {
        self.local.candidate_type == CandidateType::Relay
    }

    /// `2^32·min(G,D) + 2·max(G,D) + (G>D ? 1 : 0)` where G is the
    /// controlling side's candidate priority (RFC 8445 section 6.1.2.3).
    pub fn pair_priority(&self, role: Role) -> u64 {
        let (g, d) = match role {
            Role::Controlling => (self.local.priority, self.remote.priority),
            Role::Controlled => (self.remote.priority, self.local.priority),
        };
        let (g, d) = (u64::from(g), u64::from(d));
        (1u64 << 32) * g.min(d) + 2 * g.max(d) + u64::from(g > d)
    }

    /// Notes an outgoing check with a fresh transaction id.
    pub fn mark_check_sent(&mut self, now: Instant) -> TransactionId {
        let tid = TransactionId::new();
        self.request_transaction_id = tid;
        self.checks_sent += 1;
        self.last_check_sent_at = Some(now);
        if self.first_check_sent_at.is_none() {
            self.first_check_sent_at = Some(now);
        }
        if self.state == ChecklistEntryState::Waiting {
            self.state = ChecklistEntryState::InProgress;
        }
        tid
    }

    /// Liveness of a nominated pair: the latest point at which we heard
    /// from the peer on it, in either direction.
    pub fn last_activity(&self) -> Option<Instant> {
        match (
            self.last_connected_response_at,
            self.last_binding_request_received_at,
        ) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

impl fmt::Display for ChecklistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({}{})",
            self.local,
            self.remote,
            self.state,
            if self.nominated { ", nominated" } else { "" }
        )
    }
}

/// The ordered set of candidate pairs being probed. Pure state and policy;
/// the channel owns the socket and the clock.
#[derive(Default)]
pub struct Checklist {
    pub entries: Vec<ChecklistEntry>,
}

impl Checklist {
    pub fn new() -> Self {
        Checklist { entries: vec![] }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn duplicate_index(&self, entry: &ChecklistEntry) -> Option<usize> {
        self.entries.iter().position(|e| {
            e.remote_endpoint == entry.remote_endpoint
                && e.local.candidate_type == entry.local.candidate_type
                && e.remote.protocol == entry.remote.protocol
        })
    }

    /// Inserts `entry` under the duplicate policy: an existing entry for the
    /// same (remote endpoint, local type, remote protocol) is kept unless
    /// the newcomer has strictly higher pair priority, and a nominated
    /// entry is never replaced. The list is then re-sorted by descending
    /// pair priority and truncated.
    pub fn insert(&mut self, entry: ChecklistEntry, role: Role) -> bool {
        if let Some(i) = self.duplicate_index(&entry) {
            let existing = &self.entries[i];
            if existing.nominated
                || entry.pair_priority(role) <= existing.pair_priority(role)
            {
                return false;
            }
            self.entries[i] = entry;
        } else {
            self.entries.push(entry);
        }

        self.sort_and_truncate(role);
        true
    }

    pub fn sort_and_truncate(&mut self, role: Role) {
        self.entries
            .sort_by(|a, b| b.pair_priority(role).cmp(&a.pair_priority(role)));
        self.entries.truncate(MAX_CHECKLIST_ENTRIES);
    }

    pub fn waiting_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == ChecklistEntryState::Waiting)
            .count()
    }

    pub fn in_progress_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == ChecklistEntryState::InProgress)
            .count()
    }

    /// `RTO = max(500 ms, Ta · (#Waiting + #InProgress))`.
    pub fn rto(&self) -> Duration {
        let live = (self.waiting_count() + self.in_progress_count()) as u32;
        RTO_FLOOR.max(TA * live)
    }

    /// The highest-priority entry ready for its first check.
    pub fn next_waiting_index(&self) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.state == ChecklistEntryState::Waiting)
    }

    /// The highest-priority in-progress entry whose last check has been
    /// outstanding for at least `rto`.
    pub fn next_retransmit_index(&self, now: Instant, rto: Duration) -> Option<usize> {
        self.entries.iter().position(|e| {
            e.state == ChecklistEntryState::InProgress
                && e.last_check_sent_at
                    .map(|at| now.duration_since(at) >= rto)
                    .unwrap_or(true)
        })
    }

    /// Fails every in-progress entry whose first check is older than the
    /// failed timeout; returns how many entries were failed.
    pub fn expire_stale(&mut self, now: Instant) -> usize {
        let mut failed = 0;
        for e in &mut self.entries {
            if e.state == ChecklistEntryState::InProgress {
                if let Some(first) = e.first_check_sent_at {
                    if now.duration_since(first) >= FAILED_TIMEOUT {
                        log::debug!("checklist entry timed out: {e}");
                        e.state = ChecklistEntryState::Failed;
                        failed += 1;
                    }
                }
            }
        }
        failed
    }

    pub fn all_failed(&self) -> bool {
        !self.entries.is_empty()
            && self
                .entries
                .iter()
                .all(|e| e.state == ChecklistEntryState::Failed)
    }

    pub fn nominated_index(&self) -> Option<usize> {
        self.entries.iter().position(|e| e.nominated)
    }

    pub fn find_by_transaction(&self, tid: &TransactionId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| &e.request_transaction_id == tid)
    }

    pub fn find_by_remote_endpoint(
        &self,
        endpoint: std::net::SocketAddr,
        relayed: bool,
    ) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.remote_endpoint == endpoint && e.is_relay_pair() == relayed)
    }

    /// Nominates the entry at `index`. At most one entry is nominated at a
    /// time; re-nominating the same entry is a no-op and nominating a
    /// second one is refused.
    pub fn nominate(&mut self, index: usize) -> bool {
        match self.nominated_index() {
            Some(i) if i != index => false,
            _ => {
                self.entries[index].nominated = true;
                true
            }
        }
    }

    /// The highest-priority succeeded entry (the nomination candidate).
    pub fn best_succeeded_index(&self) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.state == ChecklistEntryState::Succeeded)
    }

    /// True while an entry ranked above `index` could still succeed, in
    /// which case the controller holds off nominating.
    pub fn has_higher_priority_pending(&self, index: usize) -> bool {
        self.entries[..index].iter().any(|e| {
            e.state == ChecklistEntryState::Waiting || e.state == ChecklistEntryState::InProgress
        })
    }
}
