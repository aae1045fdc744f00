use std::time::{Duration, Instant};

/// How long an installed permission stays fresh before the client must
/// re-send CreatePermission for the peer.
pub const PERMISSION_REFRESH_PERIOD: Duration = Duration::from_secs(240);

/// How many CreatePermission attempts are allowed before the peer is
/// considered unreachable through this allocation.
pub const MAX_PERMISSION_ATTEMPTS: u32 = 9;

/// Book-keeping for one peer permission on the allocation.
#[derive(Default, Debug, Clone)]
pub(crate) struct Permission {
    pub(crate) requests_sent: u32,
    pub(crate) last_request_at: Option<Instant>,
    pub(crate) granted_at: Option<Instant>,
}

impl Permission {
    pub(crate) fn is_active(&self) -> bool {
        self.granted_at.is_some()
    }

    pub(crate) fn needs_refresh(&self, now: Instant) -> bool {
        match self.granted_at {
            Some(granted_at) => now.duration_since(granted_at) >= PERMISSION_REFRESH_PERIOD,
            None => false,
        }
    }
}
