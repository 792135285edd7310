//! Failed-login counting per username.
//!
//! Failures accumulate inside a window that starts with the first failure.
//! Reaching the threshold locks the username until that same window ends.
//! Two racing failures may both read the old count; the worst case is one
//! extra attempt before the lock applies.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::db::Role;

pub const MAX_FAILED_ATTEMPTS: u32 = 5;

pub const LOCKOUT_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockoutStatus {
    pub attempts: u32,
    pub locked: bool,
    /// Unix milliseconds when the lock lifts.
    pub locked_until: Option<u64>,
    /// Time left on the lock.
    pub remaining: Option<Duration>,
}

pub struct LockoutTracker {
    attempts: TtlCache<String, u32>,
    clock: Arc<dyn Clock>,
}

impl LockoutTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            attempts: TtlCache::new(clock.clone()),
            clock,
        }
    }

    /// Count a failed attempt. Exempt roles are never tracked.
    ///
    /// `role` is `None` when the username does not exist; those attempts are
    /// counted like any other so the lock cannot reveal which names are real.
    pub fn record_failure(&self, username: &str, role: Option<Role>) -> LockoutStatus {
        if is_exempt(role) {
            return LockoutStatus::default();
        }

        let (attempts, expires_at) =
            self.attempts
                .upsert(normalize(username), LOCKOUT_WINDOW, |current| {
                    current.copied().unwrap_or(0).saturating_add(1)
                });
        self.status(attempts, expires_at)
    }

    /// Read-only check of the current window.
    pub fn check_locked(&self, username: &str, role: Option<Role>) -> LockoutStatus {
        if is_exempt(role) {
            return LockoutStatus::default();
        }

        match self.attempts.get_with_expiry(&normalize(username)) {
            Some((attempts, expires_at)) => self.status(attempts, expires_at),
            None => LockoutStatus::default(),
        }
    }

    pub fn clear(&self, username: &str) {
        self.attempts.remove(&normalize(username));
    }

    fn status(&self, attempts: u32, expires_at: u64) -> LockoutStatus {
        if attempts < MAX_FAILED_ATTEMPTS {
            return LockoutStatus {
                attempts,
                ..LockoutStatus::default()
            };
        }

        let now = self.clock.now_millis();
        LockoutStatus {
            attempts,
            locked: true,
            locked_until: Some(expires_at),
            remaining: Some(Duration::from_millis(expires_at.saturating_sub(now))),
        }
    }
}

fn is_exempt(role: Option<Role>) -> bool {
    role.is_some_and(Role::is_exempt_from_tenancy_rules)
}

fn normalize(username: &str) -> String {
    username.trim().to_lowercase()
}
