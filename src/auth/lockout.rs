//! Account lockout after repeated failed logins.
//!
//! Counters live on the `users` row, this module only decides.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    max_attempts: i32,
    lockout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedAttempt {
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutPolicy {
    pub fn new(max_attempts: i32, lockout: Duration) -> Self {
        Self {
            max_attempts,
            lockout,
        }
    }

    pub fn from_config(auth: &crate::config::Auth) -> Self {
        Self::new(
            auth.max_login_attempts(),
            Duration::minutes(auth.lockout_minutes()),
        )
    }

    pub fn is_locked(&self, locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        matches!(locked_until, Some(until) if until > now)
    }

    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }

    /// Expiry of a lock taken at `now`.
    pub fn lock_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.lockout
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lock_lasts_configured_minutes() {
        let policy = LockoutPolicy::new(5, Duration::minutes(30));
        let now = Utc::now();

        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.lock_until(now), now + Duration::minutes(30));
        assert!(policy.is_locked(Some(policy.lock_until(now)), now));
    }

    #[test]
    fn lock_expires() {
        let policy = LockoutPolicy::new(5, Duration::minutes(30));
        let now = Utc::now();

        assert!(!policy.is_locked(None, now));
        assert!(policy.is_locked(Some(now + Duration::minutes(1)), now));
        assert!(!policy.is_locked(Some(now - Duration::seconds(1)), now));
    }
}
