//! The single "active referral" predicate used by volume aggregation.
//!
//! Activity is owned by the platform's billing/session side; the engine only asks.

use crate::domain::{Member, TimeMs};

/// Decides whether a member counts as active as of a point in time.
pub trait ActivityPolicy: Send + Sync {
    fn is_active(&self, member: &Member, as_of: TimeMs) -> bool;
}

impl<F> ActivityPolicy for F
where
    F: Fn(&Member, TimeMs) -> bool + Send + Sync,
{
    fn is_active(&self, member: &Member, as_of: TimeMs) -> bool {
        self(member, as_of)
    }
}

/// Active status plus platform activity within `window_ms` before `as_of`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentActivity {
    pub window_ms: i64,
}

impl RecentActivity {
    pub fn days(days: u32) -> Self {
        RecentActivity {
            window_ms: i64::from(days) * 86_400_000,
        }
    }
}

impl ActivityPolicy for RecentActivity {
    fn is_active(&self, member: &Member, as_of: TimeMs) -> bool {
        if !member.is_active() {
            return false;
        }
        let cutoff = as_of.saturating_sub_ms(self.window_ms);
        member
            .last_active_at
            .is_some_and(|at| at >= cutoff && at <= as_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MemberStatus, NewMember, Tier};

    fn member(last_active: Option<i64>, status: MemberStatus) -> Member {
        let mut m = NewMember::new("m", None, Tier::Starter).into_member(TimeMs::new(0));
        m.last_active_at = last_active.map(TimeMs::new);
        m.status = status;
        m
    }

    #[test]
    fn test_recent_activity_window() {
        let policy = RecentActivity { window_ms: 100 };
        let as_of = TimeMs::new(1_000);
        assert!(policy.is_active(&member(Some(950), MemberStatus::Active), as_of));
        assert!(policy.is_active(&member(Some(900), MemberStatus::Active), as_of));
        assert!(!policy.is_active(&member(Some(899), MemberStatus::Active), as_of));
        assert!(!policy.is_active(&member(None, MemberStatus::Active), as_of));
    }

    #[test]
    fn test_inactive_status_is_never_active() {
        let policy = RecentActivity::days(30);
        assert!(!policy.is_active(
            &member(Some(1_000), MemberStatus::Suspended),
            TimeMs::new(1_000)
        ));
    }

    #[test]
    fn test_activity_after_as_of_does_not_count() {
        let policy = RecentActivity::days(1);
        assert!(!policy.is_active(&member(Some(2_000), MemberStatus::Active), TimeMs::new(1_000)));
    }

    #[test]
    fn test_closure_policy() {
        let everyone = |_: &Member, _: TimeMs| true;
        assert!(everyone.is_active(&member(None, MemberStatus::Inactive), TimeMs::new(0)));
    }
}
