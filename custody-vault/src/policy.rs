//! Token policy: how long tokens live and when the builder's root token must
//! be reissued.

use custody_envelope::Token;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Token policy
// ---------------------------------------------------------------------------

/// Lifetimes for the builder's root token and the delegations cut from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPolicy {
    /// Lifetime of a freshly issued root token.
    pub root_ttl: Duration,
    /// Reissue the root once this little lifetime is left.
    pub refresh_window: Duration,
    /// Lifetime of a user delegation.
    pub delegation_ttl: Duration,
}

impl Default for TokenPolicy {
    /// Root lives a day, refreshed in its last five minutes; delegations live
    /// an hour.
    fn default() -> Self {
        Self {
            root_ttl: Duration::from_secs(86_400),
            refresh_window: Duration::from_secs(300),
            delegation_ttl: Duration::from_secs(3_600),
        }
    }
}

// ---------------------------------------------------------------------------
// Policy evaluator
// ---------------------------------------------------------------------------

/// Result of evaluating the policy against the current root token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenVerdict {
    /// Nothing to do.
    Fresh,
    /// 90% of the lifetime is used up.
    Warning { reason: String },
    /// Expired, or inside the refresh window, or too short to cover one
    /// delegation.
    RefreshNeeded { reason: String },
}

impl TokenVerdict {
    pub fn needs_refresh(&self) -> bool {
        matches!(self, Self::RefreshNeeded { .. })
    }
}

/// Evaluate `policy` against `root` at `now` (unix seconds).
pub fn evaluate(policy: &TokenPolicy, root: &Token, now: i64) -> TokenVerdict {
    let remaining = root.expires_at().saturating_sub(now);
    if remaining <= 0 {
        return TokenVerdict::RefreshNeeded {
            reason: format!("expired {}s ago", -remaining),
        };
    }

    let remaining_secs = remaining as u64;
    if remaining_secs <= policy.refresh_window.as_secs() {
        return TokenVerdict::RefreshNeeded {
            reason: format!("{} left, inside refresh window", format_secs(remaining_secs)),
        };
    }
    if remaining_secs < policy.delegation_ttl.as_secs() {
        return TokenVerdict::RefreshNeeded {
            reason: format!(
                "{} left, shorter than a {} delegation",
                format_secs(remaining_secs),
                format_secs(policy.delegation_ttl.as_secs())
            ),
        };
    }

    // Warn at 90%
    let lifetime = root.expires_at().saturating_sub(root.issued_at()).max(1) as u64;
    let used = lifetime.saturating_sub(remaining_secs);
    if u128::from(used) * 10 >= u128::from(lifetime) * 9 {
        return TokenVerdict::Warning {
            reason: format!(
                "{} of {} lifetime used",
                format_secs(used),
                format_secs(lifetime)
            ),
        };
    }

    TokenVerdict::Fresh
}

fn format_secs(secs: u64) -> String {
    if secs >= 86_400 {
        format!("{}d", secs / 86_400)
    } else if secs >= 3_600 {
        format!("{}h", secs / 3_600)
    } else if secs >= 60 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_envelope::{issue_root, Command, FixedClock, Keypair};

    const T0: i64 = 1_700_000_000;

    fn root(ttl: u64) -> Token {
        let clock = FixedClock::new(T0);
        issue_root(&Keypair::generate(), Command::parse("/nil").unwrap(), ttl, &clock).unwrap()
    }

    fn policy() -> TokenPolicy {
        TokenPolicy {
            root_ttl: Duration::from_secs(100_000),
            refresh_window: Duration::from_secs(300),
            delegation_ttl: Duration::from_secs(3_600),
        }
    }

    #[test]
    fn new_root_is_fresh() {
        assert_eq!(evaluate(&policy(), &root(100_000), T0), TokenVerdict::Fresh);
    }

    #[test]
    fn warns_near_end_of_life() {
        let v = evaluate(&policy(), &root(100_000), T0 + 91_000);
        assert!(matches!(v, TokenVerdict::Warning { .. }), "{v:?}");
        assert!(!v.needs_refresh());
    }

    #[test]
    fn unbounded_root_lifetime() {
        let forever = root(u64::MAX);
        assert_eq!(forever.expires_at(), i64::MAX);
        assert_eq!(evaluate(&policy(), &forever, T0), TokenVerdict::Fresh);
        let v = evaluate(&policy(), &forever, i64::MAX - 10_000);
        assert!(matches!(v, TokenVerdict::Warning { .. }), "{v:?}");
    }

    #[test]
    fn refresh_when_too_short_for_a_delegation() {
        let v = evaluate(&policy(), &root(100_000), T0 + 100_000 - 3_000);
        assert!(v.needs_refresh(), "{v:?}");
    }

    #[test]
    fn refresh_inside_window_and_after_expiry() {
        let p = TokenPolicy {
            delegation_ttl: Duration::from_secs(60),
            ..policy()
        };
        assert!(evaluate(&p, &root(100_000), T0 + 99_800).needs_refresh());
        assert!(evaluate(&p, &root(100_000), T0 + 100_000).needs_refresh());
        assert!(evaluate(&p, &root(100_000), T0 + 200_000).needs_refresh());
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_secs(59), "59s");
        assert_eq!(format_secs(120), "2m");
        assert_eq!(format_secs(7_200), "2h");
        assert_eq!(format_secs(172_800), "2d");
    }
}
