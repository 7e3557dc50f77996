//! Quota tiers, admission decisions, and the allotment rollover policy.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

/// Billing tier for an owner.
///
/// Tier changes arrive from the billing collaborator (webhook); this core
/// never computes them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Paid,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "free" => Ok(Self::Free),
            "paid" => Ok(Self::Paid),
            other => Err(Error::InvalidTier(other.to_string())),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a quota reservation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Admitted; for free-tier owners one allotment slot was consumed.
    Allowed,
    /// The free allotment is exhausted for the current window.
    Denied,
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// When (if ever) the free-tier usage counter resets.
///
/// The counting window starts at the quota record's `period_anchor`; when a
/// window elapses the counter resets and the anchor advances to the start of
/// the current window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaRolloverPolicy {
    /// The allotment never resets.
    #[default]
    Never,
    /// The allotment resets each UTC calendar day.
    Daily,
    /// The allotment resets each UTC calendar month.
    Monthly,
}

impl QuotaRolloverPolicy {
    /// If the window anchored at `anchor` has elapsed by `now`, return the
    /// new anchor (the start of the window containing `now`).
    pub fn rollover_anchor(
        &self,
        anchor: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Option<OffsetDateTime> {
        match self {
            Self::Never => None,
            Self::Daily => {
                if now.date() > anchor.date() {
                    Some(start_of_day(now.date()))
                } else {
                    None
                }
            }
            Self::Monthly => {
                let same_month =
                    now.year() == anchor.year() && now.month() == anchor.month();
                if !same_month && now > anchor {
                    let first = now.date().replace_day(1).expect("day 1 is always valid");
                    Some(start_of_day(first))
                } else {
                    None
                }
            }
        }
    }
}

fn start_of_day(date: Date) -> OffsetDateTime {
    date.midnight().assume_utc()
}
