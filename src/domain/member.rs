//! Members, tiers, and activity status.

use super::{MemberId, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered membership tier. `Starter < Builder < Leader < Elite`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Starter,
    Builder,
    Leader,
    Elite,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Starter => "starter",
            Tier::Builder => "builder",
            Tier::Leader => "leader",
            Tier::Elite => "elite",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starter" => Ok(Tier::Starter),
            "builder" => Ok(Tier::Builder),
            "leader" => Ok(Tier::Leader),
            "elite" => Ok(Tier::Elite),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

/// Account status as maintained by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Active => "active",
            MemberStatus::Inactive => "inactive",
            MemberStatus::Suspended => "suspended",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MemberStatus::Active),
            "inactive" => Ok(MemberStatus::Inactive),
            "suspended" => Ok(MemberStatus::Suspended),
            other => Err(format!("unknown member status: {}", other)),
        }
    }
}

/// A platform member as seen by the network engine.
///
/// `sponsor` is the referrer and never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: MemberId,
    pub sponsor: Option<MemberId>,
    pub tier: Tier,
    pub status: MemberStatus,
    pub created_at: TimeMs,
    /// Last recorded platform activity, maintained outside the engine.
    pub last_active_at: Option<TimeMs>,
}

impl Member {
    /// Rebuild a member from stored fields.
    ///
    /// Returns None for a member that sponsors itself.
    pub fn from_parts(
        id: MemberId,
        sponsor: Option<MemberId>,
        tier: Tier,
        status: MemberStatus,
        created_at: TimeMs,
        last_active_at: Option<TimeMs>,
    ) -> Option<Self> {
        if sponsor.as_ref() == Some(&id) {
            return None;
        }
        Some(Member {
            id,
            sponsor,
            tier,
            status,
            created_at,
            last_active_at,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

/// Registration request for a member joining the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMember {
    pub id: MemberId,
    pub sponsor: Option<MemberId>,
    #[serde(default)]
    pub tier: Tier,
}

impl NewMember {
    pub fn new(id: impl Into<MemberId>, sponsor: Option<MemberId>, tier: Tier) -> Self {
        NewMember {
            id: id.into(),
            sponsor,
            tier,
        }
    }

    /// Materialize the member as freshly registered at `now`.
    pub fn into_member(self, now: TimeMs) -> Member {
        Member {
            id: self.id,
            sponsor: self.sponsor,
            tier: self.tier,
            status: MemberStatus::Active,
            created_at: now,
            last_active_at: Some(now),
        }
    }
}
