//! Domain types for the referral network.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper
//! - Identity and time primitives: MemberId, TimeMs, Period
//! - Members, tiers, and the activity status used by eligibility checks
//! - Matrix positions with their occupied-slot bitmap
//! - Commissions and their pending/paid/cancelled state machine
//! - Team volume snapshots and nested tree views

pub mod commission;
pub mod decimal;
pub mod matrix;
pub mod member;
pub mod primitives;
pub mod tree;
pub mod volume;

pub use commission::{
    Commission, CommissionId, CommissionStatus, EventType, NewCommission, QualifyingEvent,
};
pub use decimal::Decimal;
pub use matrix::{MatrixPosition, ParentLink, PositionId, SlotIndex, SlotMask, MATRIX_WIDTH};
pub use member::{Member, MemberStatus, NewMember, Tier};
pub use primitives::{MemberId, Period, TimeMs};
pub use tree::{TreeNode, TreeType};
pub use volume::{LevelVolume, TeamVolumeSnapshot, VolumeTally};
