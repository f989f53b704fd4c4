//! Network placement and commission-attribution engine.
//!
//! Every component holds an `Arc<dyn NetworkStore>` and re-reads the trees on each call;
//! nothing about the network is cached between operations.

use crate::domain::{CommissionId, CommissionStatus, MemberId};
use crate::store::StoreError;
use thiserror::Error;

pub mod activity;
pub mod commission;
pub mod matrix_tree;
pub mod placement;
pub mod plan;
pub mod report;
pub mod sponsor_tree;
pub mod volume;

pub use activity::{ActivityPolicy, RecentActivity};
pub use commission::{CommissionEngine, CommissionSummary};
pub use matrix_tree::{MatrixTree, OpenSlot};
pub use placement::{PlacementEngine, MAX_CLAIM_ATTEMPTS};
pub use plan::{CommissionPlan, PlanError};
pub use report::TreeReportBuilder;
pub use sponsor_tree::{Ancestor, SponsorTree};
pub use volume::{TeamVolumeAggregator, TeamVolumeReport};

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No open slot within the allowed depth under the sponsor.
    #[error("No open matrix slot under {sponsor} within {max_level} levels")]
    PlacementExhausted { sponsor: MemberId, max_level: u32 },
    #[error("Sponsor {0} does not exist or is not active")]
    InvalidSponsor(MemberId),
    #[error("Member {0} not found")]
    MemberNotFound(MemberId),
    #[error("Member {0} is already placed in the matrix")]
    AlreadyPlaced(MemberId),
    /// Concurrent placements kept winning the slot this call picked.
    #[error("Slot claim lost to concurrent placements {attempts} times")]
    SlotClaimConflict { attempts: u32 },
    #[error("Commission {id} is {from}, cannot become {to}")]
    InvalidStateTransition {
        id: CommissionId,
        from: CommissionStatus,
        to: CommissionStatus,
    },
    #[error("Commission {0} not found")]
    CommissionNotFound(CommissionId),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid period: start {start} is after end {end}")]
    InvalidPeriod { start: i64, end: i64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}
