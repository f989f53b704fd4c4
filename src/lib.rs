pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod store;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Commission, CommissionId, CommissionStatus, Decimal, EventType, MatrixPosition, Member,
    MemberId, NewMember, Tier, TimeMs, TreeNode, TreeType,
};
pub use engine::{CommissionPlan, EngineError};
pub use error::AppError;
pub use orchestration::NetworkService;
pub use store::{InMemoryNetworkStore, NetworkStore, StoreError};
