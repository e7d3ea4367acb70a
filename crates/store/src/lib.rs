//! Causeway persistence layer: token lifecycle, device registry rows, and
//! join audit, all backed by a single SQLite database.

pub mod model;
pub mod store;

pub use model::{
    Device, DeviceState, DeploymentMark, DeploymentStatus, JoinAttempt, JoinOutcome, Token,
    TokenStatus,
};
pub use store::{JoinApplied, Store, StoreMetrics};
