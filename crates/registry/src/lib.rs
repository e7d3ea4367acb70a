//! Device registry: registration, heartbeat intake, and the staleness
//! sweep that drives the time-based state transitions.
//!
//! State machine (initial state is the absence of a row):
//!
//! ```text
//! Unregistered
//!     | register-device
//! Registered ----------------- token issuance -----------------+
//!                                                              v
//! Joined/Failed/Stale -------- token issuance ----------> JoinPending
//!                                                              |
//!                              join success                    | join failure,
//!                                  |                           | token timeout
//!                                  v                           v
//!                                Joined <--- heartbeat ---- Failed
//!                                  | staleness window      (retry via
//!                                  v                        reissue or
//!                                Stale --- heartbeat --> Joined    live token)
//! ```
//!
//! Transition legality lives in `DeviceState::can_transition`; all writes
//! flow through the store operations that encode exactly one transition
//! each.

pub mod registry;
pub mod sweep;

pub use registry::DeviceRegistry;
pub use sweep::{StalenessSweeper, SweeperHandle};

pub use causeway_store::{Device, DeviceState};
