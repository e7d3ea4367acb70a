//! Persisted data model for tokens, devices, and join audit rows.
//!
//! All timestamps are Unix epoch milliseconds (`u64`). Enum variants map to
//! lowercase text columns in SQLite; the codec lives next to each enum so the
//! string form has exactly one definition.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a join token.
///
/// The status only ever moves forward: `Pending` → `Issued` →
/// {`Consumed`, `Expired`, `Revoked`}. A terminal status is never
/// overwritten with an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Created but not yet delivered to the device.
    Pending,
    /// Delivered to the device via the polling gateway.
    Issued,
    /// Used in a successful join; single-use, terminal.
    Consumed,
    /// TTL elapsed before consumption; terminal.
    Expired,
    /// Superseded by a force reissue; terminal.
    Revoked,
}

impl TokenStatus {
    /// A token still counts toward the one-active-token-per-device invariant.
    pub fn is_active(&self) -> bool {
        matches!(self, TokenStatus::Pending | TokenStatus::Issued)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Pending => "pending",
            TokenStatus::Issued => "issued",
            TokenStatus::Consumed => "consumed",
            TokenStatus::Expired => "expired",
            TokenStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TokenStatus::Pending),
            "issued" => Some(TokenStatus::Issued),
            "consumed" => Some(TokenStatus::Consumed),
            "expired" => Some(TokenStatus::Expired),
            "revoked" => Some(TokenStatus::Revoked),
            _ => None,
        }
    }
}

/// A signed join token bound to a single device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Unique token identifier (uuid v4)
    pub id: String,
    /// Device the token was issued for
    pub device_id: String,
    /// Cluster node name the device will join as
    pub node_name: String,
    /// Compact signed credential handed to the device
    pub signed_value: String,
    /// Issuance timestamp (Unix milliseconds)
    pub issued_at_ms: u64,
    /// Expiry timestamp (Unix milliseconds)
    pub expires_at_ms: u64,
    /// Current lifecycle status
    pub status: TokenStatus,
}

impl Token {
    /// Whether the TTL has elapsed at `now_ms`, regardless of stored status.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at_ms <= now_ms
    }
}

/// Registry state of a device.
///
/// `Unregistered` is the absence of a row; the first `register-device`
/// call creates the row in `Registered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Known to the orchestrator, no join in progress
    Registered,
    /// Holds an active token, join outcome not yet reported
    JoinPending,
    /// Last join succeeded; kept alive by heartbeats
    Joined,
    /// Joined but heartbeats lapsed beyond the staleness window
    Stale,
    /// Last join failed or timed out
    Failed,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Registered => "registered",
            DeviceState::JoinPending => "join_pending",
            DeviceState::Joined => "joined",
            DeviceState::Stale => "stale",
            DeviceState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "registered" => Some(DeviceState::Registered),
            "join_pending" => Some(DeviceState::JoinPending),
            "joined" => Some(DeviceState::Joined),
            "stale" => Some(DeviceState::Stale),
            "failed" => Some(DeviceState::Failed),
            _ => None,
        }
    }

    /// Legal transitions of the device state machine.
    ///
    /// Token issuance moves any state into `JoinPending` (a reissue while
    /// already pending stays pending). A join report resolves `JoinPending`
    /// to `Joined` or `Failed`; a retry with a still-valid token may resolve
    /// `Failed` the same way. The staleness sweep moves `Joined` to `Stale`
    /// and a fresh heartbeat moves it back.
    pub fn can_transition(&self, to: DeviceState) -> bool {
        use DeviceState::*;
        match (self, to) {
            (Registered, JoinPending) => true,
            (Joined, JoinPending) => true,
            (Failed, JoinPending) => true,
            (Stale, JoinPending) => true,
            (JoinPending, JoinPending) => true,
            (JoinPending, Joined) => true,
            (JoinPending, Failed) => true,
            (Failed, Joined) => true,
            (Failed, Failed) => true,
            (Joined, Joined) => true,
            (Joined, Stale) => true,
            (Stale, Joined) => true,
            _ => false,
        }
    }
}

/// Deployment submission state journaled on the device row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// No deployment requested for the current join generation
    None,
    /// Join succeeded, submission handed to the worker pool
    Queued,
    /// Control plane accepted the descriptor
    Submitted,
    /// Submission failed; detail carries the reason
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::None => "none",
            DeploymentStatus::Queued => "queued",
            DeploymentStatus::Submitted => "submitted",
            DeploymentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(DeploymentStatus::None),
            "queued" => Some(DeploymentStatus::Queued),
            "submitted" => Some(DeploymentStatus::Submitted),
            "failed" => Some(DeploymentStatus::Failed),
            _ => None,
        }
    }
}

/// Deployment mark carried on a device record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentMark {
    pub status: DeploymentStatus,
    /// Failure reason when status is `Failed`
    pub detail: Option<String>,
    /// When the mark last changed (Unix milliseconds)
    pub updated_at_ms: Option<u64>,
}

impl DeploymentMark {
    pub fn none() -> Self {
        Self {
            status: DeploymentStatus::None,
            detail: None,
            updated_at_ms: None,
        }
    }
}

/// An edge device known to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Stable device identifier chosen by the operator
    pub device_id: String,
    /// Hostname the device registers under, refreshed on token issuance
    pub node_name: String,
    /// Last reported address
    pub ip_address: String,
    /// Registry state
    pub state: DeviceState,
    /// Id of the most recently issued token, if any
    pub current_token_id: Option<String>,
    /// Highest heartbeat timestamp seen (Unix milliseconds)
    pub last_heartbeat_ms: Option<u64>,
    /// Deployment submission state for the current join generation
    pub deployment: DeploymentMark,
    /// First registration timestamp (Unix milliseconds)
    pub registered_at_ms: u64,
}

/// Outcome reported by the edge agent for one join attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOutcome {
    Success,
    Failure,
}

impl JoinOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinOutcome::Success => "success",
            JoinOutcome::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(JoinOutcome::Success),
            "failure" => Some(JoinOutcome::Failure),
            _ => None,
        }
    }
}

/// Audit row for a join report, written whether or not the report was
/// accepted. Rejected reports carry the rejection in `diagnostic`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinAttempt {
    pub device_id: String,
    pub token_id: String,
    pub outcome: JoinOutcome,
    pub reported_at_ms: u64,
    /// Agent-supplied output, or the reason a report was rejected
    pub diagnostic: Option<String>,
}
