//! SQLite-backed persistence for tokens, devices, and join audit rows.
//!
//! One `Store` owns one connection. Multi-row updates run inside short
//! explicit transactions; a transaction is the per-device atomic critical
//! section (revoke-then-insert on issuance, consume-and-join on report).
//! Callers serialize access (the gateway holds the store behind a mutex),
//! so no operation ever waits on another connection.
//!
//! Expiry is enforced twice: lazily, on any read that returns a token past
//! its TTL (the transition is persisted on that read), and periodically by
//! the staleness sweep via [`Store::expire_due_tokens`], so unclaimed
//! Pending rows cannot sit past their TTL unobserved.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use tracing::{debug, info, warn};

use causeway_core::{Error, Result};

use crate::model::{
    Device, DeviceState, DeploymentMark, DeploymentStatus, JoinAttempt, Token, TokenStatus,
};

/// Observability counters for the store.
#[derive(Debug, Default, Clone)]
pub struct StoreMetrics {
    /// Total tokens inserted
    pub tokens_issued_total: u64,
    /// Total tokens revoked by force reissue
    pub tokens_revoked_total: u64,
    /// Total tokens expired (lazily on read or by sweep)
    pub tokens_expired_total: u64,
    /// Total devices moved Joined -> Stale by the sweep
    pub devices_marked_stale_total: u64,
    /// Total pending joins failed because their token lapsed
    pub joins_timed_out_total: u64,
    /// Total join audit rows written
    pub join_attempts_recorded_total: u64,
}

/// Result of applying a successful join report.
#[derive(Debug, Clone)]
pub struct JoinApplied {
    /// Device record after the transition
    pub device: Device,
    /// Whether this report armed the deployment guard (first success of
    /// the current join generation); the caller enqueues a submission
    /// exactly when this is true
    pub deployment_armed: bool,
}

/// Token and device store with a SQLite backend.
pub struct Store {
    conn: Connection,
    metrics: StoreMetrics,
}

impl Store {
    /// Create or open the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        info!(path = %path.display(), "Opening token store");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(db_err)?;

        conn.pragma_update(None, "journal_mode", "WAL").map_err(db_err)?;
        conn.pragma_update(None, "synchronous", "NORMAL").map_err(db_err)?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn,
            metrics: StoreMetrics::default(),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tokens (
                token_id      TEXT PRIMARY KEY,
                device_id     TEXT NOT NULL,
                node_name     TEXT NOT NULL,
                signed_value  TEXT NOT NULL,
                issued_at_ms  INTEGER NOT NULL,
                expires_at_ms INTEGER NOT NULL,
                status        TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tokens_device ON tokens(device_id, issued_at_ms);
            CREATE INDEX IF NOT EXISTS idx_tokens_status ON tokens(status, expires_at_ms);

            CREATE TABLE IF NOT EXISTS devices (
                device_id         TEXT PRIMARY KEY,
                node_name         TEXT NOT NULL,
                ip_address        TEXT NOT NULL,
                state             TEXT NOT NULL,
                current_token_id  TEXT,
                last_heartbeat_ms INTEGER,
                deploy_status     TEXT NOT NULL DEFAULT 'none',
                deploy_detail     TEXT,
                deploy_updated_ms INTEGER,
                registered_at_ms  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS join_attempts (
                attempt_id     INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id      TEXT NOT NULL,
                token_id       TEXT NOT NULL,
                outcome        TEXT NOT NULL,
                reported_at_ms INTEGER NOT NULL,
                diagnostic     TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_attempts_device ON join_attempts(device_id, reported_at_ms);
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Token lifecycle
    // ------------------------------------------------------------------

    /// Persist a freshly signed token, enforcing at most one active token
    /// per device.
    ///
    /// Runs as one transaction: the device row must exist (`NotFound`
    /// otherwise); an existing Pending/Issued token that already lapsed is
    /// persisted Expired rather than blocking issuance; one that is still
    /// live is a `Conflict` unless `force`, in which case it is marked
    /// Revoked in the same transaction. The new token is stored Pending,
    /// the device moves to JoinPending with its `current_token_id` and
    /// `node_name` refreshed, and the deployment guard is re-armed for the
    /// new join generation.
    pub fn issue_token(&mut self, token: &Token, force: bool) -> Result<Token> {
        let tx = self.conn.transaction().map_err(db_err)?;

        let known: Option<String> = tx
            .query_row(
                "SELECT device_id FROM devices WHERE device_id = ?1",
                params![token.device_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if known.is_none() {
            return Err(Error::NotFound(format!(
                "device {} is not registered",
                token.device_id
            )));
        }

        let active: Vec<(String, u64)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT token_id, expires_at_ms FROM tokens
                     WHERE device_id = ?1 AND status IN ('pending','issued')",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![token.device_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                })
                .map_err(db_err)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?
        };

        let mut revoked = 0u64;
        let mut expired = 0u64;
        for (existing_id, expires_at_ms) in active {
            if expires_at_ms <= token.issued_at_ms {
                tx.execute(
                    "UPDATE tokens SET status = 'expired' WHERE token_id = ?1",
                    params![existing_id],
                )
                .map_err(db_err)?;
                expired += 1;
            } else if force {
                tx.execute(
                    "UPDATE tokens SET status = 'revoked' WHERE token_id = ?1",
                    params![existing_id],
                )
                .map_err(db_err)?;
                info!(
                    device_id = %token.device_id,
                    revoked_token_id = %existing_id,
                    "Force reissue revoked the prior active token"
                );
                revoked += 1;
            } else {
                return Err(Error::Conflict(format!(
                    "device {} already has an active token {}",
                    token.device_id, existing_id
                )));
            }
        }

        tx.execute(
            "INSERT INTO tokens (token_id, device_id, node_name, signed_value,
                                 issued_at_ms, expires_at_ms, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.id,
                token.device_id,
                token.node_name,
                token.signed_value,
                token.issued_at_ms as i64,
                token.expires_at_ms as i64,
                TokenStatus::Pending.as_str(),
            ],
        )
        .map_err(db_err)?;

        tx.execute(
            "UPDATE devices SET state = 'join_pending', current_token_id = ?2, node_name = ?3,
                    deploy_status = 'none', deploy_detail = NULL, deploy_updated_ms = NULL
             WHERE device_id = ?1",
            params![token.device_id, token.id, token.node_name],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        self.metrics.tokens_issued_total += 1;
        self.metrics.tokens_revoked_total += revoked;
        self.metrics.tokens_expired_total += expired;

        info!(
            device_id = %token.device_id,
            token_id = %token.id,
            expires_at_ms = token.expires_at_ms,
            "Token issued"
        );

        Ok(Token {
            status: TokenStatus::Pending,
            ..token.clone()
        })
    }

    /// Most recent non-revoked token for a device, with lazy expiry applied.
    pub fn current_token(&mut self, device_id: &str, now_ms: u64) -> Result<Option<Token>> {
        let token = {
            let mut stmt = self
                .conn
                .prepare(
                    "SELECT token_id, device_id, node_name, signed_value,
                            issued_at_ms, expires_at_ms, status
                     FROM tokens
                     WHERE device_id = ?1 AND status != 'revoked'
                     ORDER BY issued_at_ms DESC, rowid DESC
                     LIMIT 1",
                )
                .map_err(db_err)?;
            stmt.query_row(params![device_id], token_from_row)
                .optional()
                .map_err(db_err)?
        };

        match token {
            Some(token) => Ok(Some(self.apply_lazy_expiry(token, now_ms)?)),
            None => Ok(None),
        }
    }

    /// Direct lookup by token id, with lazy expiry applied.
    pub fn get_token(&mut self, token_id: &str, now_ms: u64) -> Result<Option<Token>> {
        let token = {
            let mut stmt = self
                .conn
                .prepare(
                    "SELECT token_id, device_id, node_name, signed_value,
                            issued_at_ms, expires_at_ms, status
                     FROM tokens WHERE token_id = ?1",
                )
                .map_err(db_err)?;
            stmt.query_row(params![token_id], token_from_row)
                .optional()
                .map_err(db_err)?
        };

        match token {
            Some(token) => Ok(Some(self.apply_lazy_expiry(token, now_ms)?)),
            None => Ok(None),
        }
    }

    /// Persist Expired for a token whose TTL has passed but whose stored
    /// status is still active. Read paths call this so a lapsed token is
    /// never reported as live.
    fn apply_lazy_expiry(&mut self, mut token: Token, now_ms: u64) -> Result<Token> {
        if token.status.is_active() && token.is_expired_at(now_ms) {
            let changed = self
                .conn
                .execute(
                    "UPDATE tokens SET status = 'expired'
                     WHERE token_id = ?1 AND status IN ('pending','issued')",
                    params![token.id],
                )
                .map_err(db_err)?;
            self.metrics.tokens_expired_total += changed as u64;
            token.status = TokenStatus::Expired;
            debug!(token_id = %token.id, "Token past TTL, persisted Expired on read");
        }
        Ok(token)
    }

    /// Promote a Pending token to Issued once the device has polled it.
    /// Already-Issued tokens are left untouched.
    pub fn mark_delivered(&mut self, token_id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE tokens SET status = 'issued'
                 WHERE token_id = ?1 AND status = 'pending'",
                params![token_id],
            )
            .map_err(db_err)?;
        if changed > 0 {
            debug!(token_id = %token_id, "Token delivered to device");
        }
        Ok(())
    }

    /// Consume a token after a successful join.
    ///
    /// Idempotent: consuming an already-Consumed token is a no-op success.
    /// Consuming an Expired or Revoked token is `InvalidState`; an unknown
    /// id is `NotFound`.
    pub fn mark_consumed(&mut self, token_id: &str, now_ms: u64) -> Result<()> {
        let token = self
            .get_token(token_id, now_ms)?
            .ok_or_else(|| Error::NotFound(format!("token {token_id} not found")))?;

        match token.status {
            TokenStatus::Consumed => Ok(()),
            TokenStatus::Expired => Err(Error::InvalidState(format!(
                "token {token_id} is expired and cannot be consumed"
            ))),
            TokenStatus::Revoked => Err(Error::InvalidState(format!(
                "token {token_id} is revoked and cannot be consumed"
            ))),
            TokenStatus::Pending | TokenStatus::Issued => {
                self.conn
                    .execute(
                        "UPDATE tokens SET status = 'consumed'
                         WHERE token_id = ?1 AND status IN ('pending','issued')",
                        params![token_id],
                    )
                    .map_err(db_err)?;
                Ok(())
            }
        }
    }

    /// Sweep support: persist Expired for every active token past its TTL.
    /// Returns the number of rows transitioned.
    pub fn expire_due_tokens(&mut self, now_ms: u64) -> Result<usize> {
        let changed = self
            .conn
            .execute(
                "UPDATE tokens SET status = 'expired'
                 WHERE status IN ('pending','issued') AND expires_at_ms <= ?1",
                params![now_ms as i64],
            )
            .map_err(db_err)?;
        if changed > 0 {
            debug!(expired = changed, "Swept lapsed tokens");
        }
        self.metrics.tokens_expired_total += changed as u64;
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Device registry
    // ------------------------------------------------------------------

    /// Registration upsert: create the row as Registered, or refresh
    /// `node_name`/`ip_address` on an existing row without touching state.
    pub fn insert_device(
        &mut self,
        device_id: &str,
        node_name: &str,
        ip_address: &str,
        now_ms: u64,
    ) -> Result<Device> {
        self.conn
            .execute(
                "INSERT INTO devices (device_id, node_name, ip_address, state, registered_at_ms)
                 VALUES (?1, ?2, ?3, 'registered', ?4)
                 ON CONFLICT(device_id) DO UPDATE SET
                     node_name = excluded.node_name,
                     ip_address = excluded.ip_address",
                params![device_id, node_name, ip_address, now_ms as i64],
            )
            .map_err(db_err)?;

        self.device(device_id)?
            .ok_or_else(|| Error::Storage(format!("device {device_id} missing after upsert")))
    }

    /// Look up a device record.
    pub fn device(&self, device_id: &str) -> Result<Option<Device>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT device_id, node_name, ip_address, state, current_token_id,
                        last_heartbeat_ms, deploy_status, deploy_detail, deploy_updated_ms,
                        registered_at_ms
                 FROM devices WHERE device_id = ?1",
            )
            .map_err(db_err)?;
        stmt.query_row(params![device_id], device_from_row)
            .optional()
            .map_err(db_err)
    }

    /// All device records, ordered by registration time.
    pub fn list_devices(&self) -> Result<Vec<Device>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT device_id, node_name, ip_address, state, current_token_id,
                        last_heartbeat_ms, deploy_status, deploy_detail, deploy_updated_ms,
                        registered_at_ms
                 FROM devices ORDER BY registered_at_ms ASC, device_id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt.query_map([], device_from_row).map_err(db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)
    }

    /// Record a heartbeat timestamp.
    ///
    /// Timestamps are non-decreasing: a retried or reordered delivery with
    /// an older (or equal) timestamp is absorbed without a write. A newer
    /// heartbeat on a Stale device moves it back to Joined in the same
    /// update.
    pub fn record_heartbeat(&mut self, device_id: &str, timestamp_ms: u64) -> Result<Device> {
        let device = self
            .device(device_id)?
            .ok_or_else(|| Error::NotFound(format!("device {device_id} is not registered")))?;

        let newest = device.last_heartbeat_ms.unwrap_or(0);
        if timestamp_ms <= newest {
            return Ok(device);
        }

        if device.state == DeviceState::Stale {
            self.conn
                .execute(
                    "UPDATE devices SET last_heartbeat_ms = ?2, state = 'joined'
                     WHERE device_id = ?1",
                    params![device_id, timestamp_ms as i64],
                )
                .map_err(db_err)?;
            info!(device_id = %device_id, "Heartbeat resumed, device back to joined");
        } else {
            self.conn
                .execute(
                    "UPDATE devices SET last_heartbeat_ms = ?2 WHERE device_id = ?1",
                    params![device_id, timestamp_ms as i64],
                )
                .map_err(db_err)?;
        }

        self.device(device_id)?
            .ok_or_else(|| Error::Storage(format!("device {device_id} missing after heartbeat")))
    }

    // ------------------------------------------------------------------
    // Join resolution
    // ------------------------------------------------------------------

    /// Apply a validated success report in one transaction: token becomes
    /// Consumed, device becomes Joined, and the deployment guard arms if
    /// this is the first success of the current join generation.
    ///
    /// The report itself is a liveness signal, so the device's heartbeat
    /// floor is raised to `now_ms` in the same update.
    pub fn apply_join_success(
        &mut self,
        device_id: &str,
        token_id: &str,
        now_ms: u64,
    ) -> Result<JoinApplied> {
        let device = self
            .device(device_id)?
            .ok_or_else(|| Error::NotFound(format!("device {device_id} is not registered")))?;
        if !device.state.can_transition(DeviceState::Joined) {
            return Err(Error::InvalidState(format!(
                "device {device_id} cannot complete a join from state {}",
                device.state.as_str()
            )));
        }

        let deployment_armed = matches!(
            device.deployment.status,
            DeploymentStatus::None | DeploymentStatus::Failed
        );

        let tx = self.conn.transaction().map_err(db_err)?;

        tx.execute(
            "UPDATE tokens SET status = 'consumed'
             WHERE token_id = ?1 AND status IN ('pending','issued')",
            params![token_id],
        )
        .map_err(db_err)?;

        tx.execute(
            "UPDATE devices SET state = 'joined',
                    last_heartbeat_ms = MAX(COALESCE(last_heartbeat_ms, 0), ?2)
             WHERE device_id = ?1",
            params![device_id, now_ms as i64],
        )
        .map_err(db_err)?;

        if deployment_armed {
            tx.execute(
                "UPDATE devices SET deploy_status = 'queued', deploy_detail = NULL,
                        deploy_updated_ms = ?2
                 WHERE device_id = ?1",
                params![device_id, now_ms as i64],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;

        info!(
            device_id = %device_id,
            token_id = %token_id,
            deployment_armed,
            "Join success applied"
        );

        let device = self
            .device(device_id)?
            .ok_or_else(|| Error::Storage(format!("device {device_id} missing after join")))?;

        Ok(JoinApplied {
            device,
            deployment_armed,
        })
    }

    /// Apply a validated failure report: device becomes Failed, the token
    /// is left untouched so a retry can reuse it until it expires.
    pub fn apply_join_failure(&mut self, device_id: &str) -> Result<Device> {
        let device = self
            .device(device_id)?
            .ok_or_else(|| Error::NotFound(format!("device {device_id} is not registered")))?;
        if !device.state.can_transition(DeviceState::Failed) {
            return Err(Error::InvalidState(format!(
                "device {device_id} cannot record a join failure from state {}",
                device.state.as_str()
            )));
        }

        self.conn
            .execute(
                "UPDATE devices SET state = 'failed' WHERE device_id = ?1",
                params![device_id],
            )
            .map_err(db_err)?;

        warn!(device_id = %device_id, "Join failure applied");

        self.device(device_id)?
            .ok_or_else(|| Error::Storage(format!("device {device_id} missing after failure")))
    }

    // ------------------------------------------------------------------
    // Sweep support
    // ------------------------------------------------------------------

    /// Move Joined devices whose last heartbeat is older than `cutoff_ms`
    /// to Stale. Returns the affected device ids.
    pub fn mark_stale_devices(&mut self, cutoff_ms: u64) -> Result<Vec<String>> {
        let tx = self.conn.transaction().map_err(db_err)?;

        let stale: Vec<String> = {
            let mut stmt = tx
                .prepare(
                    "SELECT device_id FROM devices
                     WHERE state = 'joined'
                       AND last_heartbeat_ms IS NOT NULL
                       AND last_heartbeat_ms < ?1",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![cutoff_ms as i64], |row| row.get(0))
                .map_err(db_err)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?
        };

        for device_id in &stale {
            tx.execute(
                "UPDATE devices SET state = 'stale' WHERE device_id = ?1",
                params![device_id],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;

        if !stale.is_empty() {
            self.metrics.devices_marked_stale_total += stale.len() as u64;
            warn!(count = stale.len(), "Devices lapsed past the staleness window");
        }

        Ok(stale)
    }

    /// Move JoinPending devices whose current token has lapsed to Failed
    /// (join timeout). Returns the affected device ids.
    pub fn fail_timed_out_joins(&mut self, now_ms: u64) -> Result<Vec<String>> {
        let tx = self.conn.transaction().map_err(db_err)?;

        let timed_out: Vec<String> = {
            let mut stmt = tx
                .prepare(
                    "SELECT d.device_id FROM devices d
                     JOIN tokens t ON t.token_id = d.current_token_id
                     WHERE d.state = 'join_pending'
                       AND t.status != 'consumed'
                       AND t.expires_at_ms <= ?1",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![now_ms as i64], |row| row.get(0))
                .map_err(db_err)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?
        };

        for device_id in &timed_out {
            tx.execute(
                "UPDATE devices SET state = 'failed' WHERE device_id = ?1",
                params![device_id],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;

        if !timed_out.is_empty() {
            self.metrics.joins_timed_out_total += timed_out.len() as u64;
            warn!(count = timed_out.len(), "Pending joins timed out with their tokens");
        }

        Ok(timed_out)
    }

    // ------------------------------------------------------------------
    // Deployment marks
    // ------------------------------------------------------------------

    /// Journal a successful deployment submission on the device row.
    pub fn mark_deployment_submitted(&mut self, device_id: &str, now_ms: u64) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE devices SET deploy_status = 'submitted', deploy_detail = NULL,
                        deploy_updated_ms = ?2
                 WHERE device_id = ?1",
                params![device_id, now_ms as i64],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(Error::NotFound(format!("device {device_id} not found")));
        }
        Ok(())
    }

    /// Journal a failed deployment submission. The Joined state is not
    /// reverted; the failure detail is kept for the status surface and the
    /// guard re-arms so the next successful join retries the submission.
    pub fn mark_deployment_failed(
        &mut self,
        device_id: &str,
        detail: &str,
        now_ms: u64,
    ) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE devices SET deploy_status = 'failed', deploy_detail = ?3,
                        deploy_updated_ms = ?2
                 WHERE device_id = ?1",
                params![device_id, now_ms as i64, detail],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(Error::NotFound(format!("device {device_id} not found")));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Join audit
    // ------------------------------------------------------------------

    /// Append a join audit row. Returns the row id.
    pub fn record_join_attempt(&mut self, attempt: &JoinAttempt) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO join_attempts (device_id, token_id, outcome, reported_at_ms, diagnostic)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    attempt.device_id,
                    attempt.token_id,
                    attempt.outcome.as_str(),
                    attempt.reported_at_ms as i64,
                    attempt.diagnostic,
                ],
            )
            .map_err(db_err)?;
        self.metrics.join_attempts_recorded_total += 1;
        Ok(self.conn.last_insert_rowid())
    }

    /// Audit rows for a device, oldest first.
    pub fn join_attempts(&self, device_id: &str) -> Result<Vec<JoinAttempt>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT device_id, token_id, outcome, reported_at_ms, diagnostic
                 FROM join_attempts WHERE device_id = ?1
                 ORDER BY attempt_id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![device_id], attempt_from_row)
            .map_err(db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)
    }

    /// Snapshot of the store counters.
    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

fn token_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Token> {
    let status: String = row.get(6)?;
    let status = TokenStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown token status '{status}'").into(),
        )
    })?;
    Ok(Token {
        id: row.get(0)?,
        device_id: row.get(1)?,
        node_name: row.get(2)?,
        signed_value: row.get(3)?,
        issued_at_ms: row.get::<_, i64>(4)? as u64,
        expires_at_ms: row.get::<_, i64>(5)? as u64,
        status,
    })
}

fn device_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Device> {
    let state: String = row.get(3)?;
    let state = DeviceState::parse(&state).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown device state '{state}'").into(),
        )
    })?;
    let deploy_status: String = row.get(6)?;
    let deploy_status = DeploymentStatus::parse(&deploy_status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown deployment status '{deploy_status}'").into(),
        )
    })?;
    Ok(Device {
        device_id: row.get(0)?,
        node_name: row.get(1)?,
        ip_address: row.get(2)?,
        state,
        current_token_id: row.get(4)?,
        last_heartbeat_ms: row.get::<_, Option<i64>>(5)?.map(|v| v as u64),
        deployment: DeploymentMark {
            status: deploy_status,
            detail: row.get(7)?,
            updated_at_ms: row.get::<_, Option<i64>>(8)?.map(|v| v as u64),
        },
        registered_at_ms: row.get::<_, i64>(9)? as u64,
    })
}

fn attempt_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JoinAttempt> {
    let outcome: String = row.get(2)?;
    let outcome = crate::model::JoinOutcome::parse(&outcome).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown join outcome '{outcome}'").into(),
        )
    })?;
    Ok(JoinAttempt {
        device_id: row.get(0)?,
        token_id: row.get(1)?,
        outcome,
        reported_at_ms: row.get::<_, i64>(3)? as u64,
        diagnostic: row.get(4)?,
    })
}
