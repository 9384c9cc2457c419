//! Session markers and the expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::keys::{self, session_data_patterns, session_marker_pattern};
use crate::{CacheStore, SessionError};

/// Outcome of one sweep cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Session markers found.
    pub sessions_seen: u64,
    /// Sessions reclaimed in this cycle.
    pub sessions_expired: u64,
    /// Data keys deleted across all reclaimed sessions.
    pub data_keys_deleted: u64,
}

/// Issues session tokens, records heartbeats and reclaims idle sessions.
///
/// A marker `session:{token}` holds the Unix second of the last heartbeat. The
/// marker also carries a passive TTL, but the sweep is what removes the data
/// keys a session owns.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    store: Arc<dyn CacheStore>,
    timeout: Duration,
    marker_ttl: Duration,
}

impl SessionRegistry {
    /// Creates a registry.
    ///
    /// `timeout` is the idle time after which the sweep reclaims a session;
    /// `marker_ttl` is the passive expiry of the marker itself.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, timeout: Duration, marker_ttl: Duration) -> Self {
        Self {
            store,
            timeout,
            marker_ttl,
        }
    }

    /// Starts a new session and returns its token.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub async fn initiate(&self) -> Result<String, SessionError> {
        let token = Uuid::new_v4().to_string();
        self.touch_at(&token, Utc::now().timestamp()).await?;
        info!(session = %short(&token), "session initiated");
        Ok(token)
    }

    /// Records a heartbeat for an existing session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the marker is gone; the client
    /// must initiate a new session.
    pub async fn heartbeat(&self, token: &str) -> Result<(), SessionError> {
        if self.store.get(&keys::session_key(token)).await?.is_none() {
            return Err(SessionError::NotFound(token.to_string()));
        }
        self.touch_at(token, Utc::now().timestamp()).await
    }

    /// Writes the marker with `last_seen` as the heartbeat time.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub async fn touch_at(&self, token: &str, last_seen: i64) -> Result<(), SessionError> {
        self.store
            .set(&keys::session_key(token), last_seen.to_string(), self.marker_ttl)
            .await?;
        Ok(())
    }

    /// Returns the last heartbeat time of a session, if its marker exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be read.
    pub async fn last_seen(&self, token: &str) -> Result<Option<i64>, SessionError> {
        let raw = self.store.get(&keys::session_key(token)).await?;
        Ok(raw.as_deref().and_then(parse_seconds))
    }

    /// Runs one sweep cycle against the current wall clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be scanned or written.
    pub async fn sweep(&self) -> Result<SweepReport, SessionError> {
        self.sweep_at(Utc::now().timestamp()).await
    }

    /// Runs one sweep cycle as of `now` (Unix seconds).
    ///
    /// Each candidate's data keys are collected first and its marker is
    /// re-read right before the delete; a session that heartbeated in the
    /// meantime is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be scanned or written.
    pub async fn sweep_at(&self, now: i64) -> Result<SweepReport, SessionError> {
        let timeout = i64::try_from(self.timeout.as_secs()).unwrap_or(i64::MAX);
        let markers = self.store.scan(&session_marker_pattern()).await?;
        let values = self.store.get_many(&markers).await?;

        let mut report = SweepReport {
            sessions_seen: markers.len() as u64,
            ..SweepReport::default()
        };

        for (marker, value) in markers.iter().zip(values) {
            let Some(token) = keys::session_token(marker) else {
                continue;
            };
            let Some(last_seen) = value.as_deref().and_then(parse_seconds) else {
                if value.is_some() {
                    warn!(marker = %marker, "unreadable session marker, leaving to passive expiry");
                }
                continue;
            };
            if now.saturating_sub(last_seen) <= timeout {
                continue;
            }

            let mut doomed = Vec::new();
            for pattern in session_data_patterns(token) {
                doomed.extend(self.store.scan(&pattern).await?);
            }

            // Scans are slow; a heartbeat may have landed while they ran.
            match self.last_seen(token).await? {
                Some(latest) if now.saturating_sub(latest) <= timeout => {
                    debug!(session = %short(token), "session refreshed during sweep, keeping");
                    continue;
                }
                _ => {}
            }

            let data_keys = doomed.len() as u64;
            doomed.push(marker.clone());
            self.store.delete_many(&doomed).await?;

            info!(
                session = %short(token),
                idle_secs = now - last_seen,
                data_keys,
                "expired session reclaimed"
            );
            report.sessions_expired += 1;
            report.data_keys_deleted += data_keys;
        }

        info!(
            seen = report.sessions_seen,
            expired = report.sessions_expired,
            deleted = report.data_keys_deleted,
            "session sweep finished"
        );
        Ok(report)
    }
}

fn parse_seconds(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

fn short(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}
