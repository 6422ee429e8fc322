// Cluster Lock
// Cluster-wide exclusive lock so one run of a named job exists fleet-wide

use crate::db::conn::{Conn, DbError};
use crate::db::dsn::Dsn;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info};

/// How long to wait between acquisition attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock '{key}' not acquired within {timeout:?}")]
    Timeout { key: String, timeout: Duration },
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Lock section of the configuration. An empty key disables locking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub connection: String,
}

/// Exclusive lock held for the duration of a run, backed by a Postgres
/// advisory lock on a dedicated session (advisory locks are session-scoped,
/// so the session must outlive the run).
pub struct ClusterLock {
    key: String,
    conn: Conn,
    held: bool,
}

impl ClusterLock {
    pub fn new(key: impl Into<String>, conn_params: Dsn) -> Self {
        Self {
            key: key.into(),
            conn: Conn::new(conn_params, None),
            held: false,
        }
    }

    /// Advisory lock identifier for a key.
    ///
    /// SHA-256 rather than a process-seeded hash: every host in the fleet
    /// must agree on the identifier.
    pub fn lock_id(key: &str) -> i64 {
        let digest = Sha256::digest(key.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        i64::from_be_bytes(prefix)
    }

    /// Acquire the lock, waiting up to `timeout` (forever when `None`).
    ///
    /// The deadline only bounds acquisition: once the lock is held the timer
    /// is gone, and a run longer than the timeout is never interrupted.
    pub async fn acquire(&mut self, timeout: Option<Duration>) -> Result<(), LockError> {
        if self.key.is_empty() {
            debug!("lock key not set, skipping cluster lock");
            return Ok(());
        }
        let id = Self::lock_id(&self.key).to_string();
        debug!(key = %self.key, id = %id, "acquiring cluster lock");
        let conn = &self.conn;
        let acquired = poll_acquire(&self.key, timeout, || {
            let id = id.clone();
            async move {
                let answer = conn
                    .query_all("select pg_try_advisory_lock($1)", &[id])
                    .await?;
                Ok(answer.first().map(|line| line.as_str()) == Some("true"))
            }
        })
        .await;
        match acquired {
            Ok(()) => {
                self.held = true;
                info!(key = %self.key, "cluster lock acquired");
                Ok(())
            }
            Err(e) => {
                self.conn.close().await;
                Err(e)
            }
        }
    }

    /// Release the lock and close the session.
    pub async fn release(&mut self) {
        if self.held {
            let id = Self::lock_id(&self.key).to_string();
            if let Err(e) = self
                .conn
                .query_all("select pg_advisory_unlock($1)", &[id])
                .await
            {
                debug!(error = %e, "unlock failed, session close releases it anyway");
            }
            self.held = false;
        }
        self.conn.close().await;
    }
}

/// Poll `attempt` until it reports the lock taken, or the deadline passes.
///
/// The deadline lives only inside this function: the moment the lock is
/// taken the timer is gone with the stack frame, so nothing is left that
/// could interrupt the run afterwards.
async fn poll_acquire<F, Fut>(
    key: &str,
    timeout: Option<Duration>,
    mut attempt: F,
) -> Result<(), LockError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool, DbError>>,
{
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        if attempt().await? {
            return Ok(());
        }
        if let Some(deadline) = deadline {
            if Instant::now() + RETRY_INTERVAL > deadline {
                return Err(LockError::Timeout {
                    key: key.to_string(),
                    timeout: timeout.unwrap_or_default(),
                });
            }
        }
        debug!(key, "lock busy, retrying");
        sleep(RETRY_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_ids_are_stable_across_processes() {
        let a = ClusterLock::lock_id("nightly-maintenance");
        let b = ClusterLock::lock_id("nightly-maintenance");
        assert_eq!(a, b);
        assert_ne!(a, ClusterLock::lock_id("weekly-maintenance"));
    }

    #[tokio::test]
    async fn empty_key_skips_locking() {
        let mut lock = ClusterLock::new("", Dsn::default());
        lock.acquire(Some(Duration::from_millis(10))).await.unwrap();
        lock.release().await;
    }

    #[tokio::test(start_paused = true)]
    async fn a_lock_held_elsewhere_fails_acquisition_at_the_deadline() {
        let mut attempts = 0u32;
        let err = poll_acquire("nightly", Some(Duration::from_secs(2)), || {
            attempts += 1;
            async { Ok(false) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, LockError::Timeout { key, .. } if key == "nightly"));
        // Four polls fit into two seconds at the retry interval.
        assert!(attempts >= 2, "gave up after {} attempts", attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn acquisition_before_the_deadline_succeeds() {
        let mut remaining = 3u32;
        poll_acquire("nightly", Some(Duration::from_secs(2)), || {
            remaining = remaining.saturating_sub(1);
            let taken = remaining == 0;
            async move { Ok(taken) }
        })
        .await
        .unwrap();
        // Past this point no deadline exists anymore; a run outlasting the
        // timeout has nothing left to kill it.
        tokio::time::sleep(Duration::from_secs(30)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn without_a_timeout_polling_continues_until_taken() {
        let mut remaining = 2u32;
        poll_acquire("weekly", None, || {
            remaining = remaining.saturating_sub(1);
            let taken = remaining == 0;
            async move { Ok(taken) }
        })
        .await
        .unwrap();
    }
}
