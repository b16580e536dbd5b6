//! # Live-session registry.
//!
//! The chat platform gives no reliable "stop sharing" signal: the live
//! period may be absent on updates and the final event may never arrive.
//! So every live stream is tracked in process memory, keyed by
//! `(chat_id, message_id)`, and a sweeper finalizes sessions whose live
//! period ran out or whose updates stopped for longer than the grace
//! window.

use std::collections::HashMap;

use async_channel::Receiver;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::timeout;

use crate::constants::{LIVE_GRACE_MS, SWEEP_INTERVAL};
use crate::context::Context;
use crate::employee;
use crate::events::EventType;
use crate::storage;
use crate::tools::{duration_to_str, time_millis};

/// Identifies one live-location stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LiveKey {
    pub chat_id: i64,
    pub message_id: i64,
}

/// State of one active live-location stream.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSession {
    /// Employee document id the stream belongs to.
    pub employee_id: String,

    /// Project database the employee lives in.
    pub project_name: String,

    /// When live sharing is expected to end; `None` if the platform never
    /// told us the duration.
    pub live_until_ms: Option<i64>,

    /// Last time any event arrived on this stream.
    pub last_update_ms: i64,
}

/// Process-wide map of active live shares.
///
/// All access goes through this handle; the container itself is private and
/// every operation takes the lock exactly once.
#[derive(Debug, Default)]
pub struct LiveRegistry {
    inner: Mutex<HashMap<LiveKey, LiveSession>>,
}

impl LiveRegistry {
    pub fn get(&self, key: &LiveKey) -> Option<LiveSession> {
        self.inner.lock().get(key).cloned()
    }

    pub fn upsert(&self, key: LiveKey, session: LiveSession) {
        self.inner.lock().insert(key, session);
    }

    pub fn delete(&self, key: &LiveKey) {
        self.inner.lock().remove(key);
    }

    /// Copies out the current entries, releasing the lock before the caller
    /// does any I/O.
    pub fn snapshot(&self) -> Vec<(LiveKey, LiveSession)> {
        self.inner
            .lock()
            .iter()
            .map(|(key, session)| (*key, session.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Applies one ingested event to the registry and reports whether the
    /// stream counts as live afterwards.
    ///
    /// A known duration always (re)arms the session. Without a duration an
    /// existing entry just advances its update time; an edit event for an
    /// unseen key starts an open-ended session, because edits only happen
    /// on live streams. A plain static share never touches the registry.
    pub(crate) fn track(
        &self,
        key: LiveKey,
        employee_id: &str,
        project_name: &str,
        live_period_seconds: Option<i64>,
        is_edit: bool,
        now_ms: i64,
    ) -> bool {
        let mut map = self.inner.lock();

        if let Some(period) = live_period_seconds.filter(|period| *period > 0) {
            map.insert(
                key,
                LiveSession {
                    employee_id: employee_id.to_string(),
                    project_name: project_name.to_string(),
                    live_until_ms: Some(now_ms + period * 1000),
                    last_update_ms: now_ms,
                },
            );
            true
        } else if let Some(entry) = map.get_mut(&key) {
            entry.last_update_ms = now_ms;
            true
        } else if is_edit {
            map.insert(
                key,
                LiveSession {
                    employee_id: employee_id.to_string(),
                    project_name: project_name.to_string(),
                    live_until_ms: None,
                    last_update_ms: now_ms,
                },
            );
            true
        } else {
            false
        }
    }
}

/// When the sweeper considers a session over.
pub(crate) fn expiry_threshold_ms(session: &LiveSession) -> i64 {
    session
        .live_until_ms
        .unwrap_or(i64::MAX)
        .min(session.last_update_ms + LIVE_GRACE_MS)
}

/// Finalizes every session past its threshold.
///
/// Finalization is best-effort: a store failure leaves the entry in place
/// so the next tick retries it.
pub(crate) async fn sweep_expired(context: &Context, now_ms: i64) {
    let expired: Vec<(LiveKey, LiveSession)> = context
        .live
        .snapshot()
        .into_iter()
        .filter(|(_, session)| now_ms >= expiry_threshold_ms(session))
        .collect();

    for (key, session) in expired {
        let Some(db) = context.dbs.get(&session.project_name) else {
            warn!(
                context,
                "dropping live session for unknown project {}", session.project_name
            );
            context.live.delete(&key);
            continue;
        };

        let ended_at: DateTime<Utc> = DateTime::from_timestamp_millis(now_ms)
            .unwrap_or_else(crate::tools::now_utc);

        let res = storage::with_retry(
            context,
            &session.project_name,
            "finalize live location",
            || employee::finalize_live_location(&db.sql, &session.employee_id, ended_at),
        )
        .await;

        match res {
            Ok(()) => {
                info!(
                    context,
                    "live session {}/{} for employee {} ended",
                    key.chat_id,
                    key.message_id,
                    session.employee_id
                );
                context.live.delete(&key);
                context.emit_event(EventType::LiveSessionEnded {
                    employee_id: session.employee_id,
                });
            }
            Err(err) => {
                warn!(
                    context,
                    "failed to finalize live session for employee {}, retrying next sweep: {:#}",
                    session.employee_id,
                    err
                );
            }
        }
    }
}

pub(crate) async fn sweeper_loop(context: &Context, interrupt_receiver: Receiver<()>) {
    info!(
        context,
        "live-session sweeper running every {}",
        duration_to_str(SWEEP_INTERVAL)
    );
    loop {
        match timeout(SWEEP_INTERVAL, interrupt_receiver.recv()).await {
            Ok(Ok(())) => {
                // Interrupted to sweep early, fall through.
            }
            Ok(Err(_)) => {
                info!(context, "interrupt channel closed, sweeper exits now");
                return;
            }
            Err(_) => {
                // Regular cadence.
            }
        }
        sweep_expired(context, time_millis()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::employee::Employee;
    use crate::test_utils::{employee_fixture, live_location_fixture, TestContext, TEST_PROJECT};

    fn key() -> LiveKey {
        LiveKey {
            chat_id: 777,
            message_id: 42,
        }
    }

    #[test]
    fn test_track_with_period_arms_session() {
        let registry = LiveRegistry::default();
        let now_ms = 1_000_000;

        assert!(registry.track(key(), "emp-1", TEST_PROJECT, Some(60), false, now_ms));
        let session = registry.get(&key()).unwrap();
        assert_eq!(session.live_until_ms, Some(now_ms + 60_000));
        assert_eq!(session.last_update_ms, now_ms);
    }

    #[test]
    fn test_track_update_preserves_live_until() {
        let registry = LiveRegistry::default();
        registry.track(key(), "emp-1", TEST_PROJECT, Some(60), false, 1_000);

        // Later edit without a period only advances the update time.
        assert!(registry.track(key(), "emp-1", TEST_PROJECT, None, true, 5_000));
        let session = registry.get(&key()).unwrap();
        assert_eq!(session.live_until_ms, Some(61_000));
        assert_eq!(session.last_update_ms, 5_000);
    }

    #[test]
    fn test_track_edit_without_entry_is_open_ended() {
        let registry = LiveRegistry::default();
        assert!(registry.track(key(), "emp-1", TEST_PROJECT, None, true, 1_000));
        let session = registry.get(&key()).unwrap();
        assert_eq!(session.live_until_ms, None);
    }

    #[test]
    fn test_track_static_share_is_not_live() {
        let registry = LiveRegistry::default();
        assert!(!registry.track(key(), "emp-1", TEST_PROJECT, None, false, 1_000));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_expiry_threshold() {
        let session = LiveSession {
            employee_id: "emp-1".to_string(),
            project_name: TEST_PROJECT.to_string(),
            live_until_ms: Some(60_000),
            last_update_ms: 10_000,
        };
        // Live period ends before the grace window would.
        assert_eq!(expiry_threshold_ms(&session), 60_000);

        let open_ended = LiveSession {
            live_until_ms: None,
            ..session
        };
        assert_eq!(expiry_threshold_ms(&open_ended), 10_000 + LIVE_GRACE_MS);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sweep_finalizes_expired_session() -> anyhow::Result<()> {
        let t = TestContext::new().await;
        let sql = &t.db().sql;

        let mut employee = employee_fixture("emp-1", "uid-1");
        employee.current_location = Some(live_location_fixture(36.81, -1.28));
        employee.save(sql).await?;

        let now_ms = time_millis();
        t.ctx.live.upsert(
            key(),
            LiveSession {
                employee_id: "emp-1".to_string(),
                project_name: TEST_PROJECT.to_string(),
                live_until_ms: Some(now_ms - 1),
                last_update_ms: now_ms - 200_000,
            },
        );

        sweep_expired(&t.ctx, now_ms).await;

        assert!(t.ctx.live.is_empty());
        let location = Employee::load(sql, "emp-1")
            .await?
            .unwrap()
            .current_location
            .unwrap();
        assert!(!location.is_live);
        assert!(location.ended_at.is_some());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sweep_keeps_active_session() {
        let t = TestContext::new().await;
        let now_ms = time_millis();
        t.ctx.live.upsert(
            key(),
            LiveSession {
                employee_id: "emp-1".to_string(),
                project_name: TEST_PROJECT.to_string(),
                live_until_ms: Some(now_ms + 60_000),
                last_update_ms: now_ms,
            },
        );

        sweep_expired(&t.ctx, now_ms).await;
        assert_eq!(t.ctx.live.len(), 1);
    }
}
