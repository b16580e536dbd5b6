//! Utilities to help writing tests.
//!
//! This module is only compiled for test runs.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Utc};
use parking_lot::Mutex;
use tempfile::TempDir;
use uuid::Uuid;

use crate::attendance::{Attendance, DailyAttendance, DayStatus, WorkedHours, WorkedHoursType};
use crate::config::Config;
use crate::context::Context;
use crate::employee::{CurrentLocation, Employee, LocationSource};
use crate::storage::{Db, DbPool};
use crate::stock_str;
use crate::transport::{ChatApi, Update};

/// Project name of the single test database.
pub(crate) const TEST_PROJECT: &str = "testrun";

/// A box around the Nairobi office, longitude 36.80..36.82, latitude
/// -1.29..-1.27.
pub(crate) const NAIROBI_AREA: &str =
    "[[[36.80,-1.29],[36.82,-1.29],[36.82,-1.27],[36.80,-1.27]]]";

/// One message captured by the [`RecordingApi`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SentMessage {
    pub chat_id: i64,
    pub text: String,
    /// URL of the inline button, when one was attached.
    pub url: Option<String>,
}

/// Chat transport double that records outbound messages.
#[derive(Debug, Default)]
pub(crate) struct RecordingApi {
    pub sent: Mutex<Vec<SentMessage>>,
}

#[async_trait]
impl ChatApi for RecordingApi {
    async fn get_updates(&self, _offset: Option<i64>, _timeout_secs: u64) -> Result<Vec<Update>> {
        // Nothing inbound; pace the poller down in case a test starts IO.
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        Ok(Vec::new())
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.sent.lock().push(SentMessage {
            chat_id,
            text: text.to_string(),
            url: None,
        });
        Ok(())
    }

    async fn send_url_button(
        &self,
        chat_id: i64,
        text: &str,
        _label: &str,
        url: &str,
    ) -> Result<()> {
        self.sent.lock().push(SentMessage {
            chat_id,
            text: text.to_string(),
            url: Some(url.to_string()),
        });
        Ok(())
    }
}

/// A [`Context`] over a temporary single-project store and a recording
/// transport. The temporary directory is cleaned up on drop.
pub(crate) struct TestContext {
    pub ctx: Context,
    /// Keeps the store directory alive for the lifetime of the context.
    #[allow(dead_code)]
    pub dir: TempDir,
    pub api: Arc<RecordingApi>,
}

impl TestContext {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db = Db::open(TEST_PROJECT, dir.path().join("testrun.sqlite"))
            .await
            .expect("failed to open test db");
        let api = Arc::new(RecordingApi::default());

        let config = Config {
            bot_token: "123456:TEST".to_string(),
            default_tz: chrono_tz::Africa::Nairobi,
            web_app_url: Some("https://app.example.org".to_string()),
            db_dir: dir.path().to_path_buf(),
        };
        let ctx = Context::with_api(config, DbPool::from_dbs(vec![db]), api.clone());

        Self { ctx, dir, api }
    }

    /// The single test database.
    pub fn db(&self) -> Arc<Db> {
        self.ctx
            .dbs
            .get(TEST_PROJECT)
            .expect("test db disappeared")
    }

    /// All messages sent so far.
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.api.sent.lock().clone()
    }
}

/// An employee with the Nairobi working area and no linked chat.
pub(crate) fn employee_fixture(id: &str, uid: &str) -> Employee {
    Employee {
        id: id.to_string(),
        uid: uid.to_string(),
        name: format!("Employee {uid}"),
        telegram_chat_id: None,
        working_area: NAIROBI_AREA.to_string(),
        timezone: Some("Africa/Nairobi".to_string()),
        reporting_line_manager: None,
        current_location: None,
    }
}

/// A fresh live location, part of an hour-long session.
pub(crate) fn live_location_fixture(longitude: f64, latitude: f64) -> CurrentLocation {
    let now = crate::tools::now_utc();
    CurrentLocation {
        latitude,
        longitude,
        accuracy: Some(15.0),
        heading: None,
        speed: None,
        source: LocationSource::TelegramLive,
        is_live: true,
        updated_at: now,
        live_message_id: "9".to_string(),
        live_chat_id: "555".to_string(),
        live_until: Some(now + Duration::hours(1)),
        ended_at: None,
    }
}

/// A fresh static share.
pub(crate) fn static_location_fixture(longitude: f64, latitude: f64) -> CurrentLocation {
    CurrentLocation {
        latitude,
        longitude,
        accuracy: Some(25.0),
        heading: None,
        speed: None,
        source: LocationSource::Telegram,
        is_live: false,
        updated_at: crate::tools::now_utc(),
        live_message_id: "9".to_string(),
        live_chat_id: "555".to_string(),
        live_until: None,
        ended_at: None,
    }
}

/// An attendance document with an open clock-in at `clock_in`.
pub(crate) fn clocked_in_attendance(uid: &str, clock_in: DateTime<Utc>) -> Attendance {
    let mut attendance = Attendance::new(uid, clock_in.year(), clock_in.format("%B").to_string());

    let day_index = (clock_in.day() - 1) as usize;
    let mut values: Vec<Option<DailyAttendance>> = vec![None; day_index + 1];
    values[day_index] = Some(DailyAttendance {
        id: Uuid::new_v4().to_string(),
        day: clock_in.day(),
        value: None,
        timestamp: Some(clock_in),
        from: None,
        to: None,
        status: DayStatus::NotAvailable,
        daily_worked_hours: 0.0,
        worked_hours: vec![WorkedHours {
            id: Uuid::new_v4().to_string(),
            timestamp: clock_in,
            entry_type: WorkedHoursType::ClockIn,
            hour: stock_str::format_hour(clock_in, chrono_tz::Africa::Nairobi),
        }],
    });

    attendance.values = values;
    attendance.last_clock_in = Some(clock_in);
    attendance
}
