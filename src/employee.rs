//! # Employee documents.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sql::Sql;

/// Where a stored location came from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LocationSource {
    /// A static location share.
    Telegram,
    /// Part of a live-location stream.
    TelegramLive,
}

/// The single latest reduction of all observed chat-platform location events
/// for one employee.
///
/// Invariants: `is_live` implies `ended_at` is `None`; a non-`None`
/// `ended_at` implies `is_live` is false. A finalized session is only
/// replaced by a genuinely live event, never revived by a static share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub source: LocationSource,
    pub is_live: bool,
    pub updated_at: DateTime<Utc>,
    pub live_message_id: String,
    pub live_chat_id: String,
    pub live_until: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// The subset of the employee document the core uses.
#[derive(Debug, Clone, PartialEq)]
pub struct Employee {
    /// Document key.
    pub id: String,

    /// Stable user id, also the attendance key.
    pub uid: String,

    /// Display name, used in manager notifications.
    pub name: String,

    /// Chat id of the linked phone, if the employee completed linking.
    pub telegram_chat_id: Option<String>,

    /// JSON-encoded multi-polygon; may be empty.
    pub working_area: String,

    /// IANA zone name; `None` falls back to the configured default.
    pub timezone: Option<String>,

    /// Uid of the reporting line manager, if any.
    pub reporting_line_manager: Option<String>,

    /// Latest observed location, if any.
    pub current_location: Option<CurrentLocation>,
}

fn row_to_employee(row: &rusqlite::Row) -> rusqlite::Result<Employee> {
    let current_location: Option<String> = row.get("current_location")?;
    let current_location = current_location
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })
        })
        .transpose()?;

    Ok(Employee {
        id: row.get("id")?,
        uid: row.get("uid")?,
        name: row.get("name")?,
        telegram_chat_id: row.get("telegram_chat_id")?,
        working_area: row.get("working_area")?,
        timezone: row.get("timezone")?,
        reporting_line_manager: row.get("reporting_line_manager")?,
        current_location,
    })
}

const EMPLOYEE_COLUMNS: &str = "id, uid, name, telegram_chat_id, working_area, \
                                timezone, reporting_line_manager, current_location";

impl Employee {
    /// Loads an employee by document id.
    pub async fn load(sql: &Sql, id: &str) -> Result<Option<Employee>> {
        sql.query_row_optional(
            &format!("SELECT {EMPLOYEE_COLUMNS} FROM employee WHERE id=?"),
            (id,),
            row_to_employee,
        )
        .await
    }

    /// Loads an employee by uid.
    pub async fn load_by_uid(sql: &Sql, uid: &str) -> Result<Option<Employee>> {
        sql.query_row_optional(
            &format!("SELECT {EMPLOYEE_COLUMNS} FROM employee WHERE uid=?"),
            (uid,),
            row_to_employee,
        )
        .await
    }

    /// Loads an employee by the linked chat id.
    pub async fn load_by_telegram_chat_id(
        sql: &Sql,
        telegram_chat_id: &str,
    ) -> Result<Option<Employee>> {
        sql.query_row_optional(
            &format!("SELECT {EMPLOYEE_COLUMNS} FROM employee WHERE telegram_chat_id=?"),
            (telegram_chat_id,),
            row_to_employee,
        )
        .await
    }

    /// Inserts or replaces the whole document.
    pub async fn save(&self, sql: &Sql) -> Result<()> {
        let current_location = self
            .current_location
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sql.execute(
            "INSERT OR REPLACE INTO employee
               (id, uid, name, telegram_chat_id, working_area,
                timezone, reporting_line_manager, current_location, last_changed)
             VALUES (?,?,?,?,?,?,?,?,?)",
            (
                &self.id,
                &self.uid,
                &self.name,
                &self.telegram_chat_id,
                &self.working_area,
                &self.timezone,
                &self.reporting_line_manager,
                &current_location,
                crate::tools::now_utc().to_rfc3339(),
            ),
        )
        .await?;
        Ok(())
    }
}

/// Atomically overwrites the stored current location.
pub(crate) async fn update_current_location(
    sql: &Sql,
    employee_id: &str,
    location: &CurrentLocation,
    now: DateTime<Utc>,
) -> Result<()> {
    sql.execute(
        "UPDATE employee SET current_location=?, last_changed=? WHERE id=?",
        (
            serde_json::to_string(location)?,
            now.to_rfc3339(),
            employee_id,
        ),
    )
    .await?;
    Ok(())
}

/// Marks the stored current location as no longer live.
///
/// Used by the sweeper when a live session runs out. A missing or already
/// finalized location is left untouched.
pub(crate) async fn finalize_live_location(
    sql: &Sql,
    employee_id: &str,
    ended_at: DateTime<Utc>,
) -> Result<()> {
    let employee = Employee::load(sql, employee_id).await?;
    let Some(mut location) = employee.and_then(|employee| employee.current_location) else {
        return Ok(());
    };
    if location.ended_at.is_some() {
        return Ok(());
    }

    location.is_live = false;
    location.ended_at = Some(ended_at);
    update_current_location(sql, employee_id, &location, ended_at).await
}
