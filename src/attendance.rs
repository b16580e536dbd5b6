//! # Attendance documents.
//!
//! One document per employee and month. The `values` array has one slot per
//! day of month; older store writes serialized it as a sparse object with
//! numeric string keys, so reads normalize back to a dense array before
//! anything else looks at it. Writes always produce the dense array shape.

use anyhow::{bail, ensure, Context as _, Result};
use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::{EXPECTED_DAILY_HOURS, HALF_PRESENT_THRESHOLD, PRESENT_THRESHOLD};
use crate::context::Context;
use crate::sql::Sql;
use crate::stock_str;
use crate::storage::{self, Db};
use crate::tools::now_utc;

/// Daily classification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceValue {
    /// Present.
    P,
    /// Half present.
    H,
    /// Absent.
    A,
}

/// Review status of a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayStatus {
    #[serde(rename = "N/A")]
    NotAvailable,
    Submitted,
    Approved,
    Rejected,
}

/// Kind of a worked-hours entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkedHoursType {
    #[serde(rename = "Clock In")]
    ClockIn,
    #[serde(rename = "Clock Out")]
    ClockOut,
}

/// One clock-in or clock-out inside a day.
///
/// Entries are kept in insertion order, which by construction is monotonic
/// in `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkedHours {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub entry_type: WorkedHoursType,
    /// Localized "h:mm AM/PM" rendering of `timestamp`.
    pub hour: String,
}

/// Attendance state of a single day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAttendance {
    pub id: String,
    /// Day of month, 1-based.
    pub day: u32,
    pub value: Option<AttendanceValue>,
    pub timestamp: Option<DateTime<Utc>>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub status: DayStatus,
    pub daily_worked_hours: f64,
    pub worked_hours: Vec<WorkedHours>,
}

impl DailyAttendance {
    fn empty(day: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            day,
            value: None,
            timestamp: None,
            from: None,
            to: None,
            status: DayStatus::NotAvailable,
            daily_worked_hours: 0.0,
            worked_hours: Vec::new(),
        }
    }
}

/// One employee-month attendance document.
#[derive(Debug, Clone, PartialEq)]
pub struct Attendance {
    /// Document key.
    pub id: String,
    pub uid: String,
    pub year: i32,
    /// English month name, e.g. "September".
    pub month: String,
    pub monthly_worked_hours: f64,
    /// Non-`None` iff the employee is currently clocked in.
    pub last_clock_in: Option<DateTime<Utc>>,
    /// Dense per-day array, indexed by day of month minus 1.
    pub values: Vec<Option<DailyAttendance>>,
}

/// Failures of the attendance mutator.
#[derive(Debug, thiserror::Error)]
pub enum ClockOutError {
    /// The document had no open clock-in. Should not occur for scanned
    /// employees; the monitor logs it.
    #[error("no prior clock-in on attendance document")]
    NoPriorClockIn,

    /// The single document update failed; the next tick retries.
    #[error("attendance write failed")]
    WriteFailed(#[source] anyhow::Error),
}

/// Normalizes a stored `values` field to the dense array shape.
///
/// Arrays pass through slot for slot; numeric-keyed maps are exploded into
/// an array with each entry at the index its key names.
pub(crate) fn values_from_json(value: Value) -> Result<Vec<Option<DailyAttendance>>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Null => Ok(None),
                item => Ok(Some(serde_json::from_value(item)?)),
            })
            .collect(),
        Value::Object(map) => {
            let mut values: Vec<Option<DailyAttendance>> = Vec::new();
            for (key, item) in map {
                let index: usize = key
                    .parse()
                    .with_context(|| format!("non-numeric values key {key:?}"))?;
                ensure!(index < 31, "values index {index} out of range");
                if values.len() <= index {
                    values.resize(index + 1, None);
                }
                values[index] = match item {
                    Value::Null => None,
                    item => Some(serde_json::from_value(item)?),
                };
            }
            Ok(values)
        }
        other => bail!("values must be an array or a map, got {other}"),
    }
}

pub(crate) fn values_to_json(values: &[Option<DailyAttendance>]) -> Result<Value> {
    Ok(serde_json::to_value(values)?)
}

fn row_to_attendance(row: &rusqlite::Row) -> rusqlite::Result<(Attendance, Value)> {
    let raw_values: String = row.get("values_json")?;
    let raw_values: Value = serde_json::from_str(&raw_values).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })?;
    let last_clock_in: Option<String> = row.get("last_clock_in")?;
    let last_clock_in = last_clock_in
        .map(|raw| {
            raw.parse::<DateTime<Utc>>().map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })
        })
        .transpose()?;

    Ok((
        Attendance {
            id: row.get("id")?,
            uid: row.get("uid")?,
            year: row.get("year")?,
            month: row.get("month")?,
            monthly_worked_hours: row.get("monthly_worked_hours")?,
            last_clock_in,
            values: Vec::new(),
        },
        raw_values,
    ))
}

const ATTENDANCE_COLUMNS: &str =
    "id, uid, year, month, monthly_worked_hours, last_clock_in, values_json";

impl Attendance {
    /// Creates an empty document for the given employee-month.
    pub fn new(uid: impl Into<String>, year: i32, month: impl Into<String>) -> Self {
        let uid = uid.into();
        let month = month.into();
        Self {
            id: format!("{uid}-{year}-{month}"),
            uid,
            year,
            month,
            monthly_worked_hours: 0.0,
            last_clock_in: None,
            values: Vec::new(),
        }
    }

    /// Loads all documents of one month. `values` is normalized on read.
    pub async fn load_for_month(sql: &Sql, year: i32, month: &str) -> Result<Vec<Attendance>> {
        let rows = sql
            .query_map(
                &format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE year=? AND month=?"),
                (year, month),
                row_to_attendance,
                |rows| {
                    rows.collect::<std::result::Result<Vec<_>, _>>()
                        .map_err(Into::into)
                },
            )
            .await?;

        rows.into_iter()
            .map(|(mut attendance, raw_values)| {
                attendance.values = values_from_json(raw_values)?;
                Ok(attendance)
            })
            .collect()
    }

    /// Loads one document by key.
    pub async fn load(sql: &Sql, id: &str) -> Result<Option<Attendance>> {
        let row = sql
            .query_row_optional(
                &format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id=?"),
                (id,),
                row_to_attendance,
            )
            .await?;
        row.map(|(mut attendance, raw_values)| {
            attendance.values = values_from_json(raw_values)?;
            Ok(attendance)
        })
        .transpose()
    }

    /// Writes the whole document in one update.
    pub async fn save(&self, sql: &Sql) -> Result<()> {
        sql.execute(
            "INSERT OR REPLACE INTO attendance
               (id, uid, year, month, monthly_worked_hours, last_clock_in, values_json, last_changed)
             VALUES (?,?,?,?,?,?,?,?)",
            (
                &self.id,
                &self.uid,
                self.year,
                &self.month,
                self.monthly_worked_hours,
                self.last_clock_in.map(|ts| ts.to_rfc3339()),
                serde_json::to_string(&values_to_json(&self.values)?)?,
                now_utc().to_rfc3339(),
            ),
        )
        .await?;
        Ok(())
    }

    /// Most recent clock-out on the given day, if any.
    pub(crate) fn last_clock_out_on_day(&self, day_index: usize) -> Option<DateTime<Utc>> {
        self.values
            .get(day_index)?
            .as_ref()?
            .worked_hours
            .iter()
            .filter(|entry| entry.entry_type == WorkedHoursType::ClockOut)
            .map(|entry| entry.timestamp)
            .max()
    }
}

/// Applies an automatic clock-out to the document, in memory.
///
/// The day is addressed by the clock-in's UTC day of month, matching the
/// human clock-in path. The day is classified "A" unconditionally: an
/// auto-clock-out records a policy violation, not worked presence.
pub fn apply_auto_clock_out(
    attendance: &Attendance,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<Attendance, ClockOutError> {
    let clock_in = attendance
        .last_clock_in
        .ok_or(ClockOutError::NoPriorClockIn)?;

    let day_index = (clock_in.day() - 1) as usize;
    let hours_worked = (now - clock_in).num_milliseconds() as f64 / 3_600_000.0;

    let mut values = attendance.values.clone();
    if values.len() <= day_index {
        values.resize(day_index + 1, None);
    }
    let day = values[day_index].get_or_insert_with(|| DailyAttendance::empty(day_index as u32 + 1));

    day.worked_hours.push(WorkedHours {
        id: Uuid::new_v4().to_string(),
        timestamp: now,
        entry_type: WorkedHoursType::ClockOut,
        hour: stock_str::format_hour(now, tz),
    });
    day.daily_worked_hours += hours_worked;
    day.value = Some(AttendanceValue::A);
    day.status = DayStatus::Submitted;
    day.timestamp = Some(now);

    Ok(Attendance {
        id: attendance.id.clone(),
        uid: attendance.uid.clone(),
        year: attendance.year,
        month: attendance.month.clone(),
        monthly_worked_hours: attendance.monthly_worked_hours + hours_worked,
        last_clock_in: None,
        values,
    })
}

/// Applies an automatic clock-out and writes the document.
pub async fn auto_clock_out(
    context: &Context,
    db: &Db,
    attendance: &Attendance,
    tz: Tz,
) -> Result<Attendance, ClockOutError> {
    let updated = apply_auto_clock_out(attendance, tz, now_utc())?;

    storage::with_retry(context, &db.project_name, "auto clock-out update", || {
        updated.save(&db.sql)
    })
    .await
    .map_err(ClockOutError::WriteFailed)?;

    Ok(updated)
}

/// The human path's classification: presence by share of expected hours.
///
/// Kept for parity with the human clock-out reducer; the auto path above
/// bypasses it deliberately.
pub fn classify_day(daily_worked_hours: f64) -> AttendanceValue {
    if daily_worked_hours >= EXPECTED_DAILY_HOURS * PRESENT_THRESHOLD {
        AttendanceValue::P
    } else if daily_worked_hours >= EXPECTED_DAILY_HOURS * HALF_PRESENT_THRESHOLD {
        AttendanceValue::H
    } else {
        AttendanceValue::A
    }
}
