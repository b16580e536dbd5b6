//! # Auto-clock-out monitor.
//!
//! The periodic control loop: scan every clocked-in employee across the
//! healthy databases, validate their location, and clock out the ones whose
//! failure is actionable. Per-employee failures never abort a tick.

use std::sync::Arc;

use anyhow::Result;
use async_channel::Receiver;
use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use tokio::time::timeout;

use crate::attendance::{self, Attendance, ClockOutError};
use crate::constants::{
    CHECK_INTERVAL_MINUTES, LOCATION_MONITOR_ENABLED, MAX_LOCATION_AGE_MINUTES, MONITOR_WARMUP,
    NOTIFICATIONS_ENABLED,
};
use crate::context::Context;
use crate::employee::Employee;
use crate::events::EventType;
use crate::log::LogExt;
use crate::stock_str;
use crate::storage::Db;
use crate::tools::{duration_to_str, now_utc};
use crate::validator;

/// One clocked-in employee, joined across collections.
#[derive(Debug)]
pub struct ClockedInRecord {
    pub employee: Employee,
    pub attendance: Attendance,
    pub db: Arc<Db>,
}

/// One successful auto-clock-out.
#[derive(Debug, Clone)]
pub struct AutoClockOutOutcome {
    pub employee: Employee,
    pub project_name: String,
    /// The verdict's message, reused in the notifications.
    pub reason: String,
}

/// Finds all currently clocked-in employees.
///
/// Reads the whole current month per database and filters client side:
/// a server-side `lastClockInTimestamp` filter would need an extra index on
/// every database, and monthly rows are bounded by headcount anyway.
pub(crate) async fn scan_clocked_in(
    context: &Context,
    dbs: &[Arc<Db>],
    now: DateTime<Utc>,
) -> Vec<ClockedInRecord> {
    let year = now.year();
    let month = now.format("%B").to_string();

    let mut records = Vec::new();
    for db in dbs {
        let attendances = match Attendance::load_for_month(&db.sql, year, &month).await {
            Ok(attendances) => attendances,
            Err(err) => {
                warn!(
                    context,
                    "[{}] scanning attendance failed: {:#}", db.project_name, err
                );
                continue;
            }
        };

        for attendance in attendances {
            if attendance.last_clock_in.is_none() {
                continue;
            }
            match Employee::load_by_uid(&db.sql, &attendance.uid).await {
                Ok(Some(employee)) => records.push(ClockedInRecord {
                    employee,
                    attendance,
                    db: db.clone(),
                }),
                Ok(None) => {
                    warn!(
                        context,
                        "[{}] attendance {} has no employee for uid {}",
                        db.project_name,
                        attendance.id,
                        attendance.uid
                    );
                }
                Err(err) => {
                    warn!(
                        context,
                        "[{}] loading employee {} failed: {:#}",
                        db.project_name,
                        attendance.uid,
                        err
                    );
                }
            }
        }
    }
    records
}

/// Runs one monitor pass and returns the successful auto-clock-outs.
pub async fn monitor_tick(context: &Context) -> Result<Vec<AutoClockOutOutcome>> {
    let now = now_utc();
    let dbs = context.dbs.healthy().await;
    let records = scan_clocked_in(context, &dbs, now).await;
    let checked = records.len();

    let mut outcomes = Vec::new();
    for record in records {
        match check_employee(context, &record, now).await {
            Ok(Some(outcome)) => outcomes.push(outcome),
            Ok(None) => {}
            Err(err) => {
                warn!(
                    context,
                    "monitor check failed for employee {}: {:#}", record.employee.uid, err
                );
            }
        }
    }

    if NOTIFICATIONS_ENABLED {
        notify(context, &outcomes).await;
    }

    context.emit_event(EventType::MonitorTickDone {
        checked,
        clocked_out: outcomes.len(),
    });
    Ok(outcomes)
}

fn employee_tz(context: &Context, employee: &Employee) -> Tz {
    employee
        .timezone
        .as_deref()
        .and_then(|name| name.parse().ok())
        .unwrap_or(context.config.default_tz)
}

async fn check_employee(
    context: &Context,
    record: &ClockedInRecord,
    now: DateTime<Utc>,
) -> Result<Option<AutoClockOutOutcome>> {
    let ClockedInRecord {
        employee,
        attendance,
        db,
    } = record;

    // No assigned area, nothing to enforce.
    if employee.working_area.is_empty() {
        return Ok(None);
    }

    let tz = employee_tz(context, employee);
    let verdict = validator::validate(
        employee.current_location.as_ref(),
        &employee.working_area,
        MAX_LOCATION_AGE_MINUTES,
        tz,
        now,
    );
    if verdict.is_valid {
        return Ok(None);
    }
    let Some(kind) = verdict.error_kind else {
        return Ok(None);
    };
    if !kind.is_actionable() {
        info!(
            context,
            "employee {} location invalid ({kind}), observed only", employee.uid
        );
        return Ok(None);
    }

    // Dedup: at most one auto-clock-out per check interval and document.
    if let Some(clock_in) = attendance.last_clock_in {
        let day_index = (clock_in.day() - 1) as usize;
        if let Some(last_out) = attendance.last_clock_out_on_day(day_index) {
            if (now - last_out).num_minutes() < CHECK_INTERVAL_MINUTES {
                info!(
                    context,
                    "employee {} was clocked out {} minutes ago, skipping",
                    employee.uid,
                    (now - last_out).num_minutes()
                );
                return Ok(None);
            }
        }
    }

    let reason = verdict
        .error_message
        .unwrap_or_else(|| kind.to_string());

    match attendance::auto_clock_out(context, db, attendance, tz).await {
        Ok(_) => {
            info!(
                context,
                "auto-clocked out employee {} ({kind}): {reason}", employee.uid
            );
            context.emit_event(EventType::AutoClockOut {
                uid: employee.uid.clone(),
                reason: reason.clone(),
            });
            Ok(Some(AutoClockOutOutcome {
                employee: employee.clone(),
                project_name: db.project_name.clone(),
                reason,
            }))
        }
        Err(ClockOutError::NoPriorClockIn) => {
            // Raced with a human clock-out between scan and mutation.
            warn!(
                context,
                "employee {} lost its clock-in before the mutation", employee.uid
            );
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Sends the per-employee and per-manager notifications.
///
/// Transport failures are logged, not retried.
async fn notify(context: &Context, outcomes: &[AutoClockOutOutcome]) {
    for outcome in outcomes {
        if let Some(chat_id) = outcome
            .employee
            .telegram_chat_id
            .as_deref()
            .and_then(|raw| raw.parse::<i64>().ok())
        {
            context
                .chat_api
                .send_message(chat_id, &stock_str::auto_clock_out_employee(&outcome.reason))
                .await
                .log_err(context)
                .ok();
        }

        if let Some(manager_uid) = &outcome.employee.reporting_line_manager {
            notify_manager(context, outcome, manager_uid)
                .await
                .log_err(context)
                .ok();
        }
    }
}

async fn notify_manager(
    context: &Context,
    outcome: &AutoClockOutOutcome,
    manager_uid: &str,
) -> Result<()> {
    let Some(db) = context.dbs.get(&outcome.project_name) else {
        return Ok(());
    };
    let Some(manager) = Employee::load_by_uid(&db.sql, manager_uid).await? else {
        return Ok(());
    };
    let Some(chat_id) = manager
        .telegram_chat_id
        .as_deref()
        .and_then(|raw| raw.parse::<i64>().ok())
    else {
        return Ok(());
    };

    context
        .chat_api
        .send_message(
            chat_id,
            &stock_str::auto_clock_out_manager(&outcome.employee.name, &outcome.reason),
        )
        .await
}

/// The periodic driver: first tick after a warm-up, then every
/// [`CHECK_INTERVAL_MINUTES`].
pub(crate) async fn monitor_loop(context: &Context, interrupt_receiver: Receiver<()>) {
    if !LOCATION_MONITOR_ENABLED {
        info!(context, "location monitor is disabled");
        return;
    }

    let interval = std::time::Duration::from_secs(CHECK_INTERVAL_MINUTES as u64 * 60);
    info!(
        context,
        "location monitor starting in {}, then every {}",
        duration_to_str(MONITOR_WARMUP),
        duration_to_str(interval)
    );

    if let Ok(Err(_)) = timeout(MONITOR_WARMUP, interrupt_receiver.recv()).await {
        info!(context, "interrupt channel closed, monitor exits now");
        return;
    }

    loop {
        monitor_tick(context).await.map(|_| ()).log_err(context).ok();

        match timeout(interval, interrupt_receiver.recv()).await {
            Ok(Ok(())) => {
                // Interrupted to tick early, fall through.
            }
            Ok(Err(_)) => {
                info!(context, "interrupt channel closed, monitor exits now");
                return;
            }
            Err(_) => {
                // Regular cadence.
            }
        }
    }
}
