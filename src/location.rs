//! Location handling.
//!
//! Translates chat-transport location events into live-registry updates,
//! the employee's stored `currentLocation`, and an append-only location
//! log.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};

use crate::context::{ChatSession, Context};
use crate::employee::{self, CurrentLocation, Employee, LocationSource};
use crate::events::EventType;
use crate::live::LiveKey;
use crate::log::LogExt;
use crate::sql::Sql;
use crate::storage;
use crate::tools::{now_utc, time_millis};

/// One location event as delivered by the chat transport.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationEvent {
    pub chat_id: i64,
    pub message_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// The platform calls this `horizontal_accuracy`.
    pub accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    /// Live period in seconds; absent on plain shares and on most updates.
    pub live_period_seconds: Option<i64>,
    /// Whether this arrived on the *edited_message* channel.
    pub is_edit: bool,
}

/// Ingests one location event.
///
/// Events for chats that resolve to no employee are dropped with a warning.
/// The log append is best-effort; only the `currentLocation` write
/// propagates failure.
pub async fn on_location_event(context: &Context, event: LocationEvent) -> Result<()> {
    let Some(session) = resolve_employee_context(context, event.chat_id).await? else {
        warn!(
            context,
            "dropping location event from unresolved chat {}", event.chat_id
        );
        return Ok(());
    };

    let db = context
        .dbs
        .get(&session.project_name)
        .with_context(|| format!("project {} has no database", session.project_name))?;

    let key = LiveKey {
        chat_id: event.chat_id,
        message_id: event.message_id,
    };
    let now_ms = time_millis();
    let now = now_utc();

    let is_live = context.live.track(
        key,
        &session.employee_id,
        &session.project_name,
        event.live_period_seconds,
        event.is_edit,
        now_ms,
    );
    let live_until: Option<DateTime<Utc>> = context
        .live
        .get(&key)
        .and_then(|live| live.live_until_ms)
        .and_then(DateTime::from_timestamp_millis);

    let location = CurrentLocation {
        latitude: event.latitude,
        longitude: event.longitude,
        accuracy: event.accuracy,
        heading: event.heading,
        speed: event.speed,
        source: if is_live {
            LocationSource::TelegramLive
        } else {
            LocationSource::Telegram
        },
        is_live,
        updated_at: now,
        live_message_id: event.message_id.to_string(),
        live_chat_id: event.chat_id.to_string(),
        live_until,
        ended_at: None,
    };

    storage::with_retry(
        context,
        &session.project_name,
        "update currentLocation",
        || employee::update_current_location(&db.sql, &session.employee_id, &location, now),
    )
    .await?;

    context.emit_event(EventType::LocationChanged {
        employee_id: session.employee_id.clone(),
    });

    append_location_log(&db.sql, &session.employee_id, &event, &location, now)
        .await
        .log_err(context)
        .ok();

    Ok(())
}

/// Finds which employee a chat belongs to.
///
/// The chat-session map is checked first; on a miss every healthy database
/// is queried for a matching `telegramChatID` and the result is cached.
pub(crate) async fn resolve_employee_context(
    context: &Context,
    chat_id: i64,
) -> Result<Option<ChatSession>> {
    if let Some(session) = context.chat_sessions.get(chat_id) {
        return Ok(Some(session));
    }

    for db in context.dbs.healthy().await {
        if let Some(employee) =
            Employee::load_by_telegram_chat_id(&db.sql, &chat_id.to_string()).await?
        {
            let session = ChatSession {
                employee_id: employee.id,
                uid: employee.uid,
                project_name: db.project_name.clone(),
                display_name: employee.name,
            };
            context.chat_sessions.insert(chat_id, session.clone());
            return Ok(Some(session));
        }
    }

    Ok(None)
}

async fn append_location_log(
    sql: &Sql,
    employee_id: &str,
    event: &LocationEvent,
    location: &CurrentLocation,
    now: DateTime<Utc>,
) -> Result<()> {
    sql.execute(
        "INSERT INTO location_logs
           (employee_id, latitude, longitude, accuracy, heading, speed,
            source, chat_id, message_id, live_period_seconds, recorded_at)
         VALUES (?,?,?,?,?,?,?,?,?,?,?)",
        (
            employee_id,
            event.latitude,
            event.longitude,
            event.accuracy,
            event.heading,
            event.speed,
            location.source.to_string(),
            event.chat_id,
            event.message_id,
            event.live_period_seconds,
            now.to_rfc3339(),
        ),
    )
    .await?;
    Ok(())
}
