//! # Bot commands.

use std::str::FromStr;

use anyhow::Result;

use crate::context::Context;
use crate::employee::Employee;
use crate::location::resolve_employee_context;
use crate::stock_str;
use crate::tools::now_utc;

/// The commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Command {
    Start,
    Test,
    App,
    Location,
    Live,
}

impl Command {
    /// Parses `/command` or `/command@botname` message text.
    pub fn parse(text: &str) -> Option<Command> {
        let word = text.trim().split_whitespace().next()?;
        let name = word.strip_prefix('/')?.split('@').next()?;
        Command::from_str(name).ok()
    }
}

/// Handles one command message.
pub(crate) async fn handle_command(context: &Context, chat_id: i64, text: &str) -> Result<()> {
    let Some(command) = Command::parse(text) else {
        info!(context, "ignoring unknown command {:?} from chat {}", text, chat_id);
        context
            .chat_api
            .send_message(chat_id, &stock_str::unknown_command())
            .await?;
        return Ok(());
    };

    match command {
        Command::Start => start(context, chat_id).await,
        Command::Test => test(context, chat_id).await,
        Command::App => app(context, chat_id).await,
        Command::Location => location(context, chat_id).await,
        Command::Live => {
            context
                .chat_api
                .send_message(chat_id, &stock_str::live_help())
                .await
        }
    }
}

/// `/start` links the chat to an employee record, if one matches.
async fn start(context: &Context, chat_id: i64) -> Result<()> {
    let reply = match resolve_employee_context(context, chat_id).await? {
        Some(session) => stock_str::start_linked(&session.display_name),
        None => stock_str::start_unknown(),
    };
    context.chat_api.send_message(chat_id, &reply).await
}

/// `/test` reports liveness and store health.
async fn test(context: &Context, chat_id: i64) -> Result<()> {
    let info = context.get_info().await;
    let mut reply = String::from("✅ geoclock is running\n");
    for (key, value) in info {
        reply.push_str(&format!("<b>{key}</b>: {value}\n"));
    }
    context.chat_api.send_message(chat_id, &reply).await
}

/// `/app` sends the web-app link.
async fn app(context: &Context, chat_id: i64) -> Result<()> {
    match &context.config.web_app_url {
        Some(url) => {
            context
                .chat_api
                .send_url_button(chat_id, &stock_str::app_button_text(), "Open app", url)
                .await
        }
        None => {
            context
                .chat_api
                .send_message(chat_id, &stock_str::no_web_app())
                .await
        }
    }
}

/// `/location` reports the stored current location and its age.
async fn location(context: &Context, chat_id: i64) -> Result<()> {
    let stored = match resolve_employee_context(context, chat_id).await? {
        Some(session) => match context.dbs.get(&session.project_name) {
            Some(db) => Employee::load(&db.sql, &session.employee_id)
                .await?
                .and_then(|employee| employee.current_location),
            None => None,
        },
        None => None,
    };

    let reply = match stored {
        Some(location) => {
            let age_minutes = (now_utc() - location.updated_at).num_minutes();
            stock_str::location_status(
                location.latitude,
                location.longitude,
                age_minutes,
                location.is_live,
            )
        }
        None => stock_str::no_location_stored(),
    };
    context.chat_api.send_message(chat_id, &reply).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::employee::Employee;
    use crate::test_utils::{employee_fixture, live_location_fixture, TestContext};

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/start@geoclock_bot"), Some(Command::Start));
        assert_eq!(Command::parse("/live now"), Some(Command::Live));
        assert_eq!(Command::parse("/frobnicate"), None);
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_links_known_chat() -> Result<()> {
        let t = TestContext::new().await;
        let sql = &t.db().sql;

        let mut employee = employee_fixture("emp-1", "uid-1");
        employee.telegram_chat_id = Some("555".to_string());
        employee.save(sql).await?;

        handle_command(&t.ctx, 555, "/start").await?;

        assert!(t.ctx.chat_sessions.get(555).is_some());
        let sent = t.sent_messages();
        assert!(sent[0].text.contains(&employee.name));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_unknown_chat() -> Result<()> {
        let t = TestContext::new().await;
        handle_command(&t.ctx, 999, "/start").await?;

        assert!(t.ctx.chat_sessions.get(999).is_none());
        assert!(t.sent_messages()[0].text.contains("not linked"));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_app_sends_button() -> Result<()> {
        let t = TestContext::new().await;
        handle_command(&t.ctx, 555, "/app").await?;

        let sent = t.sent_messages();
        assert_eq!(sent[0].url.as_deref(), Some("https://app.example.org"));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_location_reports_stored() -> Result<()> {
        let t = TestContext::new().await;
        let sql = &t.db().sql;

        let mut employee = employee_fixture("emp-1", "uid-1");
        employee.telegram_chat_id = Some("555".to_string());
        employee.current_location = Some(live_location_fixture(36.81, -1.28));
        employee.save(sql).await?;

        handle_command(&t.ctx, 555, "/location").await?;

        let sent = t.sent_messages();
        assert!(sent[0].text.contains("36.81"));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_location_without_data() -> Result<()> {
        let t = TestContext::new().await;
        let sql = &t.db().sql;

        let mut employee = employee_fixture("emp-1", "uid-1");
        employee.telegram_chat_id = Some("555".to_string());
        employee.save(sql).await?;

        handle_command(&t.ctx, 555, "/location").await?;
        assert!(t.sent_messages()[0].text.contains("No location"));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unknown_command_gets_reply() -> Result<()> {
        let t = TestContext::new().await;
        handle_command(&t.ctx, 555, "/frobnicate").await?;
        assert!(t.sent_messages()[0].text.contains("Unknown"));
        Ok(())
    }
}
