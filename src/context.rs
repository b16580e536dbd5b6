//! Context module.

use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;

use crate::config::Config;
use crate::constants::GEOCLOCK_VERSION_STR;
use crate::events::{EventEmitter, Events, EventType};
use crate::live::LiveRegistry;
use crate::scheduler::Scheduler;
use crate::storage::DbPool;
use crate::transport::{ChatApi, TelegramApi};

/// The root handle everything else hangs off.
///
/// Cheap to clone; all state lives in the inner struct behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Context {
    pub(crate) inner: Arc<InnerContext>,
}

impl Deref for Context {
    type Target = InnerContext;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// The actual context state.
#[derive(Debug)]
pub struct InnerContext {
    /// Server configuration.
    pub config: Config,

    /// Project databases.
    pub dbs: DbPool,

    /// Active live-location streams.
    pub(crate) live: LiveRegistry,

    /// Linked chats, populated by `/start` and by ingestion lookups.
    pub(crate) chat_sessions: ChatSessionMap,

    pub(crate) events: Events,

    /// Outbound chat transport. Tests substitute a recording double.
    pub(crate) chat_api: Arc<dyn ChatApi>,

    pub(crate) scheduler: tokio::sync::RwLock<Scheduler>,

    creation_time: std::time::SystemTime,
}

/// An employee resolved for one chat.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSession {
    /// Employee document id.
    pub employee_id: String,
    pub uid: String,
    /// Project database the employee lives in.
    pub project_name: String,
    pub display_name: String,
}

/// Process-wide chat-id → employee cache.
///
/// The container stays private; the core only needs point lookups.
#[derive(Debug, Default)]
pub struct ChatSessionMap {
    inner: RwLock<HashMap<i64, ChatSession>>,
}

impl ChatSessionMap {
    pub fn get(&self, chat_id: i64) -> Option<ChatSession> {
        self.inner.read().get(&chat_id).cloned()
    }

    pub fn insert(&self, chat_id: i64, session: ChatSession) {
        self.inner.write().insert(chat_id, session);
    }

    pub fn remove(&self, chat_id: i64) {
        self.inner.write().remove(&chat_id);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl Context {
    /// Creates a new context with the real chat transport.
    pub async fn new(config: Config) -> Result<Context> {
        let api = Arc::new(TelegramApi::new(&config.bot_token)?);
        let dbs = DbPool::open_dir(&config.db_dir).await?;
        Ok(Self::with_api(config, dbs, api))
    }

    /// Creates a context over explicit databases and transport.
    pub fn with_api(config: Config, dbs: DbPool, chat_api: Arc<dyn ChatApi>) -> Context {
        let inner = InnerContext {
            config,
            dbs,
            live: LiveRegistry::default(),
            chat_sessions: ChatSessionMap::default(),
            events: Events::new(),
            chat_api,
            scheduler: tokio::sync::RwLock::new(Scheduler::Stopped),
            creation_time: crate::tools::SystemTime::now(),
        };

        Context {
            inner: Arc::new(inner),
        }
    }

    /// Starts the long-lived tasks: monitor, sweeper, transport poller.
    ///
    /// Idempotent; a second call while running is a no-op.
    pub async fn start_io(&self) {
        info!(self, "starting IO");
        let mut lock = self.inner.scheduler.write().await;
        if lock.is_running() {
            info!(self, "IO is already running");
            return;
        }
        *lock = Scheduler::start(self.clone());
    }

    /// Returns whether the long-lived tasks are running.
    pub async fn is_io_running(&self) -> bool {
        self.inner.scheduler.read().await.is_running()
    }

    /// Stops the long-lived tasks.
    ///
    /// Cancels the timers; an in-flight monitor tick runs to completion.
    /// Safe to call when already stopped.
    pub async fn stop_io(&self) {
        info!(self, "stopping IO");
        let scheduler = {
            let mut lock = self.inner.scheduler.write().await;
            std::mem::replace(&mut *lock, Scheduler::Stopped)
        };
        scheduler.stop().await;
    }

    /// Emits a single event.
    pub fn emit_event(&self, event: EventType) {
        self.events.emit(event);
    }

    /// Returns a receiver for all events emitted by this context.
    pub fn get_event_emitter(&self) -> EventEmitter {
        self.events.get_emitter()
    }

    /// Some info about the running server, e.g. for the `/test` command.
    pub async fn get_info(&self) -> BTreeMap<&'static str, String> {
        let mut res = BTreeMap::new();
        res.insert("geoclock_version", format!("v{}", &*GEOCLOCK_VERSION_STR));
        res.insert("databases", self.dbs.all().len().to_string());
        res.insert("healthy_databases", self.dbs.healthy().await.len().to_string());
        res.insert("live_sessions", self.live.len().to_string());
        res.insert("linked_chats", self.chat_sessions.len().to_string());
        res.insert(
            "uptime",
            crate::tools::duration_to_str(
                crate::tools::SystemTime::now()
                    .duration_since(self.creation_time)
                    .unwrap_or_default(),
            ),
        );
        res
    }
}
