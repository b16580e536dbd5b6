//! # Task scheduler.
//!
//! Owns the three long-lived tasks: the auto-clock-out monitor, the
//! live-session sweeper, and the transport poller. Each gets an interrupt
//! channel; closing the channel asks the loop to exit at its next wait
//! point, so an in-flight tick always runs to completion.

use async_channel::{self as channel, Sender};
use tokio::task::JoinHandle;

use crate::context::Context;
use crate::{live, monitor, transport};

/// Handle to one spawned loop.
#[derive(Debug)]
pub(crate) struct TaskHandle {
    interrupt: Sender<()>,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    async fn stop(self) {
        self.interrupt.close();
        self.handle.await.ok();
    }
}

/// State of the long-lived tasks.
#[derive(Debug, Default)]
pub(crate) enum Scheduler {
    #[default]
    Stopped,
    Running {
        monitor: TaskHandle,
        sweeper: TaskHandle,
        poller: TaskHandle,
    },
}

impl Scheduler {
    pub(crate) fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Spawns the loops.
    pub(crate) fn start(context: Context) -> Self {
        let monitor = spawn(context.clone(), |ctx, rx| async move {
            monitor::monitor_loop(&ctx, rx).await;
        });
        let sweeper = spawn(context.clone(), |ctx, rx| async move {
            live::sweeper_loop(&ctx, rx).await;
        });
        let poller = spawn(context, |ctx, rx| async move {
            transport::poll_loop(&ctx, rx).await;
        });

        Self::Running {
            monitor,
            sweeper,
            poller,
        }
    }

    /// Asks every loop to exit and waits for them.
    pub(crate) async fn stop(self) {
        match self {
            Self::Stopped => {}
            Self::Running {
                monitor,
                sweeper,
                poller,
            } => {
                monitor.stop().await;
                sweeper.stop().await;
                poller.stop().await;
            }
        }
    }
}

fn spawn<F, Fut>(context: Context, f: F) -> TaskHandle
where
    F: FnOnce(Context, channel::Receiver<()>) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (interrupt, interrupt_receiver) = channel::bounded(1);
    let handle = tokio::spawn(f(context, interrupt_receiver));
    TaskHandle { interrupt, handle }
}
