//! # Events specification.

use async_channel::{self as channel, Receiver, Sender, TrySendError};

/// Event channel.
#[derive(Debug, Clone)]
pub struct Events {
    receiver: Receiver<EventType>,
    sender: Sender<EventType>,
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}

impl Events {
    /// Creates a new event channel.
    pub fn new() -> Self {
        let (sender, receiver) = channel::bounded(1_000);

        Self { receiver, sender }
    }

    /// Emits an event into the event channel.
    ///
    /// If the channel is full, the oldest event is dropped to make room.
    pub fn emit(&self, event: EventType) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                // when we are full, we pop the oldest event and push on the new one
                let _ = self.receiver.try_recv();

                // try again
                self.emit(event);
            }
            Err(TrySendError::Closed(_)) => {
                unreachable!("unable to emit event, channel disconnected");
            }
        }
    }

    /// Creates an event emitter.
    pub fn get_emitter(&self) -> EventEmitter {
        EventEmitter(self.receiver.clone())
    }
}

/// A receiver of events from a [`Context`].
///
/// [`Context`]: crate::context::Context
#[derive(Debug, Clone)]
pub struct EventEmitter(Receiver<EventType>);

impl EventEmitter {
    /// Async recv of an event. Return `None` if all `Sender`s have been dropped.
    pub async fn recv(&self) -> Option<EventType> {
        self.0.recv().await.ok()
    }

    /// Tries to receive an event without blocking.
    pub fn try_recv(&self) -> Option<EventType> {
        self.0.try_recv().ok()
    }
}

/// Event emitted by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    /// The library-user may write an informational string to the log.
    ///
    /// This event should *not* be reported to the end-user using a popup or something like
    /// that.
    Info(String),

    /// The library-user should write a warning string to the log.
    Warning(String),

    /// The library-user should report an error to the end-user.
    Error(String),

    /// The stored current location of an employee changed after an ingested
    /// chat event.
    LocationChanged {
        /// Document id of the employee whose location changed.
        employee_id: String,
    },

    /// A live-sharing session was finalized by the sweeper, either because
    /// its live period ran out or because updates stopped arriving.
    LiveSessionEnded {
        /// Document id of the employee whose session ended.
        employee_id: String,
    },

    /// An automatic clock-out was written to an attendance document.
    AutoClockOut {
        /// Employee uid the clock-out was recorded against.
        uid: String,
        /// Human-readable reason, as sent to the employee.
        reason: String,
    },

    /// A monitor tick finished.
    MonitorTickDone {
        /// Number of clocked-in employees examined.
        checked: usize,
        /// Number of auto-clock-outs written during the tick.
        clocked_out: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ring_drops_oldest() {
        let events = Events::new();
        for i in 0..1_100 {
            events.emit(EventType::Info(format!("event {i}")));
        }
        let emitter = events.get_emitter();
        // The first hundred events were dropped to make room.
        assert_eq!(
            emitter.try_recv(),
            Some(EventType::Info("event 100".to_string()))
        );
    }
}
