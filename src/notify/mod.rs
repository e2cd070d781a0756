//! Notifications surfaced toward the UI layer.
//!
//! The engine never writes to a local stream. Console output from scripts
//! and correlation events are pushed into a [`NotificationSink`] supplied by
//! the transport layer. A channel-backed sink is provided for hosts that
//! drain notifications on their own loop.

use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use serde::Serialize;

use crate::protocol::{SendRequest, SocketMessage};

/// Console level used by the `console` shim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
}

impl ConsoleLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Error => "error",
        }
    }
}

/// Messages sent from the engine to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "channel", rename_all = "camelCase")]
pub enum Notification {
    /// Console output from a script, or a script/hook failure.
    #[serde(rename = "console")]
    Console { level: ConsoleLevel, message: String },

    /// A pre-send hook assigned a correlation key.
    #[serde(rename = "stomp:request-pending", rename_all = "camelCase")]
    RequestPending {
        request_key: String,
        request_id: String,
        connection_id: String,
        request: SendRequest,
        timestamp: i64,
    },

    /// A message hook resolved a pending correlation key.
    #[serde(rename = "stomp:request-resolved", rename_all = "camelCase")]
    RequestResolved {
        request_key: String,
        response: SocketMessage,
        timestamp: i64,
    },
}

impl Notification {
    /// Wire channel name for this notification.
    pub fn channel(&self) -> &'static str {
        match self {
            Notification::Console { level, .. } => match level {
                ConsoleLevel::Log => "console:log",
                ConsoleLevel::Info => "console:info",
                ConsoleLevel::Warn => "console:warn",
                ConsoleLevel::Error => "console:error",
            },
            Notification::RequestPending { .. } => "stomp:request-pending",
            Notification::RequestResolved { .. } => "stomp:request-resolved",
        }
    }

    pub(crate) fn console(level: ConsoleLevel, message: impl Into<String>) -> Self {
        Notification::Console {
            level,
            message: message.into(),
        }
    }
}

/// Destination for engine notifications, implemented by the transport layer.
pub trait NotificationSink {
    fn notify(&self, notification: Notification);
}

/// Shared handle to a sink, cloned into every runtime component that emits.
#[derive(Clone)]
pub struct Notifier(Rc<dyn NotificationSink>);

impl Notifier {
    pub fn new<S: NotificationSink + 'static>(sink: S) -> Self {
        Self(Rc::new(sink))
    }

    /// A notifier that discards everything.
    pub fn discard() -> Self {
        Self::new(DiscardSink)
    }

    pub fn notify(&self, notification: Notification) {
        self.0.notify(notification);
    }

    pub(crate) fn console(&self, level: ConsoleLevel, message: impl Into<String>) {
        self.notify(Notification::console(level, message));
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Notifier")
    }
}

struct DiscardSink;

impl NotificationSink for DiscardSink {
    fn notify(&self, _notification: Notification) {}
}

/// Sending half of a notification channel.
#[derive(Clone)]
pub struct NotificationSender {
    tx: Sender<Notification>,
}

impl NotificationSink for NotificationSender {
    fn notify(&self, notification: Notification) {
        // A dropped receiver means nobody is listening anymore.
        let _ = self.tx.send(notification);
    }
}

/// Receiving half of a notification channel, held by the UI bridge.
pub struct NotificationReceiver {
    rx: Receiver<Notification>,
}

impl NotificationReceiver {
    /// Receive a notification, blocking until one is available.
    pub fn recv(&self) -> Option<Notification> {
        self.rx.recv().ok()
    }

    /// Try to receive a notification without blocking.
    pub fn try_recv(&self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }

    /// Receive a notification with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Notification> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Take every notification queued so far.
    pub fn drain(&self) -> Vec<Notification> {
        self.rx.try_iter().collect()
    }
}

/// Create a connected sender/receiver pair.
pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    let (tx, rx) = mpsc::channel();
    (NotificationSender { tx }, NotificationReceiver { rx })
}
