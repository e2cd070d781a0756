//! Test helpers for integration tests.
//!
//! Provides an engine wired to a notification receiver plus builders for
//! the protocol values the transport layer would hand over.

#![allow(dead_code)]

use std::time::Duration;

use serde_json::Value;

use chrollo::{
    notification_channel, ApiOptions, ConnectionType, Notification, NotificationReceiver,
    Notifier, ResourceLimits, ScriptEngine, SendRequest, SocketMessage,
};

/// Engine plus the receiving end of its notification channel.
pub struct TestEngine {
    pub engine: ScriptEngine,
    pub notifications: NotificationReceiver,
}

impl TestEngine {
    /// Engine with default limits and the test API enabled.
    pub fn new() -> Self {
        Self::with_limits(ResourceLimits::default())
    }

    pub fn with_limits(limits: ResourceLimits) -> Self {
        let (tx, rx) = notification_channel();
        let options = ApiOptions {
            test_api: true,
            ..ApiOptions::default()
        };
        let engine = ScriptEngine::with_options(limits, options, Notifier::new(tx))
            .expect("engine should build");
        Self {
            engine,
            notifications: rx,
        }
    }

    /// Load `code`, panicking with the script error on failure.
    pub fn load(&mut self, code: &str) {
        if !self.engine.load_script(code) {
            panic!("script failed: {:?}", self.engine.script_error());
        }
    }

    /// Console messages received so far.
    pub fn console(&self) -> Vec<String> {
        self.notifications
            .drain()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Console { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Channel names of all notifications received so far.
    pub fn channels(&self) -> Vec<&'static str> {
        self.notifications
            .drain()
            .iter()
            .map(Notification::channel)
            .collect()
    }
}

/// Limits with a short time budget.
pub fn short_limits(millis: u64) -> ResourceLimits {
    ResourceLimits {
        max_execution: Duration::from_millis(millis),
        ..ResourceLimits::default()
    }
}

pub fn send_request(id: &str, destination: &str, body: &str) -> SendRequest {
    SendRequest::new(id, destination, body)
}

pub fn stomp_message(connection_id: &str, data: Value) -> SocketMessage {
    SocketMessage::new(connection_id, ConnectionType::Stomp, "MESSAGE", data)
}
