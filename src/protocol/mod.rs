//! STOMP lifecycle types exchanged with the transport layer.
//!
//! The engine never speaks the wire protocol. These are the values the
//! transport hands to hooks and plugins at each phase, and the values it
//! gets back. Field names are camelCase because scripts see them verbatim.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Header map carried by connect, subscribe and send frames.
pub type Headers = BTreeMap<String, String>;

/// Current time as Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A connection about to be opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StompConnection {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub headers: Headers,
}

impl StompConnection {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            url: url.into(),
            headers: Headers::new(),
        }
    }
}

/// A subscription about to be sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeContext {
    pub connection_id: String,
    pub subscription_id: String,
    pub topic: String,
    #[serde(default)]
    pub headers: Headers,
}

impl SubscribeContext {
    pub fn new(
        connection_id: impl Into<String>,
        subscription_id: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            subscription_id: subscription_id.into(),
            topic: topic.into(),
            headers: Headers::new(),
        }
    }
}

/// A subscription that was just removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeContext {
    pub connection_id: String,
    pub subscription_id: String,
    pub topic: String,
}

/// An outgoing SEND frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub id: String,
    pub destination: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: String,
}

impl SendRequest {
    pub fn new(
        id: impl Into<String>,
        destination: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            destination: destination.into(),
            headers: Headers::new(),
            body: body.into(),
        }
    }
}

/// The table handed to pre-send hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendContext {
    pub connection_id: String,
    pub request: SendRequest,
}

/// Kind of connection a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Stomp,
    Websocket,
}

/// An inbound message. Read-only once built by the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketMessage {
    pub connection_id: String,
    pub connection_type: ConnectionType,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: i64,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl SocketMessage {
    /// Build a message stamped with the current time.
    pub fn new(
        connection_id: impl Into<String>,
        connection_type: ConnectionType,
        kind: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            connection_type,
            kind: kind.into(),
            timestamp: now_millis(),
            data,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// One wire-level subscription produced by subscription fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSubscription {
    pub id: String,
    pub topic: String,
}
