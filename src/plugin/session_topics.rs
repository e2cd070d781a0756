//! Session Topics plugin.
//!
//! Gives every connection a generated session id, sends it as the
//! `session-id` header on connect and send, and subscribes each logical
//! topic three times: broadcast, session broadcast and session-private.

use tracing::debug;

use super::session::SessionStore;
use super::{PluginCapability, ProtocolPlugin};
use crate::protocol::{SendRequest, StompConnection, WireSubscription};

pub const SESSION_TOPICS_ID: &str = "session-topics";
pub const SESSION_HEADER: &str = "session-id";

const NAME: &str = "Session Topics";
const TOPIC_PREFIX: &str = "/topic/";

const CAPABILITIES: &[PluginCapability] = &[
    PluginCapability::PreConnect,
    PluginCapability::PreSubscribe,
    PluginCapability::PreSend,
    PluginCapability::Disconnect,
];

type SessionIdFactory = Box<dyn Fn() -> String>;

pub struct SessionTopicPlugin {
    sessions: SessionStore<String>,
    new_session_id: SessionIdFactory,
}

impl SessionTopicPlugin {
    /// Plugin generating simple-form v4 UUIDs as session ids.
    pub fn new() -> Self {
        Self::with_session_ids(|| uuid::Uuid::new_v4().simple().to_string())
    }

    /// Plugin drawing session ids from `factory`.
    pub fn with_session_ids(factory: impl Fn() -> String + 'static) -> Self {
        Self {
            sessions: SessionStore::new(),
            new_session_id: Box::new(factory),
        }
    }

    /// Session id of `connection_id`, generated on first use.
    pub fn session_id(&mut self, connection_id: &str) -> String {
        let factory = &self.new_session_id;
        let session = self.sessions.get_or_create(connection_id, || {
            let id = factory();
            debug!(connection_id, session_id = %id, "session created");
            id
        });
        session.clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionTopicPlugin {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire subscriptions for `topic` under `session_id`.
///
/// A topic given as `/topic/<t>` is treated as `<t>`.
pub fn expand_topic(subscription_id: &str, topic: &str, session_id: &str) -> Vec<WireSubscription> {
    let topic = topic.strip_prefix(TOPIC_PREFIX).unwrap_or(topic);

    vec![
        WireSubscription {
            id: format!("{}-broadcast", subscription_id),
            topic: format!("{}{}/broadcast/", TOPIC_PREFIX, topic),
        },
        WireSubscription {
            id: format!("{}-session-broadcast", subscription_id),
            topic: format!("{}{}/{}/broadcast/", TOPIC_PREFIX, topic, session_id),
        },
        WireSubscription {
            id: format!("{}-session", subscription_id),
            topic: format!("{}{}/{}", TOPIC_PREFIX, topic, session_id),
        },
    ]
}

impl ProtocolPlugin for SessionTopicPlugin {
    fn id(&self) -> &str {
        SESSION_TOPICS_ID
    }

    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> &[PluginCapability] {
        CAPABILITIES
    }

    fn on_pre_connect(&mut self, mut connection: StompConnection) -> StompConnection {
        let session_id = self.session_id(&connection.id);
        connection
            .headers
            .insert(SESSION_HEADER.to_string(), session_id);
        connection
    }

    fn on_pre_subscribe(
        &mut self,
        connection_id: &str,
        subscription_id: &str,
        topic: &str,
    ) -> Vec<WireSubscription> {
        let session_id = self.session_id(connection_id);
        expand_topic(subscription_id, topic, &session_id)
    }

    fn on_pre_send(&mut self, connection_id: &str, mut request: SendRequest) -> SendRequest {
        let session_id = self.session_id(connection_id);
        request
            .headers
            .insert(SESSION_HEADER.to_string(), session_id);
        request
    }

    fn on_disconnect(&mut self, connection_id: &str) {
        if self.sessions.remove(connection_id).is_some() {
            debug!(connection_id, "session dropped");
        }
    }
}
