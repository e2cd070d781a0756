//! Protocol plugins.
//!
//! A protocol plugin rewrites connect, subscribe and send frames on the
//! way out. At most one plugin is active at a time; the [`PluginChain`]
//! owns it and creates it on first use.

pub mod chain;
pub mod session;
pub mod session_topics;

pub use chain::{PluginChain, PluginInfo};
pub use session::SessionStore;
pub use session_topics::{SessionTopicPlugin, SESSION_HEADER, SESSION_TOPICS_ID};

use crate::protocol::{SendRequest, SocketMessage, StompConnection, WireSubscription};

/// Hook a plugin declares it implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginCapability {
    PreConnect,
    PreSubscribe,
    PreSend,
    ReceiveMessage,
    Disconnect,
}

/// A protocol plugin.
///
/// The chain only calls a hook listed in [`ProtocolPlugin::capabilities`].
/// The default bodies pass values through unchanged.
pub trait ProtocolPlugin {
    /// Stable identifier used to select the plugin.
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    fn capabilities(&self) -> &[PluginCapability];

    fn has_capability(&self, capability: PluginCapability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Adjust a connection (typically its headers) before it opens.
    fn on_pre_connect(&mut self, connection: StompConnection) -> StompConnection {
        connection
    }

    /// Expand one logical subscription into wire-level subscriptions.
    fn on_pre_subscribe(
        &mut self,
        _connection_id: &str,
        subscription_id: &str,
        topic: &str,
    ) -> Vec<WireSubscription> {
        vec![WireSubscription {
            id: subscription_id.to_string(),
            topic: topic.to_string(),
        }]
    }

    /// Adjust an outgoing request.
    fn on_pre_send(&mut self, _connection_id: &str, request: SendRequest) -> SendRequest {
        request
    }

    /// Observe an inbound message.
    fn on_receive_message(&mut self, _message: &SocketMessage) {}

    /// Forget per-connection state.
    fn on_disconnect(&mut self, _connection_id: &str) {}
}
