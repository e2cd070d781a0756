//! Active protocol plugin selection and dispatch.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::session_topics::{SessionTopicPlugin, SESSION_TOPICS_ID};
use super::{PluginCapability, ProtocolPlugin};
use crate::protocol::{SendRequest, SocketMessage, StompConnection, WireSubscription};
use crate::{ChrolloError, Result};

type PluginFactory = Box<dyn Fn() -> Box<dyn ProtocolPlugin>>;

/// Id and display name of a registered plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
}

struct Registration {
    name: String,
    factory: PluginFactory,
}

/// Registry of plugin factories plus the single active instance.
///
/// With no active plugin every dispatch is a pass-through.
pub struct PluginChain {
    registry: BTreeMap<String, Registration>,
    active: Option<String>,
    instance: Option<Box<dyn ProtocolPlugin>>,
}

impl PluginChain {
    /// Empty chain with nothing registered.
    pub fn new() -> Self {
        Self {
            registry: BTreeMap::new(),
            active: None,
            instance: None,
        }
    }

    /// Chain with the built-in plugins registered.
    pub fn with_builtins() -> Self {
        let mut chain = Self::new();
        chain.register(SESSION_TOPICS_ID, "Session Topics", || {
            Box::new(SessionTopicPlugin::new())
        });
        chain
    }

    /// Register a factory under `id`, replacing any previous one.
    pub fn register<F>(&mut self, id: &str, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn ProtocolPlugin> + 'static,
    {
        if self.active.as_deref() == Some(id) {
            self.instance = None;
        }
        self.registry.insert(
            id.to_string(),
            Registration {
                name: name.to_string(),
                factory: Box::new(factory),
            },
        );
        debug!(plugin = id, "plugin registered");
    }

    /// Registered plugins in id order.
    pub fn available(&self) -> Vec<PluginInfo> {
        self.registry
            .iter()
            .map(|(id, reg)| PluginInfo {
                id: id.clone(),
                name: reg.name.clone(),
            })
            .collect()
    }

    /// Select the active plugin, or none.
    ///
    /// Selecting the current id keeps the cached instance. Any other change
    /// drops the instance together with its sessions.
    pub fn activate(&mut self, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            if !self.registry.contains_key(id) {
                return Err(ChrolloError::PluginNotFound(id.to_string()));
            }
        }
        if self.active.as_deref() == id {
            return Ok(());
        }

        self.instance = None;
        self.active = id.map(str::to_string);
        info!(plugin = ?self.active, "active protocol plugin changed");
        Ok(())
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// The active instance, created on first use.
    fn plugin(&mut self, capability: PluginCapability) -> Option<&mut Box<dyn ProtocolPlugin>> {
        let id = self.active.as_deref()?;
        if self.instance.is_none() {
            let registration = self.registry.get(id)?;
            let plugin = (registration.factory)();
            if plugin.id() != id {
                warn!(registered = id, reported = plugin.id(), "plugin id mismatch");
            }
            debug!(plugin = id, "plugin instantiated");
            self.instance = Some(plugin);
        }

        self.instance
            .as_mut()
            .filter(|plugin| plugin.has_capability(capability))
    }

    pub fn pre_connect(&mut self, connection: StompConnection) -> StompConnection {
        match self.plugin(PluginCapability::PreConnect) {
            Some(plugin) => plugin.on_pre_connect(connection),
            None => connection,
        }
    }

    /// Wire subscriptions for one logical subscription. Without a plugin
    /// this is the subscription itself.
    pub fn pre_subscribe(
        &mut self,
        connection_id: &str,
        subscription_id: &str,
        topic: &str,
    ) -> Vec<WireSubscription> {
        match self.plugin(PluginCapability::PreSubscribe) {
            Some(plugin) => plugin.on_pre_subscribe(connection_id, subscription_id, topic),
            None => vec![WireSubscription {
                id: subscription_id.to_string(),
                topic: topic.to_string(),
            }],
        }
    }

    pub fn pre_send(&mut self, connection_id: &str, request: SendRequest) -> SendRequest {
        match self.plugin(PluginCapability::PreSend) {
            Some(plugin) => plugin.on_pre_send(connection_id, request),
            None => request,
        }
    }

    pub fn receive_message(&mut self, message: &SocketMessage) {
        if let Some(plugin) = self.plugin(PluginCapability::ReceiveMessage) {
            plugin.on_receive_message(message);
        }
    }

    /// Drop the session of `connection_id` in the active plugin.
    pub fn disconnect(&mut self, connection_id: &str) {
        if self.instance.is_none() {
            return;
        }
        if let Some(plugin) = self.plugin(PluginCapability::Disconnect) {
            plugin.on_disconnect(connection_id);
        }
    }
}

impl Default for PluginChain {
    fn default() -> Self {
        Self::new()
    }
}
