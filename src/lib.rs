//! Chrollo - scriptable STOMP interception engine
//!
//! User-authored Lua scripts hook into the STOMP lifecycle (connect,
//! subscribe, unsubscribe, send, message), share variables, and correlate
//! outgoing requests with later inbound messages. Protocol plugins rewrite
//! frames independently of scripts.

pub mod config;
pub mod correlation;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod notify;
pub mod plugin;
pub mod protocol;
pub mod script;
pub mod variables;

pub use config::Config;
pub use correlation::{CorrelationTracker, RequestStatus, TrackedRequest};
pub use error::{ChrolloError, Result};
pub use hooks::{HookPhase, HookRegistries};
pub use notify::{
    notification_channel, ConsoleLevel, Notification, NotificationReceiver, NotificationSender,
    NotificationSink, Notifier,
};
pub use plugin::{PluginCapability, PluginChain, ProtocolPlugin, SessionTopicPlugin};
pub use protocol::{
    ConnectionType, Headers, SendContext, SendRequest, SocketMessage, StompConnection,
    SubscribeContext, UnsubscribeContext, WireSubscription,
};
pub use script::{
    ApiOptions, EngineState, ResourceLimits, Script, ScriptEngine, ScriptLoader, SendOutcome,
    TestResult,
};
pub use variables::{Scope, VariableStore};
