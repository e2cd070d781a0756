//! Script engine: loads user scripts and dispatches STOMP lifecycle hooks.

use std::rc::Rc;

use mlua::{Function, LuaSerdeExt, Table, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::api::{ApiOptions, ApiSurface};
use super::runtime::RuntimeState;
use super::sandbox::{ResourceLimits, Sandbox};
use super::types::{Script, TestResult};
use crate::correlation::TrackedRequest;
use crate::hooks::HookPhase;
use crate::notify::{ConsoleLevel, Notifier};
use crate::protocol::{
    SendContext, SendRequest, SocketMessage, StompConnection, SubscribeContext, UnsubscribeContext,
};
use crate::variables::{self, VariableStore};
use crate::{ChrolloError, Result};

/// Externally visible engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing loaded since the last reset.
    Idle,
    /// Scripts loaded without error.
    Loaded { scripts: usize },
    /// The last load failed; see [`ScriptEngine::script_error`].
    Error,
}

/// Result of the pre-send phase.
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    /// The request after all pre-send hooks ran.
    pub request: SendRequest,
    /// Correlation key a hook assigned, if any.
    pub request_key: Option<String>,
}

/// One VM with its runtime state and the API surface bound to it.
struct Instance {
    sandbox: Sandbox,
    runtime: Rc<RuntimeState>,
    api: ApiSurface,
}

impl Instance {
    fn build(limits: &ResourceLimits, options: &ApiOptions, notifier: &Notifier) -> Result<Self> {
        let sandbox = Sandbox::with_limits(limits.clone())?;
        let runtime = Rc::new(RuntimeState::new(notifier.clone()));
        let api = ApiSurface::build(sandbox.lua(), &runtime, options)
            .map_err(|e| ChrolloError::Script(format!("Failed to build API surface: {}", e)))?;

        Ok(Self {
            sandbox,
            runtime,
            api,
        })
    }
}

/// Sandboxed script engine.
///
/// Owns one Lua VM per generation. [`ScriptEngine::reset`] replaces the
/// whole generation, so hooks, variables and correlation state never leak
/// between unrelated script sets.
pub struct ScriptEngine {
    instance: Instance,
    limits: ResourceLimits,
    options: ApiOptions,
    notifier: Notifier,
    loaded: usize,
    last_error: Option<String>,
}

impl ScriptEngine {
    /// Create an engine with default limits and options.
    pub fn new(notifier: Notifier) -> Result<Self> {
        Self::with_options(ResourceLimits::default(), ApiOptions::default(), notifier)
    }

    /// Create an engine with custom limits and API options.
    pub fn with_options(
        limits: ResourceLimits,
        options: ApiOptions,
        notifier: Notifier,
    ) -> Result<Self> {
        let instance = Instance::build(&limits, &options, &notifier)?;
        info!(
            timeout_ms = limits.max_execution.as_millis() as u64,
            test_api = options.test_api,
            "script engine created"
        );

        Ok(Self {
            instance,
            limits,
            options,
            notifier,
            loaded: 0,
            last_error: None,
        })
    }

    /// Tear the engine down. Pending correlation state is dropped.
    pub fn dispose(self) {
        info!(scripts = self.loaded, "script engine disposed");
    }

    /// Discard hooks, variables, correlation state and test results.
    ///
    /// The replacement generation is built before the old one is dropped;
    /// if building fails the engine is left untouched.
    pub fn reset(&mut self) -> Result<()> {
        let instance = Instance::build(&self.limits, &self.options, &self.notifier)?;
        self.instance = instance;
        self.loaded = 0;
        self.last_error = None;
        info!("script engine reset");
        Ok(())
    }

    /// Execute `code` against the current API surface.
    ///
    /// Never fails: an error is recorded, logged and forwarded to the
    /// console channel. Returns whether the script ran to completion.
    pub fn load_script(&mut self, code: &str) -> bool {
        self.load_named("script", code)
    }

    /// Like [`ScriptEngine::load_script`], with `name` used in error locations.
    pub fn load_named(&mut self, name: &str, code: &str) -> bool {
        self.last_error = None;

        let result = self
            .instance
            .sandbox
            .environment(&self.instance.api.capabilities())
            .and_then(|env| self.instance.sandbox.execute(name, code, env));

        match result {
            Ok(()) => {
                self.loaded += 1;
                debug!(script = name, hooks = self.instance.runtime.hooks().len(), "script loaded");
                true
            }
            Err(e) => {
                let message = error_message(&e);
                warn!(script = name, error = %message, "script failed to load");
                self.notifier
                    .console(ConsoleLevel::Error, format!("[SCRIPT ERROR] {}", message));
                self.last_error = Some(message);
                false
            }
        }
    }

    /// Reset, then load every entry in order.
    ///
    /// Hooks accumulate across the batch. The first failure stays available
    /// through [`ScriptEngine::script_error`]; later scripts still load.
    pub fn reload_scripts<S: AsRef<str>>(&mut self, codes: &[S]) -> Result<()> {
        self.reset()?;

        let mut first_error = None;
        for (index, code) in codes.iter().enumerate() {
            let name = format!("script[{}]", index);
            if !self.load_named(&name, code.as_ref()) && first_error.is_none() {
                first_error = self.last_error.clone();
            }
        }
        self.last_error = first_error;

        info!(loaded = self.loaded, total = codes.len(), "scripts reloaded");
        Ok(())
    }

    /// Reset, then load the enabled scripts in order.
    pub fn sync_scripts(&mut self, scripts: &[Script]) -> Result<()> {
        self.reset()?;

        let mut first_error = None;
        let mut enabled = 0;
        for script in scripts.iter().filter(|s| s.enabled) {
            enabled += 1;
            if !self.load_named(&script.id, &script.code) && first_error.is_none() {
                first_error = self.last_error.clone();
            }
        }
        self.last_error = first_error;

        info!(
            loaded = self.loaded,
            enabled,
            skipped = scripts.len() - enabled,
            "scripts synced"
        );
        Ok(())
    }

    /// The last captured script error.
    pub fn script_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Engine state as of the last load or reset.
    pub fn state(&self) -> EngineState {
        if self.last_error.is_some() {
            EngineState::Error
        } else if self.loaded > 0 {
            EngineState::Loaded {
                scripts: self.loaded,
            }
        } else {
            EngineState::Idle
        }
    }

    /// Number of handlers registered for `phase`.
    pub fn hook_count(&self, phase: HookPhase) -> usize {
        self.instance.runtime.hooks().count(phase)
    }

    // ---------------------------------------------------------------------
    // Hook dispatch
    // ---------------------------------------------------------------------

    /// Run pre-connect hooks. Handlers may edit `headers`.
    pub fn pre_connect(&self, connection: StompConnection) -> StompConnection {
        self.run_transform(HookPhase::PreConnect, connection)
    }

    /// Run pre-subscribe hooks. Handlers may edit `topic` and `headers`.
    pub fn pre_subscribe(&self, context: SubscribeContext) -> SubscribeContext {
        self.run_transform(HookPhase::PreSubscribe, context)
    }

    /// Run post-unsubscribe hooks. Changes to the context are discarded.
    pub fn post_unsubscribe(&self, context: &UnsubscribeContext) {
        self.run_observe(HookPhase::PostUnsubscribe, context);
    }

    /// Run pre-send hooks inside a send context.
    ///
    /// A handler may call `chrollo.request.setRequestKey`; the key assigned
    /// (the first one wins) comes back in the outcome.
    pub fn pre_send(&self, connection_id: &str, request: SendRequest) -> SendOutcome {
        self.instance
            .runtime
            .tracker_mut()
            .begin_send_context(connection_id, &request);

        let context = SendContext {
            connection_id: connection_id.to_string(),
            request,
        };
        let context = self.run_transform(HookPhase::PreSend, context);

        let request_key = self.instance.runtime.tracker_mut().end_send_context();
        SendOutcome {
            request: context.request,
            request_key,
        }
    }

    /// Run message hooks inside a message context.
    pub fn on_message(&self, message: &SocketMessage) {
        self.instance
            .runtime
            .tracker_mut()
            .begin_message_context(message);
        self.run_observe(HookPhase::OnMessage, message);
        self.instance.runtime.tracker_mut().end_message_context();
    }

    fn run_transform<T>(&self, phase: HookPhase, value: T) -> T
    where
        T: Serialize + DeserializeOwned,
    {
        let handlers = self.instance.runtime.hooks().handlers(phase);
        if handlers.is_empty() {
            return value;
        }

        let lua = self.instance.sandbox.lua();
        let context = match lua.to_value(&value) {
            Ok(Value::Table(table)) => table,
            Ok(_) => {
                warn!(%phase, "context did not serialize to a table; skipping hooks");
                return value;
            }
            Err(e) => {
                warn!(%phase, error = %e, "failed to convert context; skipping hooks");
                return value;
            }
        };

        self.invoke_all(phase, &handlers, &context);

        match lua.from_value::<T>(Value::Table(context)) {
            Ok(updated) => updated,
            Err(e) => {
                warn!(%phase, error = %e, "hook left the context in an invalid shape; keeping original");
                value
            }
        }
    }

    fn run_observe<T: Serialize>(&self, phase: HookPhase, value: &T) {
        let handlers = self.instance.runtime.hooks().handlers(phase);
        if handlers.is_empty() {
            return;
        }

        match self.instance.sandbox.lua().to_value(value) {
            Ok(Value::Table(context)) => self.invoke_all(phase, &handlers, &context),
            Ok(_) => warn!(%phase, "context did not serialize to a table; skipping hooks"),
            Err(e) => warn!(%phase, error = %e, "failed to convert context; skipping hooks"),
        }
    }

    /// Call every handler with `context`. A failing handler does not stop
    /// the ones after it.
    fn invoke_all(&self, phase: HookPhase, handlers: &[Function], context: &Table) {
        debug!(%phase, handlers = handlers.len(), "dispatching hooks");

        for (index, handler) in handlers.iter().enumerate() {
            if let Err(e) = self.instance.sandbox.call::<()>(handler, context.clone()) {
                let message = error_message(&e);
                warn!(%phase, index, error = %message, "hook failed");
                self.notifier.console(
                    ConsoleLevel::Error,
                    format!("[HOOK ERROR] {}: {}", phase, message),
                );
            }
        }
    }

    // ---------------------------------------------------------------------
    // Correlation
    // ---------------------------------------------------------------------

    /// Cancel a pending request. Only the tracked record changes.
    pub fn cancel_request(&self, request_key: &str) -> bool {
        self.instance.runtime.tracker_mut().cancel(request_key)
    }

    /// Snapshot of the record tracked under `request_key`.
    pub fn tracked_request(&self, request_key: &str) -> Option<TrackedRequest> {
        self.instance.runtime.tracker().get(request_key).cloned()
    }

    /// All tracked requests, oldest first.
    pub fn tracked_requests(&self) -> Vec<TrackedRequest> {
        self.instance
            .runtime
            .tracker()
            .all()
            .into_iter()
            .cloned()
            .collect()
    }

    // ---------------------------------------------------------------------
    // Variables
    // ---------------------------------------------------------------------

    /// Run `f` with mutable access to the variable store.
    pub fn with_variables<R>(&self, f: impl FnOnce(&mut VariableStore) -> R) -> R {
        f(&mut self.instance.runtime.variables_mut())
    }

    /// Replace `{{name}}` tokens in `input`.
    pub fn resolve(&self, input: &str) -> String {
        variables::resolve(&self.instance.runtime.variables(), input)
    }

    /// Replace tokens, then pretty-print if the result is JSON.
    pub fn resolve_json(&self, input: &str) -> String {
        variables::resolve_json(&self.instance.runtime.variables(), input)
    }

    // ---------------------------------------------------------------------
    // Test results
    // ---------------------------------------------------------------------

    /// Results recorded by `chrollo.test.test`, in call order.
    pub fn test_results(&self) -> Vec<TestResult> {
        self.instance.runtime.test_results()
    }

    pub fn clear_test_results(&self) {
        self.instance.runtime.clear_test_results();
    }
}

/// Message shown to script authors for an engine error.
fn error_message(e: &ChrolloError) -> String {
    match e {
        ChrolloError::Script(message) => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::RequestStatus;
    use crate::notify::{notification_channel, Notification, NotificationReceiver};
    use crate::protocol::ConnectionType;
    use crate::variables::Scope;
    use serde_json::json;
    use std::time::Duration;

    fn engine() -> (ScriptEngine, NotificationReceiver) {
        let (tx, rx) = notification_channel();
        (ScriptEngine::new(Notifier::new(tx)).unwrap(), rx)
    }

    fn message(data: serde_json::Value) -> SocketMessage {
        SocketMessage::new("conn-1", ConnectionType::Stomp, "MESSAGE", data)
    }

    fn console_messages(rx: &NotificationReceiver) -> Vec<String> {
        rx.drain()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Console { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_new_engine_is_idle() {
        let (engine, _rx) = engine();
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.script_error().is_none());
    }

    #[test]
    fn test_load_script_registers_hooks() {
        let (mut engine, _rx) = engine();
        assert!(engine.load_script("chrollo.stomp.onMessage(function(ctx) end)"));
        assert_eq!(engine.hook_count(HookPhase::OnMessage), 1);
        assert_eq!(engine.state(), EngineState::Loaded { scripts: 1 });
    }

    #[test]
    fn test_load_error_is_recorded_and_forwarded() {
        let (mut engine, rx) = engine();
        assert!(!engine.load_script("error('bad script')"));

        assert!(engine.script_error().unwrap().contains("bad script"));
        assert_eq!(engine.state(), EngineState::Error);

        let messages = console_messages(&rx);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("[SCRIPT ERROR] "));
        assert!(messages[0].contains("bad script"));
    }

    #[test]
    fn test_successful_load_clears_last_error() {
        let (mut engine, _rx) = engine();
        engine.load_script("this is not lua");
        assert!(engine.script_error().is_some());

        engine.load_script("x = 1");
        assert!(engine.script_error().is_none());
    }

    #[test]
    fn test_load_timeout() {
        let (tx, rx) = notification_channel();
        let limits = ResourceLimits {
            max_execution: Duration::from_millis(50),
            max_memory: 0,
        };
        let mut engine =
            ScriptEngine::with_options(limits, ApiOptions::default(), Notifier::new(tx)).unwrap();

        assert!(!engine.load_script("while true do end"));
        assert!(engine.script_error().unwrap().contains("timed out"));
        assert!(console_messages(&rx)[0].contains("timed out"));
    }

    #[test]
    fn test_hostile_helper_arguments_are_script_errors() {
        let (tx, rx) = notification_channel();
        let limits = ResourceLimits {
            max_execution: Duration::from_millis(200),
            max_memory: 0,
        };
        let mut engine =
            ScriptEngine::with_options(limits, ApiOptions::default(), Notifier::new(tx)).unwrap();

        for code in [
            "local x = chrollo.utils.randomId(2^53)",
            "local x = chrollo.utils.randomId(9223372036854775807)",
            "local x = chrollo.faker.float(0/0, 1)",
            "local x = chrollo.faker.float(0, math.huge)",
            "local x = chrollo.faker.words(9223372036854775807)",
            "local x = chrollo.faker.alphanumeric(2^53)",
            r#"string.find(string.rep("a", 40), string.rep("a*", 40) .. "b")"#,
        ] {
            assert!(!engine.load_script(code), "{}", code);
            assert_eq!(engine.state(), EngineState::Error);
        }
        let messages = console_messages(&rx);
        assert_eq!(messages.len(), 7);
        assert!(messages.iter().all(|m| m.starts_with("[SCRIPT ERROR] ")));

        assert!(engine.load_script("id = chrollo.utils.randomId(0) .. chrollo.faker.words(2)"));
        assert!(engine.script_error().is_none());
    }

    #[test]
    fn test_reload_accumulates_hooks_and_keeps_first_error() {
        let (mut engine, _rx) = engine();
        engine.load_script("chrollo.stomp.onPreSend(function(ctx) end)");

        engine
            .reload_scripts(&[
                "chrollo.stomp.onMessage(function(ctx) end)",
                "error('first')",
                "chrollo.stomp.onMessage(function(ctx) end)",
                "error('second')",
            ])
            .unwrap();

        assert_eq!(engine.hook_count(HookPhase::PreSend), 0);
        assert_eq!(engine.hook_count(HookPhase::OnMessage), 2);
        assert!(engine.script_error().unwrap().contains("first"));
    }

    #[test]
    fn test_reset_clears_hooks() {
        let (mut engine, rx) = engine();
        engine.load_script(r#"chrollo.stomp.onMessage(function(ctx) console.log("seen") end)"#);
        engine.on_message(&message(json!({})));
        assert_eq!(console_messages(&rx), vec!["seen"]);

        engine.reset().unwrap();
        engine.on_message(&message(json!({})));
        assert!(console_messages(&rx).is_empty());
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_reset_clears_variables_and_tracking() {
        let (mut engine, _rx) = engine();
        engine.load_script(
            r#"
            chrollo.variables.globals.set("token", "abc")
            chrollo.stomp.onPreSend(function(ctx) chrollo.request.setRequestKey("k1") end)
        "#,
        );
        engine.pre_send("conn-1", SendRequest::new("r1", "/app", ""));
        assert_eq!(engine.tracked_requests().len(), 1);

        engine.reset().unwrap();
        assert!(engine.tracked_requests().is_empty());
        assert_eq!(engine.resolve("{{token}}"), "token");
    }

    #[test]
    fn test_sync_scripts_skips_disabled() {
        let (mut engine, _rx) = engine();
        let scripts = vec![
            Script::new("a", "chrollo.stomp.onMessage(function(ctx) end)"),
            Script::new("b", "chrollo.stomp.onMessage(function(ctx) end)").disabled(),
        ];
        engine.sync_scripts(&scripts).unwrap();

        assert_eq!(engine.hook_count(HookPhase::OnMessage), 1);
        assert_eq!(engine.state(), EngineState::Loaded { scripts: 1 });
    }

    #[test]
    fn test_sync_error_names_script() {
        let (mut engine, _rx) = engine();
        engine
            .sync_scripts(&[Script::new("orders/broken", "error('nope')")])
            .unwrap();
        assert!(engine.script_error().unwrap().contains("orders/broken"));
    }

    #[test]
    fn test_pre_connect_adds_header() {
        let (mut engine, _rx) = engine();
        engine.load_script(
            r#"
            chrollo.stomp.onPreConnect(function(ctx)
                ctx.headers["x-token"] = "secret"
            end)
        "#,
        );

        let connection = engine.pre_connect(StompConnection::new("conn-1", "ws://localhost"));
        assert_eq!(connection.headers.get("x-token").map(String::as_str), Some("secret"));
        assert_eq!(connection.url, "ws://localhost");
    }

    #[test]
    fn test_pre_subscribe_rewrites_topic() {
        let (mut engine, _rx) = engine();
        engine.load_script(
            r#"
            chrollo.stomp.onPreSubscribe(function(ctx)
                ctx.topic = ctx.topic .. "/v2"
            end)
        "#,
        );

        let ctx = engine.pre_subscribe(SubscribeContext::new("conn-1", "sub-1", "/topic/prices"));
        assert_eq!(ctx.topic, "/topic/prices/v2");
    }

    #[test]
    fn test_invalid_shape_keeps_original() {
        let (mut engine, _rx) = engine();
        engine.load_script(
            r#"chrollo.stomp.onPreSubscribe(function(ctx) ctx.topic = {1, 2} end)"#,
        );

        let ctx = engine.pre_subscribe(SubscribeContext::new("conn-1", "sub-1", "/topic/a"));
        assert_eq!(ctx.topic, "/topic/a");
    }

    #[test]
    fn test_pre_send_resolves_variables_in_body() {
        let (mut engine, _rx) = engine();
        engine.with_variables(|vars| {
            vars.scope_mut(Scope::Environment)
                .set("user", json!("ada"));
        });
        engine.load_script(
            r#"
            chrollo.stomp.onPreSend(function(ctx)
                ctx.request.headers["x-user"] = chrollo.variables.environment.get("user")
            end)
        "#,
        );

        let outcome = engine.pre_send("conn-1", SendRequest::new("r1", "/app/hello", "{}"));
        assert_eq!(
            outcome.request.headers.get("x-user").map(String::as_str),
            Some("ada")
        );
        assert!(outcome.request_key.is_none());
    }

    #[test]
    fn test_correlation_round_trip() {
        let (mut engine, rx) = engine();
        engine.load_script(
            r#"
            chrollo.stomp.onPreSend(function(ctx)
                chrollo.request.setRequestKey("order-" .. ctx.request.id)
            end)
            chrollo.stomp.onMessage(function(ctx)
                if ctx.data.orderId then
                    chrollo.request.resolveRequestKey("order-" .. ctx.data.orderId)
                end
            end)
        "#,
        );

        let outcome = engine.pre_send("conn-1", SendRequest::new("42", "/app/orders", "{}"));
        assert_eq!(outcome.request_key.as_deref(), Some("order-42"));
        let record = engine.tracked_request("order-42").unwrap();
        assert_eq!(record.status, RequestStatus::Pending);

        let reply = message(json!({"orderId": "42"}));
        engine.on_message(&reply);

        let record = engine.tracked_request("order-42").unwrap();
        assert_eq!(record.status, RequestStatus::Resolved);
        assert_eq!(record.response.as_ref(), Some(&reply));

        let events = rx.drain();
        let channels: Vec<&str> = events.iter().map(|n| n.channel()).collect();
        assert_eq!(channels, vec!["stomp:request-pending", "stomp:request-resolved"]);
    }

    #[test]
    fn test_first_request_key_wins() {
        let (mut engine, _rx) = engine();
        engine.load_script(
            r#"
            chrollo.stomp.onPreSend(function(ctx) chrollo.request.setRequestKey("a") end)
            chrollo.stomp.onPreSend(function(ctx) chrollo.request.setRequestKey("b") end)
        "#,
        );

        let outcome = engine.pre_send("conn-1", SendRequest::new("1", "/app", ""));
        assert_eq!(outcome.request_key.as_deref(), Some("a"));
        assert!(engine.tracked_request("b").is_none());
    }

    #[test]
    fn test_set_request_key_at_load_time_is_noop() {
        let (mut engine, _rx) = engine();
        assert!(engine.load_script(r#"chrollo.request.setRequestKey("early")"#));
        assert!(engine.tracked_requests().is_empty());
    }

    #[test]
    fn test_cancel_request() {
        let (mut engine, _rx) = engine();
        engine.load_script(
            r#"chrollo.stomp.onPreSend(function(ctx) chrollo.request.setRequestKey("k") end)"#,
        );
        engine.pre_send("conn-1", SendRequest::new("1", "/app", ""));

        assert!(engine.cancel_request("k"));
        assert!(!engine.cancel_request("k"));
        assert!(!engine.cancel_request("missing"));
        assert_eq!(
            engine.tracked_request("k").unwrap().status,
            RequestStatus::Canceled
        );
    }

    #[test]
    fn test_failing_hook_does_not_stop_siblings() {
        let (mut engine, rx) = engine();
        engine.load_script(
            r#"
            chrollo.stomp.onMessage(function(ctx) error("first handler broke") end)
            chrollo.stomp.onMessage(function(ctx) console.log("second ran") end)
        "#,
        );

        engine.on_message(&message(json!(null)));

        let messages = console_messages(&rx);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("[HOOK ERROR] on-message: "));
        assert!(messages[0].contains("first handler broke"));
        assert_eq!(messages[1], "second ran");
    }

    #[test]
    fn test_hook_timeout_is_reported() {
        let (tx, rx) = notification_channel();
        let limits = ResourceLimits {
            max_execution: Duration::from_millis(50),
            max_memory: 0,
        };
        let mut engine =
            ScriptEngine::with_options(limits, ApiOptions::default(), Notifier::new(tx)).unwrap();
        engine.load_script(
            r#"
            chrollo.stomp.onMessage(function(ctx) while true do end end)
            chrollo.stomp.onMessage(function(ctx) console.log("after") end)
        "#,
        );

        engine.on_message(&message(json!({})));

        let messages = console_messages(&rx);
        assert!(messages[0].contains("timed out"));
        assert_eq!(messages[1], "after");
    }

    #[test]
    fn test_message_context_is_observe_only() {
        let (mut engine, _rx) = engine();
        engine.load_script(
            r#"chrollo.stomp.onMessage(function(ctx) ctx.data = "changed" end)"#,
        );

        let msg = message(json!({"v": 1}));
        engine.on_message(&msg);
        assert_eq!(msg.data, json!({"v": 1}));
    }

    #[test]
    fn test_post_unsubscribe_sees_context() {
        let (mut engine, _rx) = engine();
        engine.load_script(
            r#"
            chrollo.stomp.onPostUnsubscribe(function(ctx)
                chrollo.variables.globals.set("last", ctx.subscriptionId)
            end)
        "#,
        );

        engine.post_unsubscribe(&UnsubscribeContext {
            connection_id: "conn-1".to_string(),
            subscription_id: "sub-9".to_string(),
            topic: "/topic/a".to_string(),
        });

        assert_eq!(
            engine.with_variables(|vars| vars.scope(Scope::Global).get("last").cloned()),
            Some(json!("sub-9"))
        );
    }

    #[test]
    fn test_resolve_uses_script_variables() {
        let (mut engine, _rx) = engine();
        engine.load_script(
            r#"
            chrollo.variables.globals.set("host", "global")
            chrollo.variables.locals.set("host", "local")
            chrollo.variables.globals.set("cfg", {port = 8080})
        "#,
        );

        assert_eq!(engine.resolve("{{host}}:{{missing}}"), "local:missing");
        assert_eq!(engine.resolve("{{cfg}}"), r#"{"port":8080}"#);
        assert_eq!(
            engine.resolve_json(r#"{"h":"{{host}}"}"#),
            "{\n  \"h\": \"local\"\n}"
        );
    }

    #[test]
    fn test_test_results_round_trip() {
        let (tx, _rx) = notification_channel();
        let options = ApiOptions {
            test_api: true,
            faker: true,
        };
        let mut engine =
            ScriptEngine::with_options(ResourceLimits::default(), options, Notifier::new(tx))
                .unwrap();

        engine.load_script(
            r#"
            chrollo.test.test("ok", function() chrollo.test.expect(1).toBe(1) end)
            chrollo.test.test("bad", function() chrollo.test.expect(1).toBe(2) end)
        "#,
        );

        let results = engine.test_results();
        assert_eq!(results.len(), 2);
        assert!(results[0].passed);
        assert!(!results[1].passed);

        engine.clear_test_results();
        assert!(engine.test_results().is_empty());
    }

    #[test]
    fn test_dispose() {
        let (mut engine, _rx) = engine();
        engine.load_script("x = 1");
        engine.dispose();
    }
}
