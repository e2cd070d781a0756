//! Per-phase registries of script hook handlers.
//!
//! Registration is append-only for the lifetime of a runtime; invocation
//! order is registration order. There is no dedup, no priority and no
//! unregister. A fresh runtime is the only way to drop handlers.

use std::fmt;

use mlua::Function;

/// Protocol lifecycle phase a handler is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    PreConnect,
    PreSubscribe,
    PostUnsubscribe,
    PreSend,
    OnMessage,
}

impl HookPhase {
    pub const ALL: [HookPhase; 5] = [
        HookPhase::PreConnect,
        HookPhase::PreSubscribe,
        HookPhase::PostUnsubscribe,
        HookPhase::PreSend,
        HookPhase::OnMessage,
    ];

    /// Name of the `chrollo.stomp` registration function for this phase.
    pub fn api_name(&self) -> &'static str {
        match self {
            HookPhase::PreConnect => "onPreConnect",
            HookPhase::PreSubscribe => "onPreSubscribe",
            HookPhase::PostUnsubscribe => "onPostUnsubscribe",
            HookPhase::PreSend => "onPreSend",
            HookPhase::OnMessage => "onMessage",
        }
    }

    fn index(&self) -> usize {
        match self {
            HookPhase::PreConnect => 0,
            HookPhase::PreSubscribe => 1,
            HookPhase::PostUnsubscribe => 2,
            HookPhase::PreSend => 3,
            HookPhase::OnMessage => 4,
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookPhase::PreConnect => "pre-connect",
            HookPhase::PreSubscribe => "pre-subscribe",
            HookPhase::PostUnsubscribe => "post-unsubscribe",
            HookPhase::PreSend => "pre-send",
            HookPhase::OnMessage => "on-message",
        };
        f.write_str(name)
    }
}

/// Five ordered handler lists, one per phase.
#[derive(Debug, Default)]
pub struct HookRegistries {
    handlers: [Vec<Function>; 5],
}

impl HookRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, phase: HookPhase, handler: Function) {
        self.handlers[phase.index()].push(handler);
    }

    /// Snapshot of the handlers for `phase`, in registration order.
    ///
    /// Callers iterate the snapshot so a handler may register more
    /// handlers while the phase runs; those take effect next time.
    pub fn handlers(&self, phase: HookPhase) -> Vec<Function> {
        self.handlers[phase.index()].clone()
    }

    pub fn count(&self, phase: HookPhase) -> usize {
        self.handlers[phase.index()].len()
    }

    pub fn len(&self) -> usize {
        self.handlers.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
