//! Correlation tracker state machine.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, warn};

use crate::notify::{Notification, Notifier};
use crate::protocol::{now_millis, SendRequest, SocketMessage};

/// Resolved or canceled records kept before the oldest are pruned.
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// Lifecycle of a tracked request. `Resolved` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Resolved,
    Canceled,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

/// One outbound request bridged to a later inbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedRequest {
    pub request_key: String,
    pub request_id: String,
    pub connection_id: String,
    pub request: SendRequest,
    pub response: Option<SocketMessage>,
    pub status: RequestStatus,
    pub start_time: i64,
    pub end_time: Option<i64>,
}

/// The send currently running through pre-send hooks.
#[derive(Debug)]
struct SendScope {
    connection_id: String,
    request: SendRequest,
    key: Option<String>,
}

/// Maps correlation keys to tracked requests.
///
/// Only one send context and one message context exist at a time; the
/// transport layer must not interleave phases on the same tracker.
///
/// Pending records are kept until they finish. Finished records are kept
/// up to the history limit; past it the oldest are dropped and only their
/// keys are remembered, so a key is still never reused.
#[derive(Debug)]
pub struct CorrelationTracker {
    notifier: Notifier,
    requests: HashMap<String, TrackedRequest>,
    by_request_id: HashMap<String, String>,
    finished: VecDeque<String>,
    retired: HashSet<String>,
    history_limit: usize,
    send_scope: Option<SendScope>,
    message_scope: Option<SocketMessage>,
}

impl CorrelationTracker {
    pub fn new(notifier: Notifier) -> Self {
        Self::with_history_limit(notifier, DEFAULT_HISTORY_LIMIT)
    }

    /// Tracker keeping at most `limit` finished records.
    pub fn with_history_limit(notifier: Notifier, limit: usize) -> Self {
        Self {
            notifier,
            requests: HashMap::new(),
            by_request_id: HashMap::new(),
            finished: VecDeque::new(),
            retired: HashSet::new(),
            history_limit: limit,
            send_scope: None,
            message_scope: None,
        }
    }

    /// Open the send context for `request`. Any previous key is forgotten.
    pub fn begin_send_context(&mut self, connection_id: &str, request: &SendRequest) {
        self.send_scope = Some(SendScope {
            connection_id: connection_id.to_string(),
            request: request.clone(),
            key: None,
        });
    }

    /// Tag the current send with `key`, creating a pending record.
    ///
    /// Returns `false` (and logs a warning) when there is no send context,
    /// the context already has a key, or `key` was used before.
    pub fn set_request_key(&mut self, key: &str) -> bool {
        let Some(scope) = self.send_scope.as_mut() else {
            warn!(key, "setRequestKey called outside of a send context");
            return false;
        };
        if let Some(existing) = &scope.key {
            warn!(key, existing = %existing, "request key already set for this send; keeping the first");
            return false;
        }
        if self.requests.contains_key(key) || self.retired.contains(key) {
            warn!(key, "request key already tracked; keys are never reused");
            return false;
        }
        let request_id = scope.request.id.clone();
        if let Some(previous) = self.by_request_id.get(&request_id) {
            let still_pending = self
                .requests
                .get(previous)
                .is_some_and(|r| r.status == RequestStatus::Pending);
            if still_pending {
                warn!(key, request_id = %request_id, previous = %previous, "request already correlated");
                return false;
            }
        }

        let now = now_millis();
        let record = TrackedRequest {
            request_key: key.to_string(),
            request_id: request_id.clone(),
            connection_id: scope.connection_id.clone(),
            request: scope.request.clone(),
            response: None,
            status: RequestStatus::Pending,
            start_time: now,
            end_time: None,
        };
        scope.key = Some(key.to_string());

        self.notifier.notify(Notification::RequestPending {
            request_key: record.request_key.clone(),
            request_id: record.request_id.clone(),
            connection_id: record.connection_id.clone(),
            request: record.request.clone(),
            timestamp: now,
        });
        debug!(key, request_id = %request_id, "request pending");

        self.by_request_id.insert(request_id, key.to_string());
        self.requests.insert(key.to_string(), record);
        true
    }

    /// Close the send context and return the key assigned during it.
    pub fn end_send_context(&mut self) -> Option<String> {
        self.send_scope.take().and_then(|scope| scope.key)
    }

    /// Open the message context for an inbound message.
    pub fn begin_message_context(&mut self, message: &SocketMessage) {
        self.message_scope = Some(message.clone());
    }

    /// Resolve a pending key with the current inbound message.
    ///
    /// Unknown keys, terminal records and calls outside a message context
    /// are warnings, not errors.
    pub fn resolve_request_key(&mut self, key: &str) -> bool {
        let Some(message) = self.message_scope.as_ref() else {
            warn!(key, "resolveRequestKey called outside of a message context");
            return false;
        };
        let Some(record) = self.requests.get_mut(key) else {
            warn!(key, "no tracked request for key");
            return false;
        };
        if record.status != RequestStatus::Pending {
            warn!(key, status = ?record.status, "tracked request is no longer pending");
            return false;
        }

        let now = now_millis();
        record.status = RequestStatus::Resolved;
        record.response = Some(message.clone());
        record.end_time = Some(now);

        self.notifier.notify(Notification::RequestResolved {
            request_key: key.to_string(),
            response: message.clone(),
            timestamp: now,
        });
        debug!(key, "request resolved");
        self.finish(key);
        true
    }

    pub fn end_message_context(&mut self) {
        self.message_scope = None;
    }

    /// Cancel a pending request. Has no effect on the transport.
    pub fn cancel(&mut self, key: &str) -> bool {
        match self.requests.get_mut(key) {
            Some(record) if record.status == RequestStatus::Pending => {
                record.status = RequestStatus::Canceled;
                record.end_time = Some(now_millis());
                debug!(key, "request canceled");
                self.finish(key);
                true
            }
            Some(record) => {
                warn!(key, status = ?record.status, "cannot cancel a finished request");
                false
            }
            None => {
                warn!(key, "no tracked request to cancel");
                false
            }
        }
    }

    /// Queue a just-finished record and prune the oldest past the limit.
    fn finish(&mut self, key: &str) {
        self.finished.push_back(key.to_string());

        while self.finished.len() > self.history_limit {
            let Some(oldest) = self.finished.pop_front() else {
                break;
            };
            if let Some(record) = self.requests.remove(&oldest) {
                if self.by_request_id.get(&record.request_id) == Some(&oldest) {
                    self.by_request_id.remove(&record.request_id);
                }
            }
            debug!(key = %oldest, "finished request pruned");
            self.retired.insert(oldest);
        }
    }

    pub fn get(&self, key: &str) -> Option<&TrackedRequest> {
        self.requests.get(key)
    }

    pub fn key_for_request(&self, request_id: &str) -> Option<&str> {
        self.by_request_id.get(request_id).map(String::as_str)
    }

    /// All tracked requests, oldest first.
    pub fn all(&self) -> Vec<&TrackedRequest> {
        let mut all: Vec<_> = self.requests.values().collect();
        all.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.request_key.cmp(&b.request_key))
        });
        all
    }

    pub fn pending(&self) -> Vec<&TrackedRequest> {
        self.all()
            .into_iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .collect()
    }

    /// Forget every record and any open context.
    pub fn clear(&mut self) {
        self.requests.clear();
        self.by_request_id.clear();
        self.finished.clear();
        self.retired.clear();
        self.send_scope = None;
        self.message_scope = None;
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
