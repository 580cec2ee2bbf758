// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit trail for trust decisions.
//!
//! Every sign-in, link, verification and gate denial produces an
//! [`AuditEvent`]. Metadata is redacted before it is stored, and sinks are
//! best-effort: a failing sink is logged and never fails the request that
//! triggered the event.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::{Arc, Mutex};

use axum::http::{HeaderMap, Method, Uri};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::StoragePaths;
use crate::crypto::secrets::pseudonymize;

/// Replacement for values under sensitive keys.
pub const REDACTED: &str = "[REDACTED]";

const MAX_DEPTH: usize = 4;
const MAX_ARRAY_ITEMS: usize = 20;
const MAX_STRING_CHARS: usize = 256;

/// Key fragments that mark a metadata value as sensitive. Keys are compared
/// lower-cased with `_` and `-` removed.
const SENSITIVE_KEY_PATTERNS: &[&str] = &[
    "password",
    "token",
    "otp",
    "secret",
    "phone",
    "wallet",
    "email",
    "signature",
    "authorization",
    "cookie",
    "privatekey",
    "nonce",
];

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("audit sink lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Deny,
    Error,
}

/// Request attributes attached to an audit event. Client IP and user agent
/// are pseudonymized with a keyed hash.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequest {
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AuditRequest {
    pub fn from_http(method: &Method, uri: &Uri, headers: &HeaderMap, hash_key: &[u8]) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let client_ip = header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .or_else(|| header("x-real-ip"));

        Self {
            method: method.to_string(),
            path: uri.path().to_string(),
            ip_hash: client_ip.map(|ip| pseudonymize(hash_key, ip)),
            origin_header: header("origin").map(|o| truncate(o, MAX_STRING_CHARS)),
            user_agent_hash: header("user-agent").map(|ua| pseudonymize(hash_key, ua)),
            request_id: header("x-request-id").map(str::to_string),
        }
    }
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub at: DateTime<Utc>,
    /// Area of the decision (`session`, `wallet`, `provider`, `gate`, `reward`)
    pub domain: String,
    pub action: String,
    pub outcome: AuditOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub request: AuditRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl AuditEvent {
    pub fn new(
        domain: impl Into<String>,
        action: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            at: Utc::now(),
            domain: domain.into(),
            action: action.into(),
            outcome,
            actor_id: None,
            target_id: None,
            status_code: None,
            request: AuditRequest::default(),
            metadata: None,
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_request(mut self, request: AuditRequest) -> Self {
        self.request = request;
        self
    }

    /// Attach metadata. Always redacted and bounded.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(redact_metadata(&metadata));
        self
    }
}

/// Recursively replace values under sensitive keys and bound the size of
/// the structure.
pub fn redact_metadata(value: &Value) -> Value {
    redact_at(value, 0)
}

fn redact_at(value: &Value, depth: usize) -> Value {
    match value {
        Value::Object(map) => {
            if depth >= MAX_DEPTH {
                return Value::String("[TRUNCATED]".to_string());
            }
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                let redacted = if is_sensitive_key(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    redact_at(child, depth + 1)
                };
                out.insert(key.clone(), redacted);
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            if depth >= MAX_DEPTH {
                return Value::String("[TRUNCATED]".to_string());
            }
            let mut out: Vec<Value> = items
                .iter()
                .take(MAX_ARRAY_ITEMS)
                .map(|item| redact_at(item, depth + 1))
                .collect();
            if items.len() > MAX_ARRAY_ITEMS {
                out.push(Value::String(format!("[+{} more]", items.len() - MAX_ARRAY_ITEMS)));
            }
            Value::Array(out)
        }
        Value::String(s) => Value::String(truncate(s, MAX_STRING_CHARS)),
        other => other.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect();
    SENSITIVE_KEY_PATTERNS.iter().any(|p| normalized.contains(p))
}

fn truncate(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &value[..cut]),
        None => value.to_string(),
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Emits events on the `audit` tracing target.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let json = serde_json::to_string(event)?;
        tracing::info!(
            target: "audit",
            domain = %event.domain,
            action = %event.action,
            outcome = ?event.outcome,
            event = %json,
            "audit event"
        );
        Ok(())
    }
}

/// Appends events to daily JSONL files under the data directory.
pub struct FileAuditSink {
    paths: StoragePaths,
    write_lock: Mutex<()>,
}

impl FileAuditSink {
    pub fn new(paths: StoragePaths) -> Self {
        Self {
            paths,
            write_lock: Mutex::new(()),
        }
    }

    /// Read audit events for a specific date (`YYYY-MM-DD`).
    pub fn read_events(&self, date: &str) -> Result<Vec<AuditEvent>, AuditError> {
        let path = self.paths.audit_events_file(date);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(AuditError::from))
            .collect()
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let date = event.at.format("%Y-%m-%d").to_string();
        let path = self.paths.audit_events_file(&date);

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().map_err(|_| AuditError::Poisoned)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&line)?;
        Ok(())
    }
}

/// Keeps events in memory. Used by tests and local development.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.events
            .lock()
            .map_err(|_| AuditError::Poisoned)?
            .push(event.clone());
        Ok(())
    }
}

/// Fans events out to every configured sink.
#[derive(Clone)]
pub struct Auditor {
    sinks: Arc<Vec<Arc<dyn AuditSink>>>,
}

impl Auditor {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self {
            sinks: Arc::new(sinks),
        }
    }

    /// Record an event on every sink. Failures are logged, never returned.
    pub fn emit(&self, event: AuditEvent) {
        for sink in self.sinks.iter() {
            if let Err(e) = sink.record(&event) {
                tracing::warn!(
                    error = %e,
                    domain = %event.domain,
                    action = %event.action,
                    "Failed to record audit event"
                );
            }
        }
    }
}

impl Default for Auditor {
    fn default() -> Self {
        Self::new(vec![Arc::new(TracingAuditSink)])
    }
}

/// Helper macro for recording audit events.
#[macro_export]
macro_rules! audit_log {
    ($auditor:expr, $domain:expr, $action:expr, $outcome:expr, $request:expr) => {{
        $auditor.emit(
            $crate::storage::AuditEvent::new($domain, $action, $outcome)
                .with_request($request.clone()),
        );
    }};
    (
        $auditor:expr,
        $domain:expr,
        $action:expr,
        $outcome:expr,
        $request:expr,
        actor = $actor:expr
    ) => {{
        $auditor.emit(
            $crate::storage::AuditEvent::new($domain, $action, $outcome)
                .with_request($request.clone())
                .with_actor($actor),
        );
    }};
}
