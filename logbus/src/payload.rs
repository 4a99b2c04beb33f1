//! Domain payloads handed to the assembler
//!
//! Each payload carries the caller-known parts of a record. Everything read
//! from the request itself (path, headers, client address) is filled in by the
//! [`assembler`](crate::assembler) from a [`RequestContext`](crate::RequestContext).

use std::backtrace::Backtrace;
use std::panic::Location;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::records::LogLevel;

/// Envelope fields supplied by the caller rather than the request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadCommon {
    pub user_id: String,
    pub service_id: String,
    pub response_status: String,
    pub response_body: Value,
    pub request_body: Value,
}

impl PayloadCommon {
    /// Caller identity for the record
    pub fn new(user_id: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            service_id: service_id.into(),
            ..Self::default()
        }
    }

    /// Set the response status and body snapshot
    pub fn with_response(mut self, status: impl Into<String>, body: Value) -> Self {
        self.response_status = status.into();
        self.response_body = body;
        self
    }

    /// Set the already-decoded request body
    pub fn with_request_body(mut self, body: Value) -> Self {
        self.request_body = body;
        self
    }
}

/// Source location an error or event was reported from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub file: String,
    pub line: u32,
    pub method: String,
}

impl CallSite {
    /// Capture the location of the caller
    ///
    /// Inside a `#[track_caller]` function this resolves to that function's
    /// caller.
    #[track_caller]
    pub fn capture(method: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            file: location.file().to_string(),
            line: location.line(),
            method: method.into(),
        }
    }
}

/// Payload for an audit record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Audit {
    pub common: PayloadCommon,
    /// Entity types touched by the action, in order
    pub entity_types: Vec<String>,
    /// Action label such as "create" or "update"
    pub action_type: String,
}

impl Audit {
    /// Split a comma-separated entity type list
    ///
    /// The split is exact: whitespace is kept and an empty string yields a
    /// single empty entry.
    pub fn split_entity_types(entity_types: &str) -> Vec<String> {
        entity_types.split(',').map(str::to_string).collect()
    }
}

/// Payload for an error record
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    pub common: PayloadCommon,
    pub code: String,
    pub message: String,
    pub details: String,
    pub origin: CallSite,
    pub stack_trace: String,
    /// When the error was captured
    pub captured_at: DateTime<Utc>,
}

impl ErrorReport {
    /// Capture an error report at the caller's location
    ///
    /// Records the caller's file and line, the current time and a backtrace
    /// rendered to text.
    #[track_caller]
    pub fn capture(
        method: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let origin = CallSite::capture(method);
        Self {
            common: PayloadCommon::default(),
            code: code.into(),
            message: message.into(),
            details: String::new(),
            origin,
            stack_trace: Backtrace::force_capture().to_string(),
            captured_at: Utc::now(),
        }
    }

    pub fn with_common(mut self, common: PayloadCommon) -> Self {
        self.common = common;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

/// Payload for an event record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    pub common: PayloadCommon,
    pub topic_name: String,
    pub broker_host: String,
    pub broker_port: u16,
    pub origin: CallSite,
    pub level: LogLevel,
    pub message: String,
}

/// Payload for a communication record (SMS, email, push gateways)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Communication {
    pub common: PayloadCommon,
    pub provider_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub channel_type: String,
    pub gateway_name: String,
    pub gateway_ip_address: String,
    pub gateway_port: u16,
    pub gateway_endpoint: String,
    pub auth_required: bool,
    pub auth_type: String,
    /// Reference to the credentials used (key id, vault path), never the secret
    pub auth_credentials: String,
    pub delivery_status: String,
}

/// Any of the four payload kinds
#[derive(Debug, Clone, PartialEq)]
pub enum LogPayload {
    Audit(Audit),
    Error(ErrorReport),
    Event(Event),
    Communication(Communication),
}

impl From<Audit> for LogPayload {
    fn from(payload: Audit) -> Self {
        LogPayload::Audit(payload)
    }
}

impl From<ErrorReport> for LogPayload {
    fn from(payload: ErrorReport) -> Self {
        LogPayload::Error(payload)
    }
}

impl From<Event> for LogPayload {
    fn from(payload: Event) -> Self {
        LogPayload::Event(payload)
    }
}

impl From<Communication> for LogPayload {
    fn from(payload: Communication) -> Self {
        LogPayload::Communication(payload)
    }
}
