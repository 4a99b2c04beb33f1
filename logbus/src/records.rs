//! Log record types
//!
//! The four flat record shapes published to the message bus. Every record
//! shares an [`Envelope`] of request-context fields, flattened into the same
//! JSON object on the wire. Records are built by the
//! [`assembler`](crate::assembler) and then only read.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Value of `request_type` for every record built from an HTTP request
pub const REQUEST_TYPE_HTTP: &str = "HTTP";

/// Request-context fields shared by every record kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique record identifier, assigned at assembly
    pub record_id: Uuid,
    /// Assembly time
    pub request_timestamp: DateTime<Utc>,
    pub request_uri: String,
    pub request_http_method: String,
    /// Headers flattened to one value per name
    pub request_headers: HashMap<String, String>,
    pub request_ip_address: String,
    pub request_type: String,
    /// User agent string
    pub request_device_type: String,
    pub request_user_id: String,
    pub request_service_id: String,
    pub request_response_status: String,
    pub request_response_body: Value,
    pub request_body: Value,
}

/// Record written after a successful mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(rename = "request_entity_type")]
    pub request_entity_types: Vec<String>,
    pub request_action_type: String,
}

/// Record written when a request fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLog {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub error_code: String,
    pub error_message: String,
    pub error_details: String,
    pub error_file_name: String,
    pub error_line_number: u32,
    pub error_method_name: String,
    pub error_stack_trace: String,
    pub error_timestamp: DateTime<Utc>,
}

/// Record describing a notable application event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub topic_name: String,
    pub broker_host: String,
    pub broker_port: u16,
    pub file_name: String,
    pub method_name: String,
    pub line_number: u32,
    pub log_level: LogLevel,
    pub message: String,
}

/// Record describing an outbound message through a communication gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationLog {
    #[serde(flatten)]
    pub envelope: Envelope,
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
    pub auth_credentials: String,
    pub delivery_status: String,
}

/// Severity of an [`EventLog`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "TRACE"),
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Self::Trace,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::ERROR => Self::Error,
        }
    }
}

/// Record kind, used to pick a destination topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Audit,
    Error,
    Event,
    Communication,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audit => write!(f, "audit"),
            Self::Error => write!(f, "error"),
            Self::Event => write!(f, "event"),
            Self::Communication => write!(f, "communication"),
        }
    }
}

/// Any assembled record
///
/// Serializes to the flat JSON of the wrapped record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LogRecord {
    Audit(AuditLog),
    Error(ErrorLog),
    Event(EventLog),
    Communication(CommunicationLog),
}

impl LogRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Audit(_) => RecordKind::Audit,
            Self::Error(_) => RecordKind::Error,
            Self::Event(_) => RecordKind::Event,
            Self::Communication(_) => RecordKind::Communication,
        }
    }

    /// Shared request-context fields
    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::Audit(r) => &r.envelope,
            Self::Error(r) => &r.envelope,
            Self::Event(r) => &r.envelope,
            Self::Communication(r) => &r.envelope,
        }
    }
}
