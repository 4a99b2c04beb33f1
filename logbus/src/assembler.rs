//! Record assembly
//!
//! Pure functions turning a [`RequestContext`] and a payload into a record.
//! Each call reads the context afresh and assigns a new record id and
//! timestamp. Nothing here performs I/O; request bodies are decoded ahead of
//! time with [`decode_body`].

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::payload::{Audit, Communication, ErrorReport, Event, LogPayload, PayloadCommon};
use crate::records::{
    AuditLog, CommunicationLog, Envelope, ErrorLog, EventLog, LogRecord, REQUEST_TYPE_HTTP,
};

/// Decode a raw request body into JSON
///
/// Empty input yields `Null`. Input that is not valid JSON is logged and also
/// yields `Null`; a bad body never stops a record from being assembled.
pub fn decode_body(raw: &[u8]) -> Value {
    match try_decode_body(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, bytes = raw.len(), "Failed to decode request body");
            Value::Null
        }
    }
}

/// Decode a raw request body into JSON without logging
///
/// Empty or whitespace-only input yields `Null`.
pub fn try_decode_body(raw: &[u8]) -> serde_json::Result<Value> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    serde_json::from_slice(raw)
}

impl Envelope {
    /// Capture the envelope for a new record
    pub fn capture(ctx: &RequestContext, common: PayloadCommon) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            request_timestamp: Utc::now(),
            request_uri: ctx.path().to_string(),
            request_http_method: ctx.method().to_string(),
            request_headers: ctx.flattened_headers(),
            request_ip_address: ctx.client_ip().unwrap_or_default(),
            request_type: REQUEST_TYPE_HTTP.to_string(),
            request_device_type: ctx.user_agent().unwrap_or_default().to_string(),
            request_user_id: common.user_id,
            request_service_id: common.service_id,
            request_response_status: common.response_status,
            request_response_body: common.response_body,
            request_body: common.request_body,
        }
    }
}

/// Build an audit record
pub fn assemble_audit_log(ctx: &RequestContext, audit: Audit) -> AuditLog {
    AuditLog {
        envelope: Envelope::capture(ctx, audit.common),
        request_entity_types: audit.entity_types,
        request_action_type: audit.action_type,
    }
}

/// Build an error record
pub fn assemble_error_log(ctx: &RequestContext, report: ErrorReport) -> ErrorLog {
    ErrorLog {
        envelope: Envelope::capture(ctx, report.common),
        error_code: report.code,
        error_message: report.message,
        error_details: report.details,
        error_file_name: report.origin.file,
        error_line_number: report.origin.line,
        error_method_name: report.origin.method,
        error_stack_trace: report.stack_trace,
        error_timestamp: report.captured_at,
    }
}

/// Build an event record
pub fn assemble_event_log(ctx: &RequestContext, event: Event) -> EventLog {
    EventLog {
        envelope: Envelope::capture(ctx, event.common),
        topic_name: event.topic_name,
        broker_host: event.broker_host,
        broker_port: event.broker_port,
        file_name: event.origin.file,
        method_name: event.origin.method,
        line_number: event.origin.line,
        log_level: event.level,
        message: event.message,
    }
}

/// Build a communication record
pub fn assemble_communication_log(ctx: &RequestContext, comm: Communication) -> CommunicationLog {
    CommunicationLog {
        envelope: Envelope::capture(ctx, comm.common),
        provider_id: comm.provider_id,
        channel_id: comm.channel_id,
        channel_name: comm.channel_name,
        channel_type: comm.channel_type,
        gateway_name: comm.gateway_name,
        gateway_ip_address: comm.gateway_ip_address,
        gateway_port: comm.gateway_port,
        gateway_endpoint: comm.gateway_endpoint,
        auth_required: comm.auth_required,
        auth_type: comm.auth_type,
        auth_credentials: comm.auth_credentials,
        delivery_status: comm.delivery_status,
    }
}

/// Build whichever record matches the payload
pub fn assemble(ctx: &RequestContext, payload: impl Into<LogPayload>) -> LogRecord {
    match payload.into() {
        LogPayload::Audit(p) => LogRecord::Audit(assemble_audit_log(ctx, p)),
        LogPayload::Error(p) => LogRecord::Error(assemble_error_log(ctx, p)),
        LogPayload::Event(p) => LogRecord::Event(assemble_event_log(ctx, p)),
        LogPayload::Communication(p) => {
            LogRecord::Communication(assemble_communication_log(ctx, p))
        }
    }
}
