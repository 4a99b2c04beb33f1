//! API response envelopes and the logging facade
//!
//! Handlers return an [`ApiResponse`] built here. Success and "not found"
//! builders are pure. The error builders on [`LogFacade`] also publish an
//! error record, and [`LogFacade::log_audit`] publishes an audit record after
//! a successful mutation.
//!
//! ## Status codes
//!
//! - **200 OK** - [`fetch_success`]
//! - **201 Created** - [`persist_success`]
//! - **400 Bad Request** - [`LogFacade::parse_error`]
//! - **404 Not Found** - [`not_found_error`] (no record published)
//! - **500 Internal Server Error** - [`LogFacade::persist_error`], [`LogFacade::fetch_error`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use logbus::prelude::*;
//!
//! async fn create_order(
//!     State(logs): State<LogFacade>,
//!     ctx: RequestContext,
//!     body: Bytes,
//! ) -> ApiResponse {
//!     let order: NewOrder = match serde_json::from_slice(&body) {
//!         Ok(order) => order,
//!         Err(e) => return logs.parse_error(&e, &ctx, &body, "orders", "anonymous").await,
//!     };
//!
//!     match repository.insert(order).await {
//!         Ok(saved) => {
//!             let response = persist_success("order", &saved);
//!             logs.log_audit(&ctx, &response, decode_body(&body), "u1", "orders", "create", "order")
//!                 .await;
//!             response
//!         }
//!         Err(e) => {
//!             let err = ApiError::new("5001", "could not store order").with_details(e.to_string());
//!             logs.persist_error("order", err, &body, &ctx, "orders", "u1").await
//!         }
//!     }
//! }
//! ```

use std::fmt;
use std::future::Future;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assembler::{
    assemble_audit_log, assemble_communication_log, assemble_error_log, assemble_event_log,
    decode_body, try_decode_body,
};
use crate::config::TopicsConfig;
use crate::context::RequestContext;
use crate::payload::{Audit, Communication, ErrorReport, Event, PayloadCommon};
use crate::publisher::{PublishOutcome, Publisher};

pub const PERSIST_SUCCESS_MESSAGE: &str = "successfully created a new ";
pub const PERSIST_ERROR_MESSAGE: &str = "an error occurred while creating ";
pub const FETCH_SUCCESS_MESSAGE: &str = "success";
pub const FETCH_ERROR_MESSAGE: &str = "failed";
pub const JSON_PARSE_ERROR_MESSAGE: &str = "failed to extract JSON from request body";
pub const PARSE_ERROR_CODE: &str = "4000";
pub const NOT_FOUND_ERROR_CODE: &str = "4040";
pub const NOT_FOUND_MESSAGE: &str = " not found";
pub const NOT_FOUND_DESCRIPTIVE_MESSAGE: &str = "no record found for provided ";

/// Error body of an [`ApiResponse`]
///
/// Empty fields are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_details: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: code.into(),
            error_message: message.into(),
            error_details: String::new(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.error_details = details.into();
        self
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error_code, self.error_message)
    }
}

/// Uniform response envelope returned to HTTP clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16().to_string(),
            status_message: message.into(),
            data: None,
            error: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_error(mut self, error: ApiError) -> Self {
        self.error = Some(error);
        self
    }

    /// HTTP status carried in `status_code`, 500 when it is not a valid code
    pub fn status(&self) -> StatusCode {
        self.status_code
            .parse::<u16>()
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// A failed request, classified where the failure happened
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The request body could not be parsed
    #[error("parse error: {detail}")]
    Parse { detail: String },

    /// Storing an entity failed
    #[error("failed to persist {entity}: {error}")]
    Persist { entity: String, error: ApiError },

    /// Reading data failed
    #[error("fetch failed: {0}")]
    Fetch(ApiError),
}

impl ServiceError {
    pub fn parse(detail: impl fmt::Display) -> Self {
        ServiceError::Parse {
            detail: detail.to_string(),
        }
    }

    pub fn persist(entity: impl Into<String>, error: ApiError) -> Self {
        ServiceError::Persist {
            entity: entity.into(),
            error,
        }
    }

    pub fn fetch(error: ApiError) -> Self {
        ServiceError::Fetch(error)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Parse { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Persist { .. } | ServiceError::Fetch(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Error body shown to the client
    pub fn api_error(&self) -> ApiError {
        match self {
            ServiceError::Parse { detail } => {
                ApiError::new(PARSE_ERROR_CODE, JSON_PARSE_ERROR_MESSAGE).with_details(detail.clone())
            }
            ServiceError::Persist { error, .. } | ServiceError::Fetch(error) => error.clone(),
        }
    }

    pub fn status_message(&self) -> String {
        match self {
            ServiceError::Parse { .. } => JSON_PARSE_ERROR_MESSAGE.to_string(),
            ServiceError::Persist { entity, .. } => format!("{}{}", PERSIST_ERROR_MESSAGE, entity),
            ServiceError::Fetch(_) => FETCH_ERROR_MESSAGE.to_string(),
        }
    }

    /// Name of the facade operation reporting this error
    pub fn operation(&self) -> &'static str {
        match self {
            ServiceError::Parse { .. } => "parse_error",
            ServiceError::Persist { .. } => "persist_error",
            ServiceError::Fetch(_) => "fetch_error",
        }
    }

    /// Envelope returned to the client
    pub fn to_response(&self) -> ApiResponse {
        ApiResponse::new(self.status(), self.status_message()).with_error(self.api_error())
    }
}

/// 201 envelope for a newly created entity
pub fn persist_success(entity_name: &str, data: impl Serialize) -> ApiResponse {
    with_serialized_data(
        ApiResponse::new(
            StatusCode::CREATED,
            format!("{}{}", PERSIST_SUCCESS_MESSAGE, entity_name),
        ),
        data,
    )
}

/// 200 envelope for fetched data
pub fn fetch_success(data: impl Serialize) -> ApiResponse {
    with_serialized_data(ApiResponse::new(StatusCode::OK, FETCH_SUCCESS_MESSAGE), data)
}

/// 404 envelope; a missing entity is a normal outcome, so nothing is published
pub fn not_found_error(entity_name: &str) -> ApiResponse {
    ApiResponse::new(
        StatusCode::NOT_FOUND,
        format!("{}{}", entity_name, NOT_FOUND_MESSAGE),
    )
    .with_error(ApiError::new(
        NOT_FOUND_ERROR_CODE,
        format!("{}{}_id", NOT_FOUND_DESCRIPTIVE_MESSAGE, entity_name),
    ))
}

fn with_serialized_data(response: ApiResponse, data: impl Serialize) -> ApiResponse {
    match serde_json::to_value(data) {
        Ok(value) => response.with_data(value),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response data");
            response
        }
    }
}

/// Builds error envelopes and publishes error, audit, event and communication
/// records
///
/// Cheap to clone; build one at startup and keep it in the router state.
#[derive(Debug, Clone)]
pub struct LogFacade {
    publisher: Publisher,
    topics: TopicsConfig,
}

impl LogFacade {
    pub fn new(publisher: Publisher, topics: TopicsConfig) -> Self {
        Self { publisher, topics }
    }

    /// Facade over a NATS publisher built from configuration
    #[cfg(feature = "nats")]
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(Publisher::nats(config), config.topics.clone())
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn topics(&self) -> &TopicsConfig {
        &self.topics
    }

    /// 500 envelope for a failed create; publishes an error record
    #[track_caller]
    pub fn persist_error<'a>(
        &'a self,
        entity_name: &str,
        err: ApiError,
        raw_body: &[u8],
        ctx: &RequestContext,
        service_id: &str,
        user_id: &str,
    ) -> impl Future<Output = ApiResponse> + Send + 'a {
        self.fail(
            ServiceError::persist(entity_name, err),
            ctx,
            decode_body(raw_body),
            service_id,
            user_id,
        )
    }

    /// 500 envelope for a failed read; publishes an error record
    #[track_caller]
    pub fn fetch_error<'a>(
        &'a self,
        err: ApiError,
        ctx: &RequestContext,
        service_id: &str,
        user_id: &str,
    ) -> impl Future<Output = ApiResponse> + Send + 'a {
        self.fail(ServiceError::fetch(err), ctx, Value::Null, service_id, user_id)
    }

    /// 400 envelope for a malformed body; publishes an error record with the
    /// fixed parse error code and the detail kept separately
    ///
    /// The body is recorded when it is valid JSON of the wrong shape and as
    /// `Null` otherwise, without a second decode warning.
    #[track_caller]
    pub fn parse_error<'a>(
        &'a self,
        detail: &dyn fmt::Display,
        ctx: &RequestContext,
        raw_body: &[u8],
        service_id: &str,
        user_id: &str,
    ) -> impl Future<Output = ApiResponse> + Send + 'a {
        self.fail(
            ServiceError::parse(detail),
            ctx,
            try_decode_body(raw_body).unwrap_or(Value::Null),
            service_id,
            user_id,
        )
    }

    /// Envelope for any [`ServiceError`]; publishes an error record
    ///
    /// The record's `error_method_name` is the operation kind
    /// (`"persist_error"`, `"fetch_error"` or `"parse_error"`); use
    /// [`fail_in`](Self::fail_in) to name the handler instead.
    #[track_caller]
    pub fn fail<'a>(
        &'a self,
        err: ServiceError,
        ctx: &RequestContext,
        request_body: Value,
        service_id: &str,
        user_id: &str,
    ) -> impl Future<Output = ApiResponse> + Send + 'a {
        let method_name = err.operation();
        self.fail_in(method_name, err, ctx, request_body, service_id, user_id)
    }

    /// Envelope for any [`ServiceError`] raised in `method_name`; publishes an
    /// error record
    ///
    /// The record and the envelope are built before this returns, with the
    /// caller's file and line as the error origin. The returned future only
    /// publishes.
    #[track_caller]
    pub fn fail_in<'a>(
        &'a self,
        method_name: &str,
        err: ServiceError,
        ctx: &RequestContext,
        request_body: Value,
        service_id: &str,
        user_id: &str,
    ) -> impl Future<Output = ApiResponse> + Send + 'a {
        let response = err.to_response();
        let api_error = err.api_error();
        let report = ErrorReport::capture(method_name, api_error.error_code, api_error.error_message)
            .with_details(api_error.error_details)
            .with_common(
                PayloadCommon::new(user_id, service_id)
                    .with_response(response.status_code.clone(), response.to_value())
                    .with_request_body(request_body),
            );
        let record = assemble_error_log(ctx, report);

        async move {
            self.publisher.publish(&record, &self.topics.error_logs).await;
            response
        }
    }

    /// Publish an audit record for a completed mutation
    ///
    /// `entity_types` is split on `,` exactly, without trimming.
    #[allow(clippy::too_many_arguments)]
    pub async fn log_audit(
        &self,
        ctx: &RequestContext,
        response: &ApiResponse,
        request_body: Value,
        user_id: &str,
        service_id: &str,
        action_type: &str,
        entity_types: &str,
    ) -> PublishOutcome {
        let record = assemble_audit_log(
            ctx,
            Audit {
                common: PayloadCommon::new(user_id, service_id)
                    .with_response(response.status_code.clone(), response.to_value())
                    .with_request_body(request_body),
                entity_types: Audit::split_entity_types(entity_types),
                action_type: action_type.to_string(),
            },
        );

        self.publisher.publish(&record, &self.topics.audit_logs).await
    }

    /// Publish an event record
    pub async fn log_event(&self, ctx: &RequestContext, event: Event) -> PublishOutcome {
        let record = assemble_event_log(ctx, event);
        self.publisher.publish(&record, &self.topics.event_logs).await
    }

    /// Publish a communication record
    pub async fn log_communication(
        &self,
        ctx: &RequestContext,
        communication: Communication,
    ) -> PublishOutcome {
        let record = assemble_communication_log(ctx, communication);
        self.publisher
            .publish(&record, &self.topics.communication_logs)
            .await
    }
}
