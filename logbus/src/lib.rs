//! # logbus
//!
//! Structured request logging for axum services, published to a message bus.
//!
//! Handlers build uniform JSON response envelopes and, on failure or after a
//! successful mutation, publish a log record describing the request to a
//! configured topic.
//!
//! ## Features
//!
//! - **Four record kinds**: audit, error, event and communication, sharing one envelope
//! - **Response envelopes**: 200/201/400/404/500 builders with stable error codes
//! - **Best-effort publishing**: bounded wait for delivery, failures never reach the caller
//! - **NATS transport**: JetStream acknowledgements, lazy connection with retry
//! - **Layered configuration**: defaults, `logbus.toml`, then environment
//!
//! ## Example
//!
//! ```rust,no_run
//! use logbus::prelude::*;
//! use axum::{extract::State, routing::get, Router};
//!
//! async fn get_user(State(logs): State<LogFacade>, ctx: RequestContext) -> ApiResponse {
//!     match lookup_user().await {
//!         Ok(Some(user)) => fetch_success(user),
//!         Ok(None) => not_found_error("user"),
//!         Err(e) => {
//!             let err = ApiError::new("5002", "could not read user").with_details(e);
//!             logs.fetch_error(err, &ctx, "users", "anonymous").await
//!         }
//!     }
//! }
//!
//! async fn lookup_user() -> std::result::Result<Option<String>, String> {
//!     Ok(Some("ada".to_string()))
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let logs = LogFacade::from_config(&config);
//!     let app: Router = Router::new()
//!         .route("/users/{id}", get(get_user))
//!         .with_state(logs.clone());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(
//!         listener,
//!         app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//!     )
//!     .await?;
//!
//!     logs.publisher().shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod assembler;
pub mod config;
pub mod context;
pub mod error;
pub mod observability;
pub mod payload;
pub mod publisher;
pub mod records;
pub mod response;

pub use assembler::{
    assemble, assemble_audit_log, assemble_communication_log, assemble_error_log,
    assemble_event_log, decode_body,
};
pub use config::Config;
pub use context::RequestContext;
pub use error::{Error, Result};
pub use publisher::{LogSink, PublishOutcome, Publisher};
pub use response::{ApiError, ApiResponse, LogFacade, ServiceError};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assembler::{assemble, decode_body};
    pub use crate::config::{Config, PublishMode, TopicsConfig};
    pub use crate::context::RequestContext;
    pub use crate::error::{Error, Result};
    pub use crate::observability::init_tracing;
    pub use crate::payload::{Audit, CallSite, Communication, ErrorReport, Event, PayloadCommon};
    pub use crate::publisher::{Delivery, LogSink, MemorySink, PublishOutcome, Publisher};
    pub use crate::records::{
        AuditLog, CommunicationLog, Envelope, ErrorLog, EventLog, LogLevel, LogRecord, RecordKind,
    };
    pub use crate::response::{
        fetch_success, not_found_error, persist_success, ApiError, ApiResponse, LogFacade,
        ServiceError,
    };

    #[cfg(feature = "nats")]
    pub use crate::publisher::NatsSink;

    pub use axum::{
        body::Bytes,
        extract::State,
        http::{HeaderMap, Method, StatusCode},
    };
}
