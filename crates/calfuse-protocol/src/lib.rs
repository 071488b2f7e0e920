//! Wire types for the calfuse HTTP API.
//!
//! Every endpoint speaks JSON. Successful calls return one of the response
//! types below; failures return an [`ErrorResponse`] whose [`ErrorKind`]
//! determines the HTTP status.
//!
//! | endpoint                         | success             |
//! |----------------------------------|---------------------|
//! | `GET /auth-url?provider&scope`   | [`AuthUrlResponse`] |
//! | `GET /{provider}-callback`       | [`EventsResponse`]  |
//! | `GET /callback`                  | [`EventsResponse`]  |
//! | `GET /healthz`                   | [`HealthResponse`]  |
//!
//! # Example
//!
//! ```rust
//! use calfuse_protocol::{ErrorKind, ErrorResponse};
//!
//! let error = ErrorResponse::from_kind(ErrorKind::ExpiredRequest);
//! assert_eq!(error.error.http_status(), 400);
//! let json = serde_json::to_string(&error).unwrap();
//! assert_eq!(
//!     json,
//!     r#"{"error":"expired_request","message":"session expired, please reconnect"}"#
//! );
//! ```

mod types;

pub use types::{
    AuthUrlQuery, AuthUrlResponse, CallbackQuery, ErrorKind, ErrorResponse, EventsResponse,
    HealthResponse,
};
