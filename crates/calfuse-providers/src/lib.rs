//! Calendar provider plumbing for Google Calendar and Microsoft Outlook.
//!
//! - [`ProviderRegistry`] - Immutable per-provider endpoints and credentials
//! - [`AuthorizationFlowBuilder`] - Consent URLs with a fresh `state`
//! - [`TokenExchanger`] - Authorization code to [`TokenBundle`]
//! - [`EventFetcher`] - Raw event listing with a bearer token
//! - [`normalize`] / [`normalize_all`] - Provider JSON to [`UnifiedEvent`]
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  url + state   ┌──────────────────┐
//! │ AuthorizationFlow├───────────────►│  consent screen  │
//! └──────────────────┘                └────────┬─────────┘
//!                                              │ code
//!                                              ▼
//!                                     ┌──────────────────┐
//!                                     │  TokenExchanger  │
//!                                     └────────┬─────────┘
//!                                              │ TokenBundle
//!                                              ▼
//!                                     ┌──────────────────┐
//!                                     │   EventFetcher   │
//!                                     └────────┬─────────┘
//!                                              │ RawProviderEvent
//!                                              ▼ normalize_all()
//!                                     ┌──────────────────┐
//!                                     │   UnifiedEvent   │
//!                                     └──────────────────┘
//! ```
//!
//! Provider differences live in the private `google` and `outlook` modules;
//! every public operation dispatches on [`ProviderId`].
//!
//! [`UnifiedEvent`]: calfuse_core::UnifiedEvent
//! [`ProviderId`]: calfuse_core::ProviderId

pub mod error;
pub mod fetch;
mod google;
pub mod http;
pub mod normalize;
pub mod oauth;
mod outlook;
pub mod raw_event;
pub mod registry;

// Re-export main types at crate root
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use fetch::{DEFAULT_MAX_RESULTS, EventFetcher, FetchOptions};
pub use http::build_http_client;
pub use normalize::{normalize, normalize_all};
pub use oauth::{
    AuthorizationFlowBuilder, AuthorizationUrl, TokenBundle, TokenExchanger, generate_state,
    states_match,
};
pub use raw_event::RawProviderEvent;
pub use registry::{ENV_PREFIX, ProviderConfig, ProviderRegistry};
