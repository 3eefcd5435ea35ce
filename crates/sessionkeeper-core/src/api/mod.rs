//! Authentication backend access.
//!
//! `AuthTransport` is the seam between the token manager and the network;
//! `HttpTransport` implements it against the REST endpoints:
//!
//! - `POST /auth/refresh`
//! - `GET /auth/sessions`
//! - `DELETE /auth/sessions/{id}`
//! - `POST /auth/sessions/terminate-others`

pub mod client;
pub mod error;
pub mod transport;
mod wire;

pub use client::HttpTransport;
pub use error::ApiError;
pub use transport::{AuthTransport, RefreshGrant, RefreshRequest, UserProfile};
