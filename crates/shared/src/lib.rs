//! Shared types for the labgate access-control console.
//!
//! Domain records, the response envelope used by every resource endpoint,
//! push-channel frames and the error type returned by the HTTP client.

pub mod error;
pub mod models;
pub mod protocol;
pub mod record;
pub mod time;

pub use error::*;
pub use models::*;
pub use protocol::*;
pub use record::Record;
